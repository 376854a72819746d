//! Local identity contract.

use crate::{InstanceId, Result};
use async_trait::async_trait;

/// Reveals which fleet member the local process is running on.
///
/// The production implementation asks the provider's link-local metadata
/// endpoint; tests inject a fixed id. Failure here is fatal to startup:
/// an agent that cannot identify itself cannot join the fleet it manages.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn instance_id(&self) -> Result<InstanceId>;
}
