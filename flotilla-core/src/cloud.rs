//! Control-plane contract.

use crate::{Instance, InstanceId, ProvisioningTemplate, Result};
use async_trait::async_trait;

/// The IaaS operations the controller depends on.
///
/// Implementations talk JSON-over-HTTPS to the real provider; tests
/// substitute an in-memory double. Every call carries its own timeout and
/// returns a plain failure on expiry; there is no cancellation of
/// in-flight mutations, the provider stays authoritative.
#[async_trait]
pub trait CloudProvider: Send + Sync {
    /// All instances carrying `tag`. Used once, at bootstrap.
    async fn list_by_tag(&self, tag: &str) -> Result<Vec<Instance>>;

    /// Full payload for one instance. Used to enrich gossip newcomers.
    async fn get(&self, id: &InstanceId) -> Result<Instance>;

    /// Provision a new instance. Non-blocking with respect to group
    /// logic: the instance surfaces later through gossip, not through
    /// this return value.
    async fn create(&self, template: &ProvisioningTemplate) -> Result<InstanceId>;

    /// Destroy an instance. Idempotent from the caller's perspective;
    /// destroying an already-gone id is not an error.
    async fn destroy(&self, id: &InstanceId) -> Result<()>;

    /// Point a floating address at an instance.
    async fn assign_floating_address(&self, address: &str, id: &InstanceId) -> Result<()>;
}
