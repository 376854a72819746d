//! Fixed-id identity provider.

use async_trait::async_trait;
use flotilla_core::{IdentityProvider, InstanceId, Result};

/// Answers "who am I" with a constant, the way tests need it.
pub struct StaticIdentity {
    id: InstanceId,
}

impl StaticIdentity {
    pub fn new(id: impl Into<InstanceId>) -> Self {
        Self { id: id.into() }
    }
}

#[async_trait]
impl IdentityProvider for StaticIdentity {
    async fn instance_id(&self) -> Result<InstanceId> {
        Ok(self.id.clone())
    }
}
