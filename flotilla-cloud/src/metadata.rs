//! Link-local metadata identity.

use async_trait::async_trait;
use flotilla_core::{FlotillaError, IdentityProvider, InstanceId, Result};
use std::time::Duration;
use tracing::info;

/// Where the provider answers "who am I" from inside an instance.
const METADATA_ID_URL: &str = "http://169.254.169.254/metadata/v1/id";
const METADATA_TIMEOUT: Duration = Duration::from_secs(5);

/// Identity provider backed by the provider metadata service.
///
/// The body is the bare instance id as plain text. Failure here aborts
/// startup; there is nothing sensible an agent can do without knowing
/// which fleet member it is.
pub struct MetadataIdentity {
    client: reqwest::Client,
    url: String,
}

impl MetadataIdentity {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
            url: METADATA_ID_URL.to_string(),
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }
}

impl Default for MetadataIdentity {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl IdentityProvider for MetadataIdentity {
    async fn instance_id(&self) -> Result<InstanceId> {
        let response = self
            .client
            .get(&self.url)
            .timeout(METADATA_TIMEOUT)
            .send()
            .await
            .map_err(|e| FlotillaError::identity(format!("metadata request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FlotillaError::identity(format!(
                "metadata endpoint answered {}",
                status
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| FlotillaError::identity(format!("metadata body unreadable: {}", e)))?;
        let id = body.trim();
        if id.is_empty() {
            return Err(FlotillaError::identity("metadata endpoint returned an empty id"));
        }

        info!("metadata reports local instance id {}", id);
        Ok(InstanceId::new(id))
    }
}
