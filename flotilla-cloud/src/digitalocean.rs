//! DigitalOcean control-plane client.
//!
//! JSON-over-HTTPS against the droplet API. The wire shapes live here,
//! private to this crate; callers only ever see the core `Instance`
//! projection. No retries at this layer: a failed call is reported and
//! the next convergence pass is the retry.

use async_trait::async_trait;
use flotilla_core::{
    AddressKind, CloudProvider, FlotillaError, Instance, InstanceAddress, InstanceId,
    InstanceRegion, ProvisioningTemplate, Result,
};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info};

const DEFAULT_BASE_URL: &str = "https://api.digitalocean.com";
const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(30);
const PAGE_SIZE: usize = 200;

/// Bearer-token client for the droplet control plane.
pub struct DigitalOcean {
    client: reqwest::Client,
    base_url: String,
    token: String,
    call_timeout: Duration,
}

impl DigitalOcean {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: DEFAULT_BASE_URL.to_string(),
            token: token.into(),
            call_timeout: DEFAULT_CALL_TIMEOUT,
        }
    }

    /// Point the client somewhere else, e.g. a local test server.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_call_timeout(mut self, call_timeout: Duration) -> Self {
        self.call_timeout = call_timeout;
        self
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        self.client
            .request(method, format!("{}{}", self.base_url, path))
            .bearer_auth(&self.token)
            .timeout(self.call_timeout)
    }

    async fn execute(&self, builder: reqwest::RequestBuilder) -> Result<reqwest::Response> {
        let response = builder.send().await.map_err(classify)?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(FlotillaError::cloud_status(status.as_u16(), body))
    }
}

fn classify(error: reqwest::Error) -> FlotillaError {
    if error.is_timeout() {
        FlotillaError::timeout(error.to_string())
    } else {
        FlotillaError::cloud(error.to_string())
    }
}

#[async_trait]
impl CloudProvider for DigitalOcean {
    async fn list_by_tag(&self, tag: &str) -> Result<Vec<Instance>> {
        let mut instances = Vec::new();
        let mut page = 1usize;

        loop {
            let path = format!(
                "/v2/droplets?tag_name={}&page={}&per_page={}",
                tag, page, PAGE_SIZE
            );
            let response = self.execute(self.request(reqwest::Method::GET, &path)).await?;
            let listing: DropletPage = response.json().await.map_err(classify)?;

            instances.extend(listing.droplets.iter().map(DropletPayload::project));

            let has_next = listing
                .links
                .and_then(|l| l.pages)
                .and_then(|p| p.next)
                .is_some();
            if !has_next {
                break;
            }
            page += 1;
        }

        debug!("listed {} instance(s) tagged {}", instances.len(), tag);
        Ok(instances)
    }

    async fn get(&self, id: &InstanceId) -> Result<Instance> {
        let path = format!("/v2/droplets/{}", id);
        let response = self.request(reqwest::Method::GET, &path).send().await.map_err(classify)?;

        if response.status().as_u16() == 404 {
            return Err(FlotillaError::InstanceNotFound { id: id.clone() });
        }
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(FlotillaError::cloud_status(status.as_u16(), body));
        }

        let envelope: DropletEnvelope = response.json().await.map_err(classify)?;
        Ok(envelope.droplet.project())
    }

    async fn create(&self, template: &ProvisioningTemplate) -> Result<InstanceId> {
        let response = self
            .execute(self.request(reqwest::Method::POST, "/v2/droplets").json(template))
            .await?;
        let envelope: DropletEnvelope = response.json().await.map_err(classify)?;
        let id = InstanceId::new(envelope.droplet.id.to_string());

        info!("created instance {} ({})", id, envelope.droplet.name);
        Ok(id)
    }

    async fn destroy(&self, id: &InstanceId) -> Result<()> {
        let path = format!("/v2/droplets/{}", id);
        let response = self
            .request(reqwest::Method::DELETE, &path)
            .send()
            .await
            .map_err(classify)?;

        // Already gone counts as destroyed.
        let status = response.status();
        if status.is_success() || status.as_u16() == 404 {
            info!("destroyed instance {}", id);
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        Err(FlotillaError::cloud_status(status.as_u16(), body))
    }

    async fn assign_floating_address(&self, address: &str, id: &InstanceId) -> Result<()> {
        let droplet_id: u64 = id.as_str().parse().map_err(|_| {
            FlotillaError::internal(format!("instance id {} is not a droplet id", id))
        })?;
        let path = format!("/v2/floating_ips/{}/actions", address);
        let body = serde_json::json!({ "type": "assign", "droplet_id": droplet_id });

        self.execute(self.request(reqwest::Method::POST, &path).json(&body))
            .await?;
        info!("assigned floating address {} to {}", address, id);
        Ok(())
    }
}

// Wire shapes. Droplet ids are numbers on the wire and opaque strings
// everywhere else in flotilla.

#[derive(Debug, Deserialize)]
struct DropletPage {
    droplets: Vec<DropletPayload>,
    links: Option<Links>,
}

#[derive(Debug, Deserialize)]
struct Links {
    pages: Option<Pages>,
}

#[derive(Debug, Deserialize)]
struct Pages {
    next: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DropletEnvelope {
    droplet: DropletPayload,
}

#[derive(Debug, Deserialize)]
struct DropletPayload {
    id: u64,
    name: String,
    region: RegionPayload,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default)]
    networks: NetworksPayload,
}

#[derive(Debug, Deserialize)]
struct RegionPayload {
    slug: String,
}

#[derive(Debug, Default, Deserialize)]
struct NetworksPayload {
    #[serde(default)]
    v4: Vec<NetworkV4Payload>,
}

#[derive(Debug, Deserialize)]
struct NetworkV4Payload {
    ip_address: String,
    #[serde(rename = "type")]
    kind: String,
}

impl DropletPayload {
    fn project(&self) -> Instance {
        let addresses = self
            .networks
            .v4
            .iter()
            .filter_map(|n| {
                let kind = match n.kind.as_str() {
                    "private" => AddressKind::Private,
                    "public" => AddressKind::Public,
                    _ => return None,
                };
                Some(InstanceAddress {
                    kind,
                    address: n.ip_address.clone(),
                })
            })
            .collect();

        Instance {
            id: InstanceId::new(self.id.to_string()),
            name: self.name.clone(),
            region: InstanceRegion {
                slug: self.region.slug.clone(),
            },
            tags: self.tags.clone(),
            addresses,
        }
    }
}
