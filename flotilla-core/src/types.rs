//! # Core Types
//!
//! Fundamental types shared across the flotilla fleet controller.

use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::net::SocketAddr;
use uuid::Uuid;

/// Opaque provider-assigned identifier for a cloud instance.
///
/// The IaaS provider owns identity: ids are stable strings, never minted
/// locally. They are the primary key of the server registry and the
/// tie-break value of leader elections (lowest id wins, compared
/// lexicographically).
///
/// # Examples
///
/// ```rust
/// use flotilla_core::InstanceId;
///
/// let a = InstanceId::new("10001");
/// let b = InstanceId::new("10002");
/// assert!(a < b);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InstanceId(String);

impl InstanceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for InstanceId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for InstanceId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Role a peer holds in the gossip view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PeerRole {
    /// Ordinary fleet member.
    Citizen,
    /// The one peer (per partition) authorized to mutate the fleet.
    Leader,
}

impl fmt::Display for PeerRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PeerRole::Citizen => write!(f, "citizen"),
            PeerRole::Leader => write!(f, "leader"),
        }
    }
}

/// Liveness of a peer as judged by the local gossip engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerStatus {
    Alive,
    Removed,
}

/// Snapshot of a peer carried by every gossip event.
///
/// The `role` is the one the peer held at the instant the event was
/// decided; a `Removed` event for a dead leader therefore still says
/// `Leader`, which is what the pending-removal protocol keys on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerInfo {
    pub id: InstanceId,
    pub endpoint: SocketAddr,
    pub role: PeerRole,
    /// Per-boot identity. A peer that dies and comes back under the same
    /// instance id announces a fresh incarnation, which is what allows it
    /// to be re-added after having been marked removed.
    pub incarnation: Uuid,
}

/// Kind of a provider-reported instance address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AddressKind {
    Private,
    Public,
}

/// One address record on a provider instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceAddress {
    #[serde(rename = "type")]
    pub kind: AddressKind,
    #[serde(rename = "ip_address")]
    pub address: String,
}

/// Region descriptor on a provider instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceRegion {
    pub slug: String,
}

/// Full instance payload as returned by the provider control plane.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instance {
    pub id: InstanceId,
    pub name: String,
    pub region: InstanceRegion,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub addresses: Vec<InstanceAddress>,
}

impl Instance {
    /// First address of the given kind, if the provider reported one.
    pub fn address_of(&self, kind: AddressKind) -> Option<&str> {
        self.addresses
            .iter()
            .find(|a| a.kind == kind)
            .map(|a| a.address.as_str())
    }
}

/// Projection of a provider instance into the server registry.
///
/// One record per known node, keyed by [`InstanceId`]. Only the first
/// address of each kind survives the projection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeRecord {
    pub id: InstanceId,
    pub name: String,
    pub region: String,
    pub tags: Vec<String>,
    pub private_address: Option<String>,
    pub public_address: Option<String>,
}

impl NodeRecord {
    pub fn from_instance(instance: &Instance) -> Self {
        Self {
            id: instance.id.clone(),
            name: instance.name.clone(),
            region: instance.region.slug.clone(),
            tags: instance.tags.clone(),
            private_address: instance
                .address_of(AddressKind::Private)
                .map(str::to_string),
            public_address: instance.address_of(AddressKind::Public).map(str::to_string),
        }
    }

    /// Private address when present, public otherwise. Gossip endpoints
    /// are derived from this.
    pub fn preferred_address(&self) -> Option<&str> {
        self.private_address
            .as_deref()
            .or(self.public_address.as_deref())
    }

    /// A node with no address of either kind cannot participate in gossip.
    pub fn is_reachable(&self) -> bool {
        self.private_address.is_some() || self.public_address.is_some()
    }
}

/// Opaque payload handed to the provider's create call.
///
/// `name` is the base name; [`ProvisioningTemplate::named`] stamps the
/// concrete per-instance name before the call goes out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvisioningTemplate {
    pub name: String,
    pub region: String,
    pub size: String,
    pub image: String,
    #[serde(default)]
    pub ssh_keys: Vec<String>,
    #[serde(default)]
    pub backups: bool,
    #[serde(default)]
    pub ipv6: bool,
    #[serde(default)]
    pub private_networking: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_data: Option<String>,
    #[serde(default)]
    pub monitoring: bool,
    #[serde(default)]
    pub volumes: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl ProvisioningTemplate {
    pub fn new(
        name: impl Into<String>,
        region: impl Into<String>,
        size: impl Into<String>,
        image: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            region: region.into(),
            size: size.into(),
            image: image.into(),
            ssh_keys: Vec::new(),
            backups: false,
            ipv6: false,
            private_networking: true,
            user_data: None,
            monitoring: false,
            volumes: Vec::new(),
            tags: Vec::new(),
        }
    }

    pub fn with_ssh_keys(mut self, keys: Vec<String>) -> Self {
        self.ssh_keys = keys;
        self
    }

    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }

    pub fn with_user_data(mut self, user_data: impl Into<String>) -> Self {
        self.user_data = Some(user_data.into());
        self
    }

    pub fn with_volumes(mut self, volumes: Vec<String>) -> Self {
        self.volumes = volumes;
        self
    }

    /// Copy of this template with a concrete instance name filled in.
    pub fn named(&self, name: impl Into<String>) -> Self {
        let mut template = self.clone();
        template.name = name.into();
        template
    }
}

/// Definition of a managed group: which nodes belong, how many there
/// should be, and how to provision replacements.
///
/// Immutable after registration. Membership is evaluated against the
/// registry on every pass; no member list is stored here.
#[derive(Debug, Clone)]
pub struct GroupSpec {
    /// A node belongs to the group iff every one of its tags is either in
    /// this set or equal to the fleet tag. Extra tags exclude the node.
    pub match_tags: BTreeSet<String>,
    pub desired_size: usize,
    pub template: ProvisioningTemplate,
    /// Mobile address reassigned to the group's sub-election leader.
    pub floating_address: Option<String>,
}

impl GroupSpec {
    pub fn new(
        match_tags: impl IntoIterator<Item = impl Into<String>>,
        template: ProvisioningTemplate,
    ) -> Self {
        Self {
            match_tags: match_tags.into_iter().map(Into::into).collect(),
            desired_size: 1,
            template,
            floating_address: None,
        }
    }

    pub fn with_desired_size(mut self, desired_size: usize) -> Self {
        self.desired_size = desired_size;
        self
    }

    pub fn with_floating_address(mut self, address: impl Into<String>) -> Self {
        self.floating_address = Some(address.into());
        self
    }
}

/// Length of the random token appended to provisioned names.
pub const NAME_SUFFIX_LEN: usize = 8;

/// Derive a collision-resistant instance name from a group's base name.
///
/// The token is drawn from ASCII alphanumerics only. The provider rejects
/// underscores in instance names, so the usual base64-ish id alphabets are
/// off the table.
///
/// ```rust
/// use flotilla_core::provision_name;
///
/// let name = provision_name("web");
/// assert!(name.starts_with("web-"));
/// assert!(name.chars().all(|c| c.is_ascii_alphanumeric() || c == '-'));
/// ```
pub fn provision_name(base: &str) -> String {
    let token: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(NAME_SUFFIX_LEN)
        .map(char::from)
        .collect();
    format!("{}-{}", base, token)
}
