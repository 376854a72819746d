//! Server registry: the canonical in-memory view of known nodes.

use flotilla_core::{GroupSpec, Instance, InstanceId, NodeRecord};
use std::collections::HashMap;
use tracing::debug;

/// Map of every known node, keyed by provider instance id.
///
/// The registry is the single source of truth for group membership:
/// groups keep no member lists, they are evaluated against current
/// registry tags on every pass.
#[derive(Debug)]
pub struct ServerRegistry {
    fleet_tag: String,
    nodes: HashMap<InstanceId, NodeRecord>,
}

impl ServerRegistry {
    pub fn new(fleet_tag: impl Into<String>) -> Self {
        Self {
            fleet_tag: fleet_tag.into(),
            nodes: HashMap::new(),
        }
    }

    pub fn fleet_tag(&self) -> &str {
        &self.fleet_tag
    }

    /// Project a provider instance into the registry, replacing any
    /// previous record under the same id.
    pub fn upsert(&mut self, instance: &Instance) -> NodeRecord {
        let record = NodeRecord::from_instance(instance);
        debug!("registry upsert {} ({})", record.id, record.name);
        self.nodes.insert(record.id.clone(), record.clone());
        record
    }

    pub fn remove(&mut self, id: &InstanceId) -> Option<NodeRecord> {
        let removed = self.nodes.remove(id);
        if removed.is_some() {
            debug!("registry removed {}", id);
        }
        removed
    }

    pub fn get(&self, id: &InstanceId) -> Option<&NodeRecord> {
        self.nodes.get(id)
    }

    pub fn contains(&self, id: &InstanceId) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &NodeRecord> {
        self.nodes.values()
    }

    /// Whether a node belongs to a group.
    ///
    /// Asymmetric on purpose: every tag the node carries must be either
    /// in the group's `match_tags` or equal to the fleet tag. A node
    /// with extra tags is *not* a member, which keeps a broadly-tagged
    /// node from being consumed by a narrow group's shrink logic.
    pub fn is_member(&self, record: &NodeRecord, group: &GroupSpec) -> bool {
        record
            .tags
            .iter()
            .all(|tag| group.match_tags.contains(tag) || *tag == self.fleet_tag)
    }

    /// Current members of a group, sorted by id so that callers who pick
    /// a prefix to shrink do so deterministically.
    pub fn members_of(&self, group: &GroupSpec) -> Vec<&NodeRecord> {
        let mut members: Vec<&NodeRecord> = self
            .nodes
            .values()
            .filter(|record| self.is_member(record, group))
            .collect();
        members.sort_by(|a, b| a.id.cmp(&b.id));
        members
    }
}
