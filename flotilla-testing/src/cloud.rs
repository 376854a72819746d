//! Scripted stand-in for the provider control plane.

use async_trait::async_trait;
use flotilla_core::{
    AddressKind, CloudProvider, FlotillaError, Instance, InstanceAddress, InstanceId,
    InstanceRegion, ProvisioningTemplate, Result,
};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;

/// One observed control-plane call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloudCall {
    List(String),
    Get(InstanceId),
    Create(String),
    Destroy(InstanceId),
    AssignFloating(String, InstanceId),
}

/// In-memory cloud with a full call log and scriptable failures.
///
/// `create` registers the instance in the table and mints an id, but
/// nothing tells the caller's registry about it; like the real thing,
/// a created node only becomes visible through listing or gossip.
#[derive(Default)]
pub struct ScriptedCloud {
    instances: Mutex<BTreeMap<InstanceId, Instance>>,
    calls: Mutex<Vec<CloudCall>>,
    failing_creates: AtomicUsize,
    failing_destroys: AtomicUsize,
    next_id: AtomicU64,
}

impl ScriptedCloud {
    pub fn new() -> Self {
        let cloud = Self::default();
        cloud.next_id.store(90_000, Ordering::Relaxed);
        cloud
    }

    /// Pre-populate the provider with an existing instance.
    pub fn seed(&self, instance: Instance) {
        self.instances
            .lock()
            .unwrap()
            .insert(instance.id.clone(), instance);
    }

    /// Make the next `count` create calls fail with a 503.
    pub fn fail_next_creates(&self, count: usize) {
        self.failing_creates.store(count, Ordering::SeqCst);
    }

    /// Make the next `count` destroy calls fail with a 503.
    pub fn fail_next_destroys(&self, count: usize) {
        self.failing_destroys.store(count, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<CloudCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn created_names(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                CloudCall::Create(name) => Some(name),
                _ => None,
            })
            .collect()
    }

    pub fn destroyed_ids(&self) -> Vec<InstanceId> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                CloudCall::Destroy(id) => Some(id),
                _ => None,
            })
            .collect()
    }

    pub fn assignments(&self) -> Vec<(String, InstanceId)> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                CloudCall::AssignFloating(address, id) => Some((address, id)),
                _ => None,
            })
            .collect()
    }

    pub fn contains(&self, id: &InstanceId) -> bool {
        self.instances.lock().unwrap().contains_key(id)
    }

    fn record(&self, call: CloudCall) {
        self.calls.lock().unwrap().push(call);
    }

    fn take_failure(counter: &AtomicUsize) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl CloudProvider for ScriptedCloud {
    async fn list_by_tag(&self, tag: &str) -> Result<Vec<Instance>> {
        self.record(CloudCall::List(tag.to_string()));
        Ok(self
            .instances
            .lock()
            .unwrap()
            .values()
            .filter(|instance| instance.tags.iter().any(|t| t == tag))
            .cloned()
            .collect())
    }

    async fn get(&self, id: &InstanceId) -> Result<Instance> {
        self.record(CloudCall::Get(id.clone()));
        self.instances
            .lock()
            .unwrap()
            .get(id)
            .cloned()
            .ok_or(FlotillaError::InstanceNotFound { id: id.clone() })
    }

    async fn create(&self, template: &ProvisioningTemplate) -> Result<InstanceId> {
        self.record(CloudCall::Create(template.name.clone()));
        if Self::take_failure(&self.failing_creates) {
            return Err(FlotillaError::cloud_status(503, "scripted create failure"));
        }

        let serial = self.next_id.fetch_add(1, Ordering::SeqCst);
        let id = InstanceId::new(serial.to_string());
        let instance = Instance {
            id: id.clone(),
            name: template.name.clone(),
            region: InstanceRegion {
                slug: template.region.clone(),
            },
            tags: template.tags.clone(),
            addresses: vec![InstanceAddress {
                kind: AddressKind::Private,
                address: format!("10.200.{}.{}", serial / 250 % 250, serial % 250),
            }],
        };
        self.instances.lock().unwrap().insert(id.clone(), instance);
        Ok(id)
    }

    async fn destroy(&self, id: &InstanceId) -> Result<()> {
        self.record(CloudCall::Destroy(id.clone()));
        if Self::take_failure(&self.failing_destroys) {
            return Err(FlotillaError::cloud_status(503, "scripted destroy failure"));
        }
        // Destroying an unknown id is fine; the provider treats repeats
        // as already done.
        self.instances.lock().unwrap().remove(id);
        Ok(())
    }

    async fn assign_floating_address(&self, address: &str, id: &InstanceId) -> Result<()> {
        self.record(CloudCall::AssignFloating(address.to_string(), id.clone()));
        Ok(())
    }
}
