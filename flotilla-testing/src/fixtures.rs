//! Shared fixtures for scenario tests.

use flotilla_core::{AddressKind, Instance, InstanceAddress, InstanceId, InstanceRegion};
use std::time::Duration;

/// A provider instance with one private address.
pub fn instance(id: &str, private_ip: &str, tags: &[&str]) -> Instance {
    Instance {
        id: InstanceId::new(id),
        name: format!("node-{}", id),
        region: InstanceRegion {
            slug: "ams3".to_string(),
        },
        tags: tags.iter().map(|t| t.to_string()).collect(),
        addresses: vec![InstanceAddress {
            kind: AddressKind::Private,
            address: private_ip.to_string(),
        }],
    }
}

/// Poll `check` until it holds or `deadline` passes.
pub async fn wait_for<F>(deadline: Duration, what: &str, mut check: F)
where
    F: FnMut() -> bool,
{
    let start = tokio::time::Instant::now();
    while start.elapsed() < deadline {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("timed out waiting for {}", what);
}
