//! Gossip substrate scenarios: discovery, liveness and leader election
//! across real engines wired over the in-memory network.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

use flotilla_core::{InstanceId, PeerRole};
use flotilla_gossip::{GossipConfig, GossipEngine, GossipEvent, GossipHandle};
use flotilla_testing::fixtures::wait_for;
use flotilla_testing::DatagramBus;

const PORT: u16 = 9000;

fn addr(host: &str) -> SocketAddr {
    format!("{}:{}", host, PORT).parse().unwrap()
}

type EventLog = Arc<Mutex<Vec<GossipEvent>>>;

fn spawn_engine(
    bus: &DatagramBus,
    id: &str,
    host: &str,
    seeds: &[&str],
) -> (GossipHandle, EventLog) {
    let transport = bus.open(addr(host));
    let config = GossipConfig::new(InstanceId::new(id))
        .with_interval(Duration::from_millis(100))
        .with_timeout(Duration::from_millis(800))
        .with_seed_peers(seeds.iter().map(|h| addr(h)).collect());

    let (events_tx, mut events_rx) = mpsc::unbounded_channel();
    let (engine, handle) = GossipEngine::new(config, transport, events_tx);
    tokio::spawn(engine.run());

    let log: EventLog = Arc::new(Mutex::new(Vec::new()));
    let sink = log.clone();
    tokio::spawn(async move {
        while let Some(event) = events_rx.recv().await {
            sink.lock().unwrap().push(event);
        }
    });

    (handle, log)
}

fn saw_leader(log: &EventLog, id: &str) -> bool {
    log.lock().unwrap().iter().any(|event| {
        matches!(event, GossipEvent::Leader(info) if info.id == InstanceId::new(id))
    })
}

#[tokio::test]
async fn two_engines_settle_on_one_leader() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::WARN)
        .try_init();

    let bus = DatagramBus::new();
    let (a, log_a) = spawn_engine(&bus, "1", "10.0.0.1", &["10.0.0.2"]);
    let (b, log_b) = spawn_engine(&bus, "2", "10.0.0.2", &["10.0.0.1"]);

    // Each engine discovers the other.
    wait_for(Duration::from_secs(5), "mutual discovery", || {
        let a_saw = log_a
            .lock()
            .unwrap()
            .iter()
            .any(|e| matches!(e, GossipEvent::Added(info) if info.id == InstanceId::new("2")));
        let b_saw = log_b
            .lock()
            .unwrap()
            .iter()
            .any(|e| matches!(e, GossipEvent::Added(info) if info.id == InstanceId::new("1")));
        a_saw && b_saw
    })
    .await;

    // Exactly one of them ends up leader; the loser of any claim race
    // reverts on seeing the other's claim.
    wait_for(Duration::from_secs(5), "a single leader", || {
        a.is_leader() != b.is_leader()
    })
    .await;

    // Give any concurrent-claim churn time to settle, then re-check.
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert!(a.is_leader() != b.is_leader());

    // The citizen recognized the winner.
    let (winner_id, citizen_log) = if a.is_leader() {
        ("1", &log_b)
    } else {
        ("2", &log_a)
    };
    assert!(saw_leader(citizen_log, winner_id));
}

#[tokio::test]
async fn dead_leader_is_removed_with_role_and_succeeded() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::WARN)
        .try_init();

    let bus = DatagramBus::new();
    let (a, log_a) = spawn_engine(&bus, "1", "10.0.0.1", &["10.0.0.2"]);
    let (b, log_b) = spawn_engine(&bus, "2", "10.0.0.2", &["10.0.0.1"]);

    wait_for(Duration::from_secs(5), "a single leader", || {
        a.is_leader() != b.is_leader()
    })
    .await;
    tokio::time::sleep(Duration::from_millis(500)).await;

    let (dead_id, dead_host, dead_handle, survivor, survivor_log) = if a.is_leader() {
        ("1", "10.0.0.1", &a, &b, &log_b)
    } else {
        ("2", "10.0.0.2", &b, &a, &log_a)
    };

    dead_handle.shutdown();
    bus.detach_host(dead_host.parse().unwrap());

    // The survivor times the leader out, with the departed role intact.
    wait_for(Duration::from_secs(5), "removal of the dead leader", || {
        survivor_log.lock().unwrap().iter().any(|event| {
            matches!(event, GossipEvent::Removed(info)
                if info.id == InstanceId::new(dead_id) && info.role == PeerRole::Leader)
        })
    })
    .await;

    // And then takes over.
    wait_for(Duration::from_secs(5), "succession", || survivor.is_leader()).await;

    // Every sighting precedes the removal at this observer.
    let log = survivor_log.lock().unwrap();
    let added_at = log
        .iter()
        .position(|e| matches!(e, GossipEvent::Added(info) if info.id == InstanceId::new(dead_id)))
        .expect("the dead peer was sighted");
    let removed_at = log
        .iter()
        .position(
            |e| matches!(e, GossipEvent::Removed(info) if info.id == InstanceId::new(dead_id)),
        )
        .expect("the dead peer was removed");
    assert!(added_at < removed_at);
}

#[tokio::test]
async fn peers_propagate_through_hellos() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::WARN)
        .try_init();

    let bus = DatagramBus::new();
    // A and C only know B; they must learn of each other through B's
    // hello payloads.
    let (_a, log_a) = spawn_engine(&bus, "1", "10.0.0.1", &["10.0.0.2"]);
    let (_b, _log_b) = spawn_engine(&bus, "2", "10.0.0.2", &[]);
    let (_c, _log_c) = spawn_engine(&bus, "3", "10.0.0.3", &["10.0.0.2"]);

    wait_for(Duration::from_secs(5), "transitive discovery", || {
        log_a
            .lock()
            .unwrap()
            .iter()
            .any(|e| matches!(e, GossipEvent::Added(info) if info.id == InstanceId::new("3")))
    })
    .await;
}

#[tokio::test]
async fn malformed_datagrams_are_survivable() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::WARN)
        .try_init();

    let bus = DatagramBus::new();
    let (a, _log) = spawn_engine(&bus, "1", "10.0.0.1", &[]);

    for _ in 0..10 {
        bus.inject(addr("10.0.0.99"), addr("10.0.0.1"), b"definitely not json");
    }

    // The engine shrugs the garbage off and still wins its election.
    wait_for(Duration::from_secs(5), "election despite garbage", || {
        a.is_leader()
    })
    .await;
}
