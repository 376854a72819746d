use flotilla_core::InstanceId;
use std::net::SocketAddr;
use std::time::Duration;
use uuid::Uuid;

/// Fleet-engine heartbeat cadence.
pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(10_000);
/// Fleet-engine liveness timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(60_000);

/// Sub-election cadence; tighter because it governs client-visible
/// address flips.
pub const SUB_ELECTION_INTERVAL: Duration = Duration::from_millis(3_000);
pub const SUB_ELECTION_TIMEOUT: Duration = Duration::from_millis(10_000);

#[derive(Debug, Clone)]
pub struct GossipConfig {
    /// The local node's provider instance id.
    pub local_id: InstanceId,
    /// Fresh per-boot identity; lets peers tell a rebooted node apart
    /// from the dead one it replaced.
    pub incarnation: Uuid,
    /// Endpoints contacted every heartbeat even before any peer is known.
    pub seed_peers: Vec<SocketAddr>,
    /// Heartbeat broadcast interval.
    pub interval: Duration,
    /// Silence after which a peer is declared removed.
    pub timeout: Duration,
}

impl GossipConfig {
    pub fn new(local_id: InstanceId) -> Self {
        Self {
            local_id,
            incarnation: Uuid::new_v4(),
            seed_peers: Vec::new(),
            interval: DEFAULT_INTERVAL,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_seed_peers(mut self, seed_peers: Vec<SocketAddr>) -> Self {
        self.seed_peers = seed_peers;
        self
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}
