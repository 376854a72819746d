use flotilla_gossip::{SUB_ELECTION_INTERVAL, SUB_ELECTION_TIMEOUT};
use std::time::Duration;

/// Default gossip port.
pub const DEFAULT_PORT: u16 = 12345;

/// Construction parameters for an agent.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Control-plane API token. The agent itself never touches it; it is
    /// carried here so whoever wires the agent up can hand it to the
    /// cloud client.
    pub key: String,
    /// The fleet tag: every managed instance carries it, and it is the
    /// wildcard of the group-membership predicate.
    pub tag: String,
    /// Liveness timeout for the fleet gossip engine.
    pub timeout: Duration,
    /// Heartbeat interval for the fleet gossip engine, and the cadence
    /// of the leader's periodic convergence pass.
    pub interval: Duration,
    /// Gossip port. Sub-elections bind at increasing offsets above it.
    pub port: u16,
    /// Heartbeat interval for floating-address sub-elections. Tighter
    /// than the fleet cadence because it governs client-visible address
    /// flips.
    pub sub_interval: Duration,
    /// Liveness timeout for floating-address sub-elections.
    pub sub_timeout: Duration,
}

impl AgentConfig {
    pub fn new(key: impl Into<String>, tag: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            tag: tag.into(),
            timeout: Duration::from_millis(60_000),
            interval: Duration::from_millis(10_000),
            port: DEFAULT_PORT,
            sub_interval: SUB_ELECTION_INTERVAL,
            sub_timeout: SUB_ELECTION_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_sub_election_timings(mut self, interval: Duration, timeout: Duration) -> Self {
        self.sub_interval = interval;
        self.sub_timeout = timeout;
        self
    }
}
