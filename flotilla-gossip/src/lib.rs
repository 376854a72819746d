//! # Flotilla Gossip
//!
//! The membership/election substrate: a peer-to-peer liveness protocol
//! with deterministic leader election over an unreliable datagram
//! transport, plus the UDP transport used in production.
//!
//! The contract upper layers rely on:
//!
//! - `added(peer)` on first sighting, `removed(peer)` after `timeout` of
//!   silence (with the departed role preserved), `elected` when the local
//!   node wins, `leader(peer)` when a remote winner is recognized;
//! - events of one engine are totally ordered and single-dispatched;
//! - `is_leader()` is queryable at any time through the engine handle.
//!
//! Any substrate honoring the same contract can replace this one.

pub mod config;
pub mod engine;
pub mod udp;

pub use config::{
    GossipConfig, DEFAULT_INTERVAL, DEFAULT_TIMEOUT, SUB_ELECTION_INTERVAL, SUB_ELECTION_TIMEOUT,
};
pub use engine::{GossipEngine, GossipEvent, GossipHandle};
pub use udp::{UdpTransport, UdpTransportFactory};
