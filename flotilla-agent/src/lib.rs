//! # Flotilla Agent
//!
//! The group controller: the layer that turns gossip membership deltas
//! into create/destroy actions against the provider control plane.
//!
//! This crate provides:
//! - [`Agent`]: bootstrap, the serialized event-dispatch loop, and
//!   group registration with optional floating-address sub-elections
//! - [`ServerRegistry`]: the canonical in-memory view of known nodes
//!   and the group-membership predicate
//! - [`PendingRemovals`]: the staging buffer that lets the fleet
//!   survive the death of its own leader
//!
//! Leadership gating is the core rule: every agent observes the same
//! events, but only the elected leader destroys instances and converges
//! groups, and a removal seen while leaderless is staged until someone
//! wins.

pub mod agent;
pub mod config;
pub mod error;
pub mod pending;
pub mod registry;

pub use agent::Agent;
pub use config::{AgentConfig, DEFAULT_PORT};
pub use error::{AgentError, AgentResult};
pub use pending::PendingRemovals;
pub use registry::ServerRegistry;
