//! # Flotilla Core
//!
//! Core types and collaborator contracts for the flotilla fleet
//! controller: a decentralized, self-healing membership layer for cloud
//! VM fleets.
//!
//! An identical agent runs on every node. Agents gossip liveness over an
//! unreliable datagram transport, elect a leader per partition, and the
//! leader converges each configured group back to its desired size by
//! creating and destroying instances through the provider control plane.
//!
//! This crate holds what every other flotilla crate agrees on:
//!
//! - **Identity and records**: [`InstanceId`], [`NodeRecord`] and
//!   [`Instance`], the provider payload shape and its registry
//!   projection.
//! - **Gossip vocabulary**: [`PeerInfo`], [`PeerRole`], [`PeerStatus`]
//!   and the [`GossipMessage`] wire format.
//! - **Group definitions**: [`GroupSpec`], [`ProvisioningTemplate`] and
//!   the provider-safe [`provision_name`] generator.
//! - **Collaborator seams**: [`CloudProvider`], [`IdentityProvider`] and
//!   [`DatagramTransport`], the three places where production and test
//!   implementations diverge.
//! - **Errors**: [`FlotillaError`] with its transient/permanent
//!   classifier.

pub mod cloud;
pub mod error;
pub mod identity;
pub mod message;
pub mod transport;
pub mod types;

pub use cloud::CloudProvider;
pub use error::{FlotillaError, Result};
pub use identity::IdentityProvider;
pub use message::{GossipMessage, PeerAnnouncement};
pub use transport::{DatagramTransport, TransportFactory};
pub use types::*;
