//! # Flotilla Testing
//!
//! Test doubles for the three collaborator seams, plus the fixtures the
//! end-to-end scenario tests under `tests/` are built from:
//!
//! - [`DatagramBus`] / [`InMemoryDatagram`] / [`BusTransportFactory`]:
//!   a process-local network where killing a host is one call
//! - [`ScriptedCloud`]: an in-memory control plane that records every
//!   call and fails on request
//! - [`StaticIdentity`]: a fixed answer to "who am I"

pub mod cloud;
pub mod fixtures;
pub mod identity;
pub mod network;

pub use cloud::{CloudCall, ScriptedCloud};
pub use identity::StaticIdentity;
pub use network::{BusTransportFactory, DatagramBus, InMemoryDatagram};
