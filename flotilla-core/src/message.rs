//! Gossip wire messages.
//!
//! The fleet runs one build, so interop is not a concern; the format only
//! has to be textual, small and self-delimiting. JSON over a single
//! datagram satisfies all three.

use crate::{FlotillaError, InstanceId, PeerRole, Result};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use uuid::Uuid;

/// A peer as announced inside a hello message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerAnnouncement {
    pub id: InstanceId,
    pub endpoint: SocketAddr,
    pub role: PeerRole,
}

/// Messages exchanged between gossip engines.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum GossipMessage {
    /// Periodic liveness beacon. Carries the sender's identity and role
    /// plus every peer the sender knows to be alive, which is how
    /// newcomers propagate without a membership service.
    Hello {
        id: InstanceId,
        role: PeerRole,
        incarnation: Uuid,
        peers: Vec<PeerAnnouncement>,
    },
}

impl GossipMessage {
    pub fn encode(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(FlotillaError::from)
    }

    pub fn decode(payload: &[u8]) -> Result<Self> {
        serde_json::from_slice(payload).map_err(FlotillaError::from)
    }
}
