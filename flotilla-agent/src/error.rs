//! Error types for agent operations.

use flotilla_core::{FlotillaError, InstanceId};
use thiserror::Error;

/// Result type for agent operations
pub type AgentResult<T> = Result<T, AgentError>;

/// Errors that can occur while bootstrapping or operating an agent
#[derive(Error, Debug)]
pub enum AgentError {
    /// Startup could not complete
    #[error("Bootstrap failed: {reason}")]
    Bootstrap { reason: String },

    /// The metadata-reported local id is not part of the fleet listing.
    /// Fatal: an agent cannot manage a fleet it does not belong to.
    #[error("Local instance {id} is absent from the fleet listing")]
    NotInFleet { id: InstanceId },

    /// A group could not be registered
    #[error("Group registration failed: {reason}")]
    GroupRegistration { reason: String },

    /// Failure bubbled up from a core component
    #[error(transparent)]
    Core(#[from] FlotillaError),

    /// Internal agent error
    #[error("Internal agent error: {reason}")]
    Internal { reason: String },
}

impl AgentError {
    pub fn bootstrap(reason: impl Into<String>) -> Self {
        Self::Bootstrap {
            reason: reason.into(),
        }
    }

    pub fn internal(reason: impl Into<String>) -> Self {
        Self::Internal {
            reason: reason.into(),
        }
    }
}

impl From<anyhow::Error> for AgentError {
    fn from(err: anyhow::Error) -> Self {
        AgentError::Internal {
            reason: err.to_string(),
        }
    }
}
