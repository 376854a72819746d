//! # Error Types
//!
//! Error handling for the flotilla fleet controller.

use crate::InstanceId;
use thiserror::Error;

/// Errors surfaced by flotilla components.
///
/// The agent never unwinds on these: handlers log their own failures and
/// the periodic convergence pass repairs whatever a one-shot error left
/// behind. [`FlotillaError::is_retryable`] is the transient/permanent
/// split the logging sites use to pick a severity.
#[derive(Error, Debug)]
pub enum FlotillaError {
    /// Datagram send/receive failure.
    #[error("Transport error: {message}")]
    Transport { message: String },

    /// Control-plane call failed. `status` is present for HTTP-level
    /// failures and absent for connection-level ones.
    #[error("Cloud error (status {status:?}): {message}")]
    Cloud {
        status: Option<u16>,
        message: String,
    },

    /// The metadata source could not reveal the local instance id.
    #[error("Identity error: {message}")]
    Identity { message: String },

    /// Referenced instance does not exist at the provider.
    #[error("Instance {id} not found")]
    InstanceNotFound { id: InstanceId },

    /// Operation exceeded its caller-chosen timeout.
    #[error("Timeout occurred: {operation}")]
    Timeout { operation: String },

    /// Wire or API payload could not be encoded/decoded.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Socket or other I/O failure.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Unexpected internal error.
    #[error("Internal error: {message}")]
    Internal { message: String },
}

/// Type alias for Results across the flotilla crates.
pub type Result<T> = std::result::Result<T, FlotillaError>;

impl FlotillaError {
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    pub fn cloud(message: impl Into<String>) -> Self {
        Self::Cloud {
            status: None,
            message: message.into(),
        }
    }

    pub fn cloud_status(status: u16, message: impl Into<String>) -> Self {
        Self::Cloud {
            status: Some(status),
            message: message.into(),
        }
    }

    pub fn identity(message: impl Into<String>) -> Self {
        Self::Identity {
            message: message.into(),
        }
    }

    pub fn timeout(operation: impl Into<String>) -> Self {
        Self::Timeout {
            operation: operation.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Whether the next convergence pass can plausibly succeed where this
    /// call failed.
    ///
    /// Network-level transport and cloud failures, timeouts, rate limits
    /// and 5xx responses are transient. Auth failures and template
    /// rejections (other 4xx) are permanent: repeating the call changes
    /// nothing, and the group will oscillate until an operator steps in.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport { .. } | Self::Timeout { .. } => true,
            Self::Cloud { status: None, .. } => true,
            Self::Cloud {
                status: Some(status),
                ..
            } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_cloud_failures_are_retryable() {
        assert!(FlotillaError::cloud("connection reset").is_retryable());
        assert!(FlotillaError::cloud_status(429, "rate limited").is_retryable());
        assert!(FlotillaError::cloud_status(503, "maintenance").is_retryable());
        assert!(FlotillaError::timeout("create").is_retryable());
    }

    #[test]
    fn permanent_cloud_failures_are_not() {
        assert!(!FlotillaError::cloud_status(401, "bad token").is_retryable());
        assert!(!FlotillaError::cloud_status(422, "invalid image").is_retryable());
        assert!(!FlotillaError::identity("metadata unreachable").is_retryable());
    }
}
