//! Agent errors

use std::path::PathBuf;
use thiserror::Error;
use wiremesh_overlay::OverlayError;

/// Agent errors
///
/// Everything except [`AgentError::CorruptState`] is retried on the next tick.
#[derive(Debug, Error)]
pub enum AgentError {
    /// Coordinator could not be reached or answered garbage
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Coordinator answered with an error status
    #[error("Coordinator error ({status}): {message}")]
    Server { status: u16, message: String },

    /// Host token rejected
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Local settings or key file cannot be parsed
    #[error("Corrupt local state in {}: {reason}", path.display())]
    CorruptState { path: PathBuf, reason: String },

    /// Settings entry the agent cannot turn into an interface configuration
    #[error("Invalid settings for '{interface}': {reason}")]
    InvalidSettings { interface: String, reason: String },

    /// Peer endpoint could not be resolved
    #[error("Cannot resolve endpoint '{address}': {reason}")]
    Endpoint { address: String, reason: String },

    /// Interface controller failure
    #[error(transparent)]
    Overlay(#[from] OverlayError),

    /// Serialization failure while writing local state
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Local file I/O
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Missing or invalid configuration
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl AgentError {
    /// Errors that stop the agent instead of waiting for the next tick
    pub fn is_fatal(&self) -> bool {
        matches!(self, AgentError::CorruptState { .. })
    }
}

pub type Result<T, E = AgentError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_corrupt_state_is_fatal() {
        let corrupt = AgentError::CorruptState {
            path: PathBuf::from("/var/lib/wiremesh/settings.json"),
            reason: "expected value".into(),
        };
        assert!(corrupt.is_fatal());
        assert!(corrupt.to_string().contains("settings.json"));

        let server = AgentError::Server {
            status: 500,
            message: "boom".into(),
        };
        assert!(!server.is_fatal());
        assert!(!AgentError::Configuration("x".into()).is_fatal());
    }
}
