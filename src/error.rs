//! Error types for identity rotation.

use thiserror::Error;

/// Errors surfaced by the rotator and its collaborators.
///
/// Everything except [`RotatorError::Lookup`] is fatal: the loop stops and
/// the process exits non-zero.
#[derive(Error, Debug)]
pub enum RotatorError {
    /// The Tor control port could not be reached, or the connection dropped.
    #[error("Connection failed: {0}")]
    Connection(String),

    /// Tor rejected the control password.
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Tor rejected a command or sent a reply we could not understand.
    #[error("Control protocol error: {0}")]
    ControlProtocol(String),

    /// The public address lookup failed or timed out.
    #[error("Address lookup failed: {0}")]
    Lookup(String),

    /// Invalid configuration.
    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl RotatorError {
    /// Whether the loop may continue after this error.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Lookup(_))
    }
}

/// Result type for rotation operations.
pub type Result<T> = std::result::Result<T, RotatorError>;
