//! Error types for the plugin server.

use crate::handshake::HandshakeError;
use plinth_provider_core::ProviderError;
use thiserror::Error;

/// Errors that stop the plugin server from starting or running.
///
/// All of these are fatal: `serve` returns them and the process is expected
/// to exit with a non-zero status.
#[derive(Error, Debug)]
pub enum ServeError {
    /// The host handshake could not be completed.
    #[error(transparent)]
    Handshake(#[from] HandshakeError),

    /// The provider factory produced an unusable provider.
    #[error("Invalid provider: {0}")]
    InvalidProvider(#[source] ProviderError),

    /// No port in the configured range could be bound.
    #[error("Failed to bind plugin listener in port range {min}-{max}")]
    Bind { min: u16, max: u16 },

    /// Serve configuration is invalid or unreadable.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The async runtime could not be created.
    #[error("Runtime error: {0}")]
    Runtime(#[source] std::io::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for serve operations.
pub type ServeResult<T> = std::result::Result<T, ServeError>;
