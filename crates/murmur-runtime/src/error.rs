//! Runtime error types.

use murmur_core::{ProtocolError, StoreError, TransportError};
use murmur_framework::{RegistryError, ServiceError};
use thiserror::Error;

use crate::config::ConfigError;

/// Why a live connection was dropped or a connect attempt failed.
///
/// Passed to error listeners rather than returned.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConnectionError {
    /// The transport, identity lookup or send failed.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// An inbound frame could not be decoded.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// The transport closed.
    #[error("connection closed: {0}")]
    Closed(String),

    /// The transport did not report open in time.
    #[error("transport did not open within {0:?}")]
    OpenTimeout(std::time::Duration),

    /// The service asked the client to reconnect.
    #[error("service requested reconnect")]
    ReconnectRequested { url: Option<String> },

    /// The service revoked a subscription.
    #[error("subscription revoked: {0}")]
    Revoked(String),
}

/// Errors that can occur during runtime operations.
#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Command registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Command service error: {0}")]
    Service(#[from] ServiceError),

    #[error("Config store error: {0}")]
    Store(#[from] StoreError),

    /// A required component was not supplied to the builder.
    #[error("Missing component: {0}")]
    MissingComponent(&'static str),
}

/// Result type for runtime operations.
pub type RuntimeResult<T> = Result<T, RuntimeError>;
