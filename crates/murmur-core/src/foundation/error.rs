//! Unified error types for the murmur core.
//!
//! Framework-level errors (patterns, registry, correlator) live in
//! `murmur-framework`; runtime/configuration errors live in `murmur-runtime`.

use thiserror::Error;

// =============================================================================
// Transport Errors
// =============================================================================

/// Errors that can occur in transport operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    /// Connection failed.
    #[error("connection failed: {target} - {reason}")]
    ConnectionFailed {
        /// The endpoint that failed to connect.
        target: String,
        /// Reason for failure.
        reason: String,
    },

    /// Connection closed.
    #[error("connection closed: {reason}")]
    ConnectionClosed {
        /// Reason for closure.
        reason: String,
    },

    /// The connection is not open.
    #[error("not connected")]
    NotConnected,

    /// Message send failed.
    #[error("failed to send message: {0}")]
    SendFailed(String),

    /// The service refused the send (unauthorized or restricted account).
    ///
    /// Connections treat this as sticky: outbound traffic stays paused until the
    /// restriction is cleared explicitly.
    #[error("send restricted: {0}")]
    Restricted(String),

    /// Resolving the identity behind an auth token failed.
    #[error("identity resolution failed: {0}")]
    Identity(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(String),
}

impl From<std::io::Error> for TransportError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

// =============================================================================
// Protocol Errors
// =============================================================================

/// Errors raised while decoding an inbound envelope.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProtocolError {
    /// The frame is not valid for the protocol (e.g. invalid JSON).
    #[error("malformed envelope: {0}")]
    Malformed(String),

    /// A field required by the event type is absent.
    #[error("missing field '{field}' in {context}")]
    MissingField {
        /// Name of the missing field.
        field: &'static str,
        /// Where the field was expected.
        context: String,
    },
}

impl ProtocolError {
    /// Creates a missing field error.
    pub fn missing_field(field: &'static str, context: impl Into<String>) -> Self {
        Self::MissingField {
            field,
            context: context.into(),
        }
    }
}

impl From<serde_json::Error> for ProtocolError {
    fn from(err: serde_json::Error) -> Self {
        Self::Malformed(err.to_string())
    }
}

// =============================================================================
// Store Errors
// =============================================================================

/// Errors returned by a persisted-config store.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// Writing the configuration failed.
    #[error("failed to save configuration: {0}")]
    Save(String),
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;

/// Result type for envelope decoding.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
