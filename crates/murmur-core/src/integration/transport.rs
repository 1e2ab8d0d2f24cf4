//! Transport seam.
//!
//! A transport is the vendor connection reduced to two primitives: sending a
//! line of text and producing lifecycle/text events. The four callbacks a
//! browser socket would expose (`onopen`, `onmessage`, `onclose`, `onerror`)
//! become [`TransportEvent`] values pushed into a channel owned by the
//! connection, which consumes them one at a time in arrival order.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::identity::Identity;
use crate::foundation::TransportResult;

/// Lifecycle and data events emitted by a transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// The connection is open and ready to send.
    Open,
    /// A raw frame was received.
    Message(String),
    /// The peer closed the connection.
    Close(String),
    /// The transport failed.
    Error(String),
}

/// Sending half of a transport's event channel.
pub type TransportEventSender = mpsc::UnboundedSender<TransportEvent>;

/// Receiving half of a transport's event channel.
pub type TransportEventReceiver = mpsc::UnboundedReceiver<TransportEvent>;

/// Creates a fresh event channel for one transport instance.
pub fn transport_channel() -> (TransportEventSender, TransportEventReceiver) {
    mpsc::unbounded_channel()
}

/// An open (or opening) vendor connection.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Sends one line of text.
    async fn send(&self, text: &str) -> TransportResult<()>;

    /// Closes the connection. Idempotent.
    fn close(&self);
}

/// Shared transport handle.
pub type BoxedTransport = Arc<dyn Transport>;

/// Metadata key carrying an endpoint that overrides the factory default for
/// one open, e.g. the URL handed out with a vendor reconnect request.
pub const URL_METADATA_KEY: &str = "url";

/// Everything a factory needs to open a transport.
#[derive(Debug, Clone)]
pub struct OpenRequest {
    /// Auth token obtained from the token source.
    pub token: String,
    /// Identity resolved from the token.
    pub identity: Identity,
    /// Additional metadata (channel ids, endpoints).
    pub metadata: HashMap<String, String>,
}

impl OpenRequest {
    /// Creates a new open request.
    pub fn new(token: impl Into<String>, identity: Identity) -> Self {
        Self {
            token: token.into(),
            identity,
            metadata: HashMap::new(),
        }
    }

    /// Adds metadata.
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Returns a metadata value.
    pub fn metadata(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).map(String::as_str)
    }
}

/// Constructs transports.
///
/// Injected into the connection so tests can substitute an in-memory transport
/// and so protocol backends can be swapped without touching the connection.
/// The factory must report the open as [`TransportEvent::Open`] (or a
/// `Close`/`Error`) through `events`; returning `Ok` only means the attempt is
/// under way.
#[async_trait]
pub trait TransportFactory: Send + Sync {
    /// Starts opening a transport that reports through `events`.
    async fn open(
        &self,
        request: OpenRequest,
        events: TransportEventSender,
    ) -> TransportResult<BoxedTransport>;
}

/// Shared factory handle.
pub type BoxedTransportFactory = Arc<dyn TransportFactory>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_request_metadata() {
        let request = OpenRequest::new("tok", Identity::new("1", "viewer", "client"))
            .with_metadata("broadcaster_id", "42");
        assert_eq!(request.metadata("broadcaster_id"), Some("42"));
        assert_eq!(request.metadata("missing"), None);
        assert_eq!(request.identity.login, "viewer");
    }

    #[tokio::test]
    async fn test_channel_preserves_order() {
        let (tx, mut rx) = transport_channel();
        tx.send(TransportEvent::Open).unwrap();
        tx.send(TransportEvent::Message("a".into())).unwrap();
        tx.send(TransportEvent::Close("bye".into())).unwrap();

        assert_eq!(rx.recv().await, Some(TransportEvent::Open));
        assert_eq!(rx.recv().await, Some(TransportEvent::Message("a".into())));
        assert_eq!(rx.recv().await, Some(TransportEvent::Close("bye".into())));
    }
}
