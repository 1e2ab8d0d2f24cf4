//! In-process transport.
//!
//! [`MemoryTransportFactory`] hands out transports whose far end is a
//! [`MemoryPeer`] held by the caller. The peer injects frames and lifecycle
//! events and records everything the client sent. Useful for tests and for
//! driving a client from another task in the same process.
//!
//! ```rust,ignore
//! let factory = MemoryTransportFactory::new();
//! client.connect_using(Arc::new(factory.clone())).await?;
//!
//! let peer = factory.last_peer().unwrap();
//! peer.push("HP 10/10");
//! assert_eq!(peer.sent(), ["!stats"]);
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::debug;

use murmur_core::{
    BoxedTransport, OpenRequest, Transport, TransportError, TransportEvent, TransportEventSender,
    TransportFactory, TransportResult,
};

#[derive(Default)]
struct FactoryState {
    manual_open: bool,
    fail_next_open: Option<TransportError>,
    peers: Vec<MemoryPeer>,
    requests: Vec<OpenRequest>,
}

/// Creates [`MemoryTransport`]s and keeps a [`MemoryPeer`] for each.
#[derive(Clone, Default)]
pub struct MemoryTransportFactory {
    state: Arc<Mutex<FactoryState>>,
}

impl MemoryTransportFactory {
    /// Transports report `Open` as soon as they are created.
    pub fn new() -> Self {
        Self::default()
    }

    /// Transports stay pending until [`MemoryPeer::open`] is called.
    pub fn manual_open() -> Self {
        let factory = Self::default();
        factory.state.lock().manual_open = true;
        factory
    }

    /// Makes the next `open` call fail with `error`.
    pub fn fail_next_open(&self, error: TransportError) {
        self.state.lock().fail_next_open = Some(error);
    }

    /// Number of transports opened so far.
    pub fn open_count(&self) -> usize {
        self.state.lock().peers.len()
    }

    pub fn peer(&self, index: usize) -> Option<MemoryPeer> {
        self.state.lock().peers.get(index).cloned()
    }

    pub fn last_peer(&self) -> Option<MemoryPeer> {
        self.state.lock().peers.last().cloned()
    }

    /// Requests seen by the factory, in order.
    pub fn requests(&self) -> Vec<OpenRequest> {
        self.state.lock().requests.clone()
    }
}

#[async_trait]
impl TransportFactory for MemoryTransportFactory {
    async fn open(
        &self,
        request: OpenRequest,
        events: TransportEventSender,
    ) -> TransportResult<BoxedTransport> {
        let mut state = self.state.lock();
        state.requests.push(request);
        if let Some(error) = state.fail_next_open.take() {
            debug!(error = %error, "Memory transport open refused");
            return Err(error);
        }

        let peer = MemoryPeer {
            inner: Arc::new(PeerInner {
                events,
                sent: Mutex::new(Vec::new()),
                send_error: Mutex::new(None),
                closed: AtomicBool::new(false),
            }),
        };
        if !state.manual_open {
            peer.open();
        }
        state.peers.push(peer.clone());
        debug!(index = state.peers.len() - 1, "Memory transport opened");

        Ok(Arc::new(MemoryTransport { peer }))
    }
}

struct PeerInner {
    events: TransportEventSender,
    sent: Mutex<Vec<String>>,
    send_error: Mutex<Option<TransportError>>,
    closed: AtomicBool,
}

/// The far end of a [`MemoryTransport`].
#[derive(Clone)]
pub struct MemoryPeer {
    inner: Arc<PeerInner>,
}

impl MemoryPeer {
    /// Reports the transport as open.
    pub fn open(&self) {
        let _ = self.inner.events.send(TransportEvent::Open);
    }

    /// Delivers an inbound frame.
    pub fn push(&self, frame: impl Into<String>) {
        let _ = self.inner.events.send(TransportEvent::Message(frame.into()));
    }

    /// Closes from the remote side.
    pub fn close(&self, reason: impl Into<String>) {
        self.inner.closed.store(true, Ordering::SeqCst);
        let _ = self.inner.events.send(TransportEvent::Close(reason.into()));
    }

    /// Reports a transport failure.
    pub fn error(&self, reason: impl Into<String>) {
        let _ = self.inner.events.send(TransportEvent::Error(reason.into()));
    }

    /// Makes every following send fail with `error`, or succeed again with `None`.
    pub fn fail_sends(&self, error: Option<TransportError>) {
        *self.inner.send_error.lock() = error;
    }

    /// Frames the client sent successfully, in order.
    pub fn sent(&self) -> Vec<String> {
        self.inner.sent.lock().clone()
    }

    /// Whether either side closed the transport.
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }
}

/// Client side of an in-process connection.
pub struct MemoryTransport {
    peer: MemoryPeer,
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn send(&self, text: &str) -> TransportResult<()> {
        let inner = &self.peer.inner;
        if inner.closed.load(Ordering::SeqCst) {
            return Err(TransportError::NotConnected);
        }
        if let Some(error) = inner.send_error.lock().clone() {
            return Err(error);
        }
        inner.sent.lock().push(text.to_string());
        Ok(())
    }

    fn close(&self) {
        self.peer.inner.closed.store(true, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use murmur_core::{Identity, transport_channel};

    fn request() -> OpenRequest {
        OpenRequest::new("token", Identity::new("1", "bot", "cid"))
    }

    #[tokio::test]
    async fn test_auto_open_and_send() {
        let factory = MemoryTransportFactory::new();
        let (tx, mut rx) = transport_channel();
        let transport = factory.open(request(), tx).await.unwrap();

        assert_eq!(rx.recv().await, Some(TransportEvent::Open));
        transport.send("!stats").await.unwrap();

        let peer = factory.last_peer().unwrap();
        assert_eq!(peer.sent(), ["!stats"]);
        peer.push("HP 1/1");
        assert_eq!(
            rx.recv().await,
            Some(TransportEvent::Message("HP 1/1".into()))
        );
    }

    #[tokio::test]
    async fn test_manual_open_waits() {
        let factory = MemoryTransportFactory::manual_open();
        let (tx, mut rx) = transport_channel();
        let _transport = factory.open(request(), tx).await.unwrap();
        assert!(rx.try_recv().is_err());

        factory.peer(0).unwrap().open();
        assert_eq!(rx.recv().await, Some(TransportEvent::Open));
    }

    #[tokio::test]
    async fn test_fail_next_open() {
        let factory = MemoryTransportFactory::new();
        factory.fail_next_open(TransportError::ConnectionFailed {
            target: "memory".into(),
            reason: "refused".into(),
        });
        let (tx, _rx) = transport_channel();
        assert!(factory.open(request(), tx).await.is_err());
        assert_eq!(factory.open_count(), 0);
        assert_eq!(factory.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_send_failures() {
        let factory = MemoryTransportFactory::new();
        let (tx, _rx) = transport_channel();
        let transport = factory.open(request(), tx).await.unwrap();
        let peer = factory.last_peer().unwrap();

        peer.fail_sends(Some(TransportError::Restricted("verify email".into())));
        assert!(matches!(
            transport.send("x").await,
            Err(TransportError::Restricted(_))
        ));

        peer.fail_sends(None);
        transport.close();
        assert!(peer.is_closed());
        assert!(matches!(
            transport.send("x").await,
            Err(TransportError::NotConnected)
        ));
        assert!(peer.sent().is_empty());
    }
}
