//! WebSocket client transport.

use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, watch};
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, info, trace, warn};

use murmur_core::{
    BoxedTransport, OpenRequest, Transport, TransportError, TransportEvent, TransportEventSender,
    TransportFactory, TransportResult, URL_METADATA_KEY,
};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, WsMessage>;
type WsSource = SplitStream<WsStream>;

type Outbound = (String, oneshot::Sender<TransportResult<()>>);

/// Opens [`WsTransport`]s against a fixed endpoint.
#[derive(Debug, Clone)]
pub struct WsTransportFactory {
    url: String,
}

impl WsTransportFactory {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl TransportFactory for WsTransportFactory {
    async fn open(
        &self,
        request: OpenRequest,
        events: TransportEventSender,
    ) -> TransportResult<BoxedTransport> {
        let url = request
            .metadata(URL_METADATA_KEY)
            .unwrap_or(&self.url)
            .to_string();

        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel::<Outbound>();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        tokio::spawn(run_client(url.clone(), outbound_rx, shutdown_rx, events));

        Ok(Arc::new(WsTransport {
            url,
            outbound: outbound_tx,
            shutdown: shutdown_tx,
        }))
    }
}

/// Handle to one WebSocket connection.
///
/// The socket is owned by a background task; this handle only forwards
/// outgoing text and the close request to it.
pub struct WsTransport {
    url: String,
    outbound: mpsc::UnboundedSender<Outbound>,
    shutdown: watch::Sender<bool>,
}

impl WsTransport {
    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl Transport for WsTransport {
    async fn send(&self, text: &str) -> TransportResult<()> {
        let (ack_tx, ack_rx) = oneshot::channel();
        self.outbound
            .send((text.to_string(), ack_tx))
            .map_err(|_| TransportError::NotConnected)?;
        ack_rx.await.map_err(|_| TransportError::NotConnected)?
    }

    fn close(&self) {
        let _ = self.shutdown.send(true);
    }
}

impl Drop for WsTransport {
    fn drop(&mut self) {
        let _ = self.shutdown.send(true);
    }
}

/// Connects, reports `Open`, then pumps frames both ways until the socket
/// closes or shutdown is requested. Reconnecting is the connection's job.
async fn run_client(
    url: String,
    mut outbound_rx: mpsc::UnboundedReceiver<Outbound>,
    mut shutdown_rx: watch::Receiver<bool>,
    events: TransportEventSender,
) {
    info!(url = %url, "Connecting to WebSocket server");

    let connected = tokio::select! {
        result = connect_async(url.as_str()) => result,
        _ = shutdown_rx.changed() => {
            debug!(url = %url, "WebSocket connect aborted");
            return;
        }
    };

    let (mut ws_tx, mut ws_rx): (WsSink, WsSource) = match connected {
        Ok((stream, _response)) => stream.split(),
        Err(e) => {
            warn!(url = %url, error = %e, "WebSocket connection failed");
            let _ = events.send(TransportEvent::Error(format!(
                "WebSocket connection failed: {e}"
            )));
            return;
        }
    };

    info!(url = %url, "WebSocket client connected");
    if events.send(TransportEvent::Open).is_err() {
        let _ = ws_tx.close().await;
        return;
    }

    loop {
        tokio::select! {
            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    info!(url = %url, "WebSocket client shutting down");
                    let _ = ws_tx.close().await;
                    break;
                }
            }

            Some((text, ack)) = outbound_rx.recv() => {
                let result = ws_tx
                    .send(WsMessage::Text(text.into()))
                    .await
                    .map_err(|e| TransportError::SendFailed(e.to_string()));
                if let Err(e) = &result {
                    warn!(url = %url, error = %e, "Failed to send message");
                }
                let _ = ack.send(result);
            }

            frame = ws_rx.next() => {
                match frame {
                    Some(Ok(WsMessage::Text(text))) => {
                        trace!(url = %url, len = text.len(), "Received text");
                        if events.send(TransportEvent::Message(text.as_str().to_string())).is_err() {
                            break;
                        }
                    }
                    Some(Ok(WsMessage::Binary(data))) => {
                        trace!(url = %url, len = data.len(), "Received binary");
                        let text = String::from_utf8_lossy(&data).into_owned();
                        if events.send(TransportEvent::Message(text)).is_err() {
                            break;
                        }
                    }
                    Some(Ok(WsMessage::Ping(data))) => {
                        trace!(url = %url, "Received ping, sending pong");
                        let _ = ws_tx.send(WsMessage::Pong(data)).await;
                    }
                    Some(Ok(WsMessage::Pong(_))) => {
                        trace!(url = %url, "Received pong");
                    }
                    Some(Ok(WsMessage::Close(frame))) => {
                        let reason = frame
                            .map(|f| f.reason.as_str().to_string())
                            .filter(|r| !r.is_empty())
                            .unwrap_or_else(|| "closed by server".to_string());
                        info!(url = %url, reason = %reason, "Server closed connection");
                        let _ = events.send(TransportEvent::Close(reason));
                        break;
                    }
                    Some(Ok(WsMessage::Frame(_))) => {}
                    Some(Err(e)) => {
                        warn!(url = %url, error = %e, "WebSocket error");
                        let _ = events.send(TransportEvent::Error(e.to_string()));
                        break;
                    }
                    None => {
                        info!(url = %url, "WebSocket stream ended");
                        let _ = events.send(TransportEvent::Close("stream ended".to_string()));
                        break;
                    }
                }
            }
        }
    }

    // Fail anything still waiting for a slot on the socket.
    outbound_rx.close();
    while let Ok((_, ack)) = outbound_rx.try_recv() {
        let _ = ack.send(Err(TransportError::NotConnected));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use murmur_core::{Identity, transport_channel};

    #[tokio::test]
    async fn test_unreachable_endpoint_reports_error() {
        let factory = WsTransportFactory::new("ws://127.0.0.1:1");
        let (tx, mut rx) = transport_channel();
        let request = OpenRequest::new("token", Identity::new("1", "bot", "cid"));

        let transport = factory.open(request, tx).await.unwrap();
        match rx.recv().await {
            Some(TransportEvent::Error(reason)) => assert!(reason.contains("failed")),
            other => panic!("unexpected event: {other:?}"),
        }
        assert!(matches!(
            transport.send("hello").await,
            Err(TransportError::NotConnected)
        ));
    }
}
