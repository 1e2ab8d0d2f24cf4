//! Persistent connection state machine.
//!
//! A [`Connection`] owns at most one live transport. It resolves the identity
//! behind the current auth token, opens a transport through a
//! [`TransportFactory`], classifies inbound frames with a [`Protocol`] and
//! surfaces the lines that concern this client to registered listeners.
//!
//! # State Machine
//!
//! ```text
//!                 connect()                 Open
//! Disconnected ─────────────▶ Connecting ─────────▶ Connected
//!      ▲                          │                     │
//!      │        open failed       │                     │ close / error /
//!      ├──────────────────────────┘                     │ malformed frame /
//!      │                                                │ reconnect request
//!      │       attempts exhausted                       ▼
//!      └───────────────────────────────────────── Reconnecting
//!
//! shutdown() from any state ──▶ Shutdown (terminal)
//! ```
//!
//! Transport lifecycle callbacks arrive as [`TransportEvent`]s on a channel
//! that one inbound task consumes in order. Every connect gets a new
//! generation number so events from a transport that was already replaced
//! are ignored.
//!
//! # Outbound
//!
//! The connection installs itself as the send and readiness hooks of the
//! [`MessageQueue`]. Lines the transport accepted are looped back to the
//! listeners as self-authored whispers. A [`TransportError::Restricted`]
//! refusal pauses the queue until [`Connection::clear_restriction`].
//!
//! ```rust,ignore
//! let connection = Connection::new(settings, queue, token_source, resolver, protocol);
//! connection.register("log", |message| println!("{}", message.text()), false);
//! connection.connect_using(Arc::new(WsTransportFactory::new(url))).await;
//! connection.send("!inventory");
//! ```

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use murmur_core::{
    BoxedTransport, BoxedTransportFactory, ChatLine, Identity, IdentityResolver, InboundEvent,
    Message, MessageQueue, OpenRequest, Protocol, SessionEvent, TokenSource, TransportError,
    TransportEvent, TransportEventReceiver, TransportResult, URL_METADATA_KEY, transport_channel,
};
use parking_lot::{Mutex, RwLock};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::config::ConnectionConfig;
use crate::error::{ConnectionError, RuntimeError, RuntimeResult};
use crate::listeners::ListenerSet;

/// Callback receiving surfaced inbound lines and looped-back outbound lines.
pub type MessageListener = dyn Fn(&Message) + Send + Sync;

/// Callback receiving connection faults.
pub type ErrorListener = dyn Fn(&ConnectionError) + Send + Sync;

// =============================================================================
// State and Policy
// =============================================================================

/// Lifecycle state of a [`Connection`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    /// Waiting for or running an automatic reconnect attempt.
    Reconnecting,
    /// Shut down for good.
    Shutdown,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disconnected => write!(f, "Disconnected"),
            Self::Connecting => write!(f, "Connecting"),
            Self::Connected => write!(f, "Connected"),
            Self::Reconnecting => write!(f, "Reconnecting"),
            Self::Shutdown => write!(f, "Shutdown"),
        }
    }
}

/// Automatic reconnect behaviour after an unexpected disconnect.
///
/// The default is a single immediate attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectPolicy {
    /// Attempts per disconnect. Zero disables reconnecting.
    pub max_attempts: u32,
    /// Delay before the first attempt.
    pub initial_delay: Duration,
    /// Upper bound for any delay.
    pub max_delay: Duration,
    /// Factor applied to the delay after each failed attempt.
    pub multiplier: f64,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 1,
            initial_delay: Duration::ZERO,
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
        }
    }
}

impl ReconnectPolicy {
    /// A policy that never reconnects.
    pub fn disabled() -> Self {
        Self {
            max_attempts: 0,
            ..Default::default()
        }
    }

    /// Delay before the zero-based `attempt`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = self.multiplier.powi(attempt.min(i32::MAX as u32) as i32);
        let secs = (self.initial_delay.as_secs_f64() * factor).min(self.max_delay.as_secs_f64());
        if secs.is_finite() && secs > 0.0 {
            Duration::from_secs_f64(secs)
        } else {
            Duration::ZERO
        }
    }
}

/// Static settings for a [`Connection`].
#[derive(Debug, Clone)]
pub struct ConnectionSettings {
    /// Only channel lines sent by this user are surfaced. `None` accepts any sender.
    pub bot_user_id: Option<String>,
    /// Only channel lines in this channel are surfaced. `None` accepts any channel.
    pub streamer_user_id: Option<String>,
    /// How long to wait for the transport to report open.
    pub open_timeout: Duration,
    pub reconnect: ReconnectPolicy,
    /// Passed to the transport factory with every open.
    pub metadata: HashMap<String, String>,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            bot_user_id: None,
            streamer_user_id: None,
            open_timeout: Duration::from_secs(10),
            reconnect: ReconnectPolicy::default(),
            metadata: HashMap::new(),
        }
    }
}

impl ConnectionSettings {
    pub fn from_config(config: &ConnectionConfig) -> Self {
        let mut metadata = HashMap::new();
        if let Some(id) = &config.bot_user_id {
            metadata.insert("bot_user_id".to_string(), id.clone());
        }
        if let Some(id) = &config.streamer_user_id {
            metadata.insert("broadcaster_user_id".to_string(), id.clone());
        }

        Self {
            bot_user_id: config.bot_user_id.clone(),
            streamer_user_id: config.streamer_user_id.clone(),
            open_timeout: Duration::from_millis(config.open_timeout_ms),
            reconnect: config.reconnect.to_policy(),
            metadata,
        }
    }

    pub fn with_reconnect(mut self, policy: ReconnectPolicy) -> Self {
        self.reconnect = policy;
        self
    }
}

// =============================================================================
// Connection
// =============================================================================

/// The live transport and the task reading from it.
struct Link {
    transport: BoxedTransport,
    generation: u64,
    session: CancellationToken,
}

pub struct Connection {
    settings: ConnectionSettings,
    queue: Arc<MessageQueue>,
    token_source: Arc<dyn TokenSource>,
    resolver: Arc<dyn IdentityResolver>,
    protocol: Arc<dyn Protocol>,
    factory: RwLock<Option<BoxedTransportFactory>>,
    listeners: ListenerSet<MessageListener>,
    error_listeners: ListenerSet<ErrorListener>,
    link: Mutex<Option<Link>>,
    identity: RwLock<Option<Identity>>,
    generation: AtomicU64,
    restricted: AtomicBool,
    reconnect_url: Mutex<Option<String>>,
    reconnect_task: Mutex<Option<CancellationToken>>,
    state: watch::Sender<ConnectionState>,
    connect_lock: tokio::sync::Mutex<()>,
    shutdown: CancellationToken,
    this: Weak<Connection>,
}

impl Connection {
    /// Creates a disconnected connection and installs it as the queue's send
    /// and readiness hooks.
    pub fn new(
        settings: ConnectionSettings,
        queue: Arc<MessageQueue>,
        token_source: Arc<dyn TokenSource>,
        resolver: Arc<dyn IdentityResolver>,
        protocol: Arc<dyn Protocol>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|this: &Weak<Connection>| {
            let ready = this.clone();
            queue.set_check_function(move || {
                ready
                    .upgrade()
                    .is_some_and(|conn| conn.is_connected() && !conn.is_restricted())
            });

            let sender = this.clone();
            queue.set_send_function(move |text| {
                let sender = sender.clone();
                Box::pin(async move {
                    match sender.upgrade() {
                        Some(conn) => conn.send_now(text).await,
                        None => Err(TransportError::NotConnected),
                    }
                })
            });

            Self {
                settings,
                queue,
                token_source,
                resolver,
                protocol,
                factory: RwLock::new(None),
                listeners: ListenerSet::new(),
                error_listeners: ListenerSet::new(),
                link: Mutex::new(None),
                identity: RwLock::new(None),
                generation: AtomicU64::new(0),
                restricted: AtomicBool::new(false),
                reconnect_url: Mutex::new(None),
                reconnect_task: Mutex::new(None),
                state: watch::Sender::new(ConnectionState::Disconnected),
                connect_lock: tokio::sync::Mutex::new(()),
                shutdown: CancellationToken::new(),
                this: this.clone(),
            }
        })
    }

    pub fn settings(&self) -> &ConnectionSettings {
        &self.settings
    }

    pub fn queue(&self) -> &Arc<MessageQueue> {
        &self.queue
    }

    /// Sets the factory used by [`connect`](Self::connect) and by reconnects.
    pub fn set_factory(&self, factory: BoxedTransportFactory) {
        *self.factory.write() = Some(factory);
    }

    /// Connects with the configured factory.
    ///
    /// Fails only when no factory was set. See [`connect_using`](Self::connect_using).
    pub async fn connect(&self) -> RuntimeResult<bool> {
        let factory = self
            .factory
            .read()
            .clone()
            .ok_or(RuntimeError::MissingComponent("transport factory"))?;
        Ok(self.connect_using(factory).await)
    }

    /// Connects through `factory`, which also becomes the reconnect factory.
    ///
    /// Returns `true` once the transport reported open, or right away when
    /// already connected. Returns `false` when no auth token is available yet
    /// (without raising an error) and when the attempt failed, in which case
    /// the error listeners have been told why and the reconnect policy runs.
    pub async fn connect_using(&self, factory: BoxedTransportFactory) -> bool {
        match self.attempt(factory).await {
            Ok(ready) => ready,
            Err(_) => {
                self.schedule_reconnect();
                false
            }
        }
    }

    /// One connect attempt. A failure has already been reported to the error
    /// listeners when this returns `Err`.
    async fn attempt(&self, factory: BoxedTransportFactory) -> Result<bool, ConnectionError> {
        let _connecting = self.connect_lock.lock().await;

        if self.shutdown.is_cancelled() {
            return Ok(false);
        }
        *self.factory.write() = Some(Arc::clone(&factory));
        if self.is_connected() {
            return Ok(true);
        }

        let Some(token) = self.token_source.auth_token() else {
            debug!("No auth token available, connect deferred");
            return Ok(false);
        };

        self.set_state(ConnectionState::Connecting);
        match self.open_link(&factory, token).await {
            Ok(()) => Ok(true),
            Err(error) => {
                warn!(error = %error, "Connect attempt failed");
                self.set_state(ConnectionState::Disconnected);
                self.notify_error(&error);
                Err(error)
            }
        }
    }

    async fn open_link(
        &self,
        factory: &BoxedTransportFactory,
        token: String,
    ) -> Result<(), ConnectionError> {
        let identity = self.resolver.resolve_identity(&token).await?;
        debug!(user_id = %identity.user_id, login = %identity.login, "Identity resolved");

        let mut request = OpenRequest::new(token, identity.clone());
        for (key, value) in &self.settings.metadata {
            request = request.with_metadata(key.as_str(), value.as_str());
        }
        if let Some(url) = self.reconnect_url.lock().clone() {
            request = request.with_metadata(URL_METADATA_KEY, url);
        }

        let (events_tx, mut events) = transport_channel();
        let transport = factory.open(request, events_tx).await?;

        let timeout = self.settings.open_timeout;
        let opened = tokio::select! {
            _ = self.shutdown.cancelled() => Err(ConnectionError::Closed("shut down".into())),
            result = tokio::time::timeout(timeout, wait_for_open(&mut events)) => {
                result.unwrap_or(Err(ConnectionError::OpenTimeout(timeout)))
            }
        };
        if let Err(error) = opened {
            transport.close();
            return Err(error);
        }

        // The service-supplied URL is only spent once a link is up.
        self.reconnect_url.lock().take();
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let session = self.shutdown.child_token();
        *self.link.lock() = Some(Link {
            transport,
            generation,
            session: session.clone(),
        });
        info!(
            user_id = %identity.user_id,
            login = %identity.login,
            generation,
            "Connected"
        );
        *self.identity.write() = Some(identity);
        self.set_state(ConnectionState::Connected);

        tokio::spawn(run_inbound(self.this.clone(), events, generation, session));
        self.queue.start();
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Listeners
    // -------------------------------------------------------------------------

    /// Registers a message listener. The first registration for `id` wins
    /// unless `overwrite` is set. Returns whether the listener was stored.
    pub fn register<F>(&self, id: &str, listener: F, overwrite: bool) -> bool
    where
        F: Fn(&Message) + Send + Sync + 'static,
    {
        self.listeners.register(id, Arc::new(listener), overwrite)
    }

    pub fn unregister(&self, id: &str) -> bool {
        self.listeners.unregister(id)
    }

    /// Registers an error listener, with the same rules as [`register`](Self::register).
    pub fn register_error<F>(&self, id: &str, listener: F, overwrite: bool) -> bool
    where
        F: Fn(&ConnectionError) + Send + Sync + 'static,
    {
        self.error_listeners.register(id, Arc::new(listener), overwrite)
    }

    pub fn unregister_error(&self, id: &str) -> bool {
        self.error_listeners.unregister(id)
    }

    fn dispatch(&self, message: &Message) {
        for listener in self.listeners.snapshot() {
            listener(message);
        }
    }

    fn notify_error(&self, error: &ConnectionError) {
        for listener in self.error_listeners.snapshot() {
            listener(error);
        }
    }

    // -------------------------------------------------------------------------
    // Outbound
    // -------------------------------------------------------------------------

    /// Enqueues `text` for sending. Returns `false` if the same line is
    /// already waiting.
    pub fn send(&self, text: &str) -> bool {
        self.queue.send(text, false)
    }

    async fn send_now(&self, text: String) -> TransportResult<()> {
        let transport = self
            .link
            .lock()
            .as_ref()
            .map(|link| Arc::clone(&link.transport))
            .ok_or(TransportError::NotConnected)?;

        match transport.send(&text).await {
            Ok(()) => {
                self.dispatch(&Message::outbound(text));
                Ok(())
            }
            Err(error) => {
                if matches!(error, TransportError::Restricted(_)) {
                    self.restricted.store(true, Ordering::SeqCst);
                    warn!(error = %error, "Outbound messages paused");
                }
                self.notify_error(&ConnectionError::Transport(error.clone()));
                Err(error)
            }
        }
    }

    /// Resumes outbound traffic after a restricted send.
    pub fn clear_restriction(&self) {
        if self.restricted.swap(false, Ordering::SeqCst) {
            info!("Outbound restriction cleared");
        }
    }

    pub fn is_restricted(&self) -> bool {
        self.restricted.load(Ordering::SeqCst)
    }

    // -------------------------------------------------------------------------
    // Inbound
    // -------------------------------------------------------------------------

    fn handle_frame(&self, raw: &str) -> Result<(), ConnectionError> {
        match self.protocol.parse(raw)? {
            InboundEvent::Session(event) => self.handle_session(event),
            InboundEvent::Channel(line) => {
                if self.accepts_channel_line(&line) {
                    self.dispatch(&Message::channel(line.text));
                } else {
                    trace!(sender = %line.sender_id, "Channel line filtered");
                }
                Ok(())
            }
            InboundEvent::Whisper(line) => {
                if self.is_own(&line.sender_id) {
                    trace!("Own whisper echo ignored");
                } else {
                    self.dispatch(&Message::whisper(line.text));
                }
                Ok(())
            }
        }
    }

    fn handle_session(&self, event: SessionEvent) -> Result<(), ConnectionError> {
        match event {
            SessionEvent::Welcome { session_id } => {
                info!(session_id = %session_id, protocol = self.protocol.name(), "Session established");
            }
            SessionEvent::Keepalive => trace!("Keepalive"),
            SessionEvent::Reconnect { url } => {
                info!(url = ?url, "Service requested reconnect");
                self.reconnect_url.lock().clone_from(&url);
                return Err(ConnectionError::ReconnectRequested { url });
            }
            SessionEvent::Revocation { reason } => {
                warn!(reason = %reason, "Subscription revoked");
                self.notify_error(&ConnectionError::Revoked(reason));
            }
            SessionEvent::Other(kind) => debug!(kind = %kind, "Unhandled session event"),
        }
        Ok(())
    }

    fn accepts_channel_line(&self, line: &ChatLine) -> bool {
        let sender_ok = self
            .settings
            .bot_user_id
            .as_ref()
            .is_none_or(|bot| *bot == line.sender_id);
        let channel_ok = self
            .settings
            .streamer_user_id
            .as_ref()
            .is_none_or(|streamer| line.target_id.as_ref() == Some(streamer));
        sender_ok && channel_ok
    }

    fn is_own(&self, sender_id: &str) -> bool {
        self.identity
            .read()
            .as_ref()
            .is_some_and(|identity| identity.user_id == sender_id)
    }

    /// Tears down the link of `generation` and starts the reconnect policy.
    fn on_fault(&self, generation: u64, error: ConnectionError) {
        let link = {
            let mut link = self.link.lock();
            match link.as_ref() {
                Some(current) if current.generation == generation => link.take(),
                _ => return,
            }
        };
        if let Some(link) = link {
            link.session.cancel();
            link.transport.close();
        }
        self.queue.stop();
        warn!(error = %error, generation, "Connection lost");
        self.set_state(ConnectionState::Disconnected);
        self.notify_error(&error);
        self.schedule_reconnect();
    }

    fn schedule_reconnect(&self) {
        let policy = self.settings.reconnect.clone();
        if policy.max_attempts == 0 || self.shutdown.is_cancelled() {
            return;
        }
        let Some(factory) = self.factory.read().clone() else {
            warn!("No transport factory, not reconnecting");
            return;
        };

        let cancel = self.shutdown.child_token();
        if let Some(previous) = self.reconnect_task.lock().replace(cancel.clone()) {
            previous.cancel();
        }
        self.set_state(ConnectionState::Reconnecting);
        tokio::spawn(run_reconnect(self.this.clone(), factory, policy, cancel));
    }

    // -------------------------------------------------------------------------
    // State
    // -------------------------------------------------------------------------

    fn set_state(&self, next: ConnectionState) {
        self.state.send_if_modified(|state| {
            if *state == next || *state == ConnectionState::Shutdown {
                return false;
            }
            debug!(old_state = %state, new_state = %next, "Connection state changed");
            *state = next;
            true
        });
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Watches state changes.
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Identity resolved by the most recent successful connect.
    pub fn identity(&self) -> Option<Identity> {
        self.identity.read().clone()
    }

    /// Closes the transport without raising errors or reconnecting.
    pub fn disconnect(&self) {
        if let Some(task) = self.reconnect_task.lock().take() {
            task.cancel();
        }
        let link = self.link.lock().take();
        if let Some(link) = link {
            link.session.cancel();
            link.transport.close();
            info!(generation = link.generation, "Disconnected");
        }
        self.queue.stop();
        self.set_state(ConnectionState::Disconnected);
    }

    /// Disconnects and refuses any further connect or reconnect.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
        self.disconnect();
        self.set_state(ConnectionState::Shutdown);
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.shutdown.cancel();
        if let Some(link) = self.link.get_mut().take() {
            link.transport.close();
        }
    }
}

// =============================================================================
// Tasks
// =============================================================================

async fn wait_for_open(events: &mut TransportEventReceiver) -> Result<(), ConnectionError> {
    loop {
        match events.recv().await {
            Some(TransportEvent::Open) => return Ok(()),
            Some(TransportEvent::Message(_)) => trace!("Frame before open dropped"),
            Some(TransportEvent::Close(reason)) => return Err(ConnectionError::Closed(reason)),
            Some(TransportEvent::Error(reason)) => {
                return Err(TransportError::ConnectionClosed { reason }.into());
            }
            None => return Err(ConnectionError::Closed("transport dropped before open".into())),
        }
    }
}

async fn run_inbound(
    connection: Weak<Connection>,
    mut events: TransportEventReceiver,
    generation: u64,
    session: CancellationToken,
) {
    loop {
        let event = tokio::select! {
            _ = session.cancelled() => break,
            event = events.recv() => event,
        };
        let Some(connection) = connection.upgrade() else {
            break;
        };

        let fault = match event {
            Some(TransportEvent::Message(raw)) => connection.handle_frame(&raw).err(),
            Some(TransportEvent::Open) => None,
            Some(TransportEvent::Close(reason)) => Some(ConnectionError::Closed(reason)),
            Some(TransportEvent::Error(reason)) => {
                Some(TransportError::ConnectionClosed { reason }.into())
            }
            None => Some(ConnectionError::Closed("transport event channel closed".into())),
        };

        if let Some(error) = fault {
            connection.on_fault(generation, error);
            break;
        }
    }
    trace!(generation, "Inbound task finished");
}

async fn run_reconnect(
    connection: Weak<Connection>,
    factory: BoxedTransportFactory,
    policy: ReconnectPolicy,
    cancel: CancellationToken,
) {
    for attempt in 0..policy.max_attempts {
        let delay = policy.delay_for(attempt);
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = tokio::time::sleep(delay) => {}
        }
        let Some(connection) = connection.upgrade() else {
            return;
        };

        connection.set_state(ConnectionState::Reconnecting);
        info!(
            attempt = attempt + 1,
            max_attempts = policy.max_attempts,
            "Reconnecting"
        );
        if matches!(connection.attempt(Arc::clone(&factory)).await, Ok(true)) {
            return;
        }
        if cancel.is_cancelled() {
            return;
        }
    }

    if let Some(connection) = connection.upgrade() {
        warn!(max_attempts = policy.max_attempts, "Reconnect attempts exhausted");
        connection.set_state(ConnectionState::Disconnected);
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use murmur_core::{PlainTextProtocol, ProtocolResult, QueueConfig, StaticIdentity};
    use murmur_transport::MemoryTransportFactory;

    const BOT_ID: &str = "bot-1";

    /// `chan:<sender>:<channel>:<text>`, `whisper:<sender>:<text>` and
    /// `reconnect:<url>` frames.
    struct ScriptProtocol;

    impl Protocol for ScriptProtocol {
        fn name(&self) -> &'static str {
            "script"
        }

        fn parse(&self, raw: &str) -> ProtocolResult<InboundEvent> {
            let parts: Vec<&str> = raw.splitn(4, ':').collect();
            match parts.as_slice() {
                ["chan", sender, channel, text] => Ok(InboundEvent::Channel(
                    ChatLine::new(*sender, *text).with_target(*channel),
                )),
                ["whisper", sender, text] => {
                    Ok(InboundEvent::Whisper(ChatLine::new(*sender, *text)))
                }
                ["reconnect", rest @ ..] => Ok(InboundEvent::Session(SessionEvent::Reconnect {
                    url: Some(rest.join(":")),
                })),
                _ => Err(murmur_core::ProtocolError::Malformed(raw.to_string())),
            }
        }
    }

    fn connection_with(
        settings: ConnectionSettings,
        token: Option<&'static str>,
        protocol: Arc<dyn Protocol>,
    ) -> Arc<Connection> {
        let queue = Arc::new(MessageQueue::new(QueueConfig {
            rate: Duration::from_millis(50),
            ..Default::default()
        }));
        Connection::new(
            settings,
            queue,
            Arc::new(move || token.map(str::to_string)),
            Arc::new(StaticIdentity(Identity::new(BOT_ID, "bot", "client"))),
            protocol,
        )
    }

    fn connection() -> Arc<Connection> {
        connection_with(
            ConnectionSettings::default(),
            Some("token"),
            Arc::new(PlainTextProtocol),
        )
    }

    fn record_messages(connection: &Connection) -> Arc<Mutex<Vec<(String, bool)>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        connection.register(
            "recorder",
            move |message: &Message| {
                sink.lock().push((message.text().to_string(), message.is_self()));
            },
            false,
        );
        seen
    }

    fn record_errors(connection: &Connection) -> Arc<Mutex<Vec<ConnectionError>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        connection.register_error(
            "recorder",
            move |error: &ConnectionError| sink.lock().push(error.clone()),
            false,
        );
        seen
    }

    async fn wait_until(mut condition: impl FnMut() -> bool) {
        for _ in 0..500 {
            if condition() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not reached");
    }

    #[test]
    fn test_reconnect_policy_delays() {
        let policy = ReconnectPolicy {
            max_attempts: 5,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(500),
            multiplier: 2.0,
        };
        assert_eq!(policy.delay_for(0), Duration::from_millis(100));
        assert_eq!(policy.delay_for(1), Duration::from_millis(200));
        assert_eq!(policy.delay_for(3), Duration::from_millis(500));
        assert_eq!(ReconnectPolicy::default().delay_for(0), Duration::ZERO);
        assert_eq!(ReconnectPolicy::disabled().max_attempts, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_without_token_is_not_ready() {
        let conn = connection_with(
            ConnectionSettings::default(),
            None,
            Arc::new(PlainTextProtocol),
        );
        let errors = record_errors(&conn);
        let factory = MemoryTransportFactory::new();

        assert!(!conn.connect_using(Arc::new(factory.clone())).await);
        assert_eq!(conn.state(), ConnectionState::Disconnected);
        assert_eq!(factory.open_count(), 0);
        assert!(errors.lock().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_requires_factory() {
        let conn = connection();
        assert!(matches!(
            conn.connect().await,
            Err(RuntimeError::MissingComponent(_))
        ));

        conn.set_factory(Arc::new(MemoryTransportFactory::new()));
        assert!(tokio_test::assert_ok!(conn.connect().await));
        assert!(conn.is_connected());
        assert_eq!(conn.identity().map(|i| i.user_id), Some(BOT_ID.to_string()));
        assert!(conn.connect().await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_whispers_surface_and_sends_loop_back() {
        let conn = connection();
        let seen = record_messages(&conn);
        let factory = MemoryTransportFactory::new();
        assert!(conn.connect_using(Arc::new(factory.clone())).await);
        let peer = factory.last_peer().unwrap();

        peer.push("foo=bar");
        wait_until(|| seen.lock().len() == 1).await;

        assert!(conn.send("!inventory"));
        wait_until(|| seen.lock().len() == 2).await;

        assert_eq!(peer.sent(), ["!inventory"]);
        assert_eq!(
            *seen.lock(),
            [("foo=bar".to_string(), false), ("!inventory".to_string(), true)]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_channel_and_self_filters() {
        let settings = ConnectionSettings {
            bot_user_id: Some("game-bot".into()),
            streamer_user_id: Some("streamer".into()),
            ..Default::default()
        };
        let conn = connection_with(settings, Some("token"), Arc::new(ScriptProtocol));
        let seen = record_messages(&conn);
        let factory = MemoryTransportFactory::new();
        assert!(conn.connect_using(Arc::new(factory.clone())).await);
        let peer = factory.last_peer().unwrap();

        peer.push("chan:viewer:streamer:ignored sender");
        peer.push("chan:game-bot:elsewhere:ignored channel");
        peer.push(format!("whisper:{BOT_ID}:own echo"));
        peer.push("chan:game-bot:streamer:HP 10/10");
        peer.push("whisper:game-bot:gold=5");
        wait_until(|| seen.lock().len() == 2).await;
        tokio::time::sleep(Duration::from_millis(100)).await;

        let texts: Vec<_> = seen.lock().iter().map(|(t, _)| t.clone()).collect();
        assert_eq!(texts, ["HP 10/10", "gold=5"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_reports_once_and_reconnects() {
        let conn = connection();
        let errors = record_errors(&conn);
        let factory = MemoryTransportFactory::new();
        assert!(conn.connect_using(Arc::new(factory.clone())).await);

        factory.last_peer().unwrap().close("server going away");
        wait_until(|| factory.open_count() == 2 && conn.is_connected()).await;

        assert_eq!(
            *errors.lock(),
            [ConnectionError::Closed("server going away".into())]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_malformed_frame_faults_connection() {
        let conn = connection_with(
            ConnectionSettings::default().with_reconnect(ReconnectPolicy::disabled()),
            Some("token"),
            Arc::new(ScriptProtocol),
        );
        let errors = record_errors(&conn);
        let factory = MemoryTransportFactory::new();
        assert!(conn.connect_using(Arc::new(factory.clone())).await);

        factory.last_peer().unwrap().push("garbage");
        wait_until(|| !errors.lock().is_empty()).await;

        assert_eq!(conn.state(), ConnectionState::Disconnected);
        assert!(factory.last_peer().unwrap().is_closed());
        assert!(matches!(errors.lock()[0], ConnectionError::Protocol(_)));
        assert_eq!(factory.open_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnect_request_uses_new_url() {
        let conn = connection_with(
            ConnectionSettings::default(),
            Some("token"),
            Arc::new(ScriptProtocol),
        );
        let factory = MemoryTransportFactory::new();
        assert!(conn.connect_using(Arc::new(factory.clone())).await);

        factory
            .last_peer()
            .unwrap()
            .push("reconnect:wss://edge.example/ws");
        wait_until(|| factory.open_count() == 2 && conn.is_connected()).await;

        let requests = factory.requests();
        assert_eq!(requests[0].metadata(URL_METADATA_KEY), None);
        assert_eq!(
            requests[1].metadata(URL_METADATA_KEY),
            Some("wss://edge.example/ws")
        );
    }

    fn refused() -> TransportError {
        TransportError::ConnectionFailed {
            target: "memory".into(),
            reason: "refused".into(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_failure_notifies_errors() {
        let conn = connection_with(
            ConnectionSettings::default().with_reconnect(ReconnectPolicy::disabled()),
            Some("token"),
            Arc::new(PlainTextProtocol),
        );
        let errors = record_errors(&conn);
        let factory = MemoryTransportFactory::new();
        factory.fail_next_open(refused());

        assert!(!conn.connect_using(Arc::new(factory.clone())).await);
        tokio::time::sleep(Duration::from_secs(5)).await;

        assert_eq!(conn.state(), ConnectionState::Disconnected);
        assert_eq!(errors.lock().len(), 1);
        assert_eq!(factory.requests().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_connect_reconnects_once() {
        let conn = connection();
        let errors = record_errors(&conn);
        let factory = MemoryTransportFactory::new();
        factory.fail_next_open(refused());

        assert!(!conn.connect_using(Arc::new(factory.clone())).await);
        wait_until(|| conn.is_connected()).await;

        assert_eq!(factory.requests().len(), 2);
        assert_eq!(
            *errors.lock(),
            [ConnectionError::Transport(refused())]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_connect_and_reconnect_stop_after_policy() {
        let conn = connection();
        let errors = record_errors(&conn);
        let factory = MemoryTransportFactory::manual_open();

        assert!(!conn.connect_using(Arc::new(factory.clone())).await);
        tokio::time::sleep(Duration::from_secs(60)).await;

        assert_eq!(factory.requests().len(), 2);
        assert_eq!(errors.lock().len(), 2);
        assert_eq!(conn.state(), ConnectionState::Disconnected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnect_url_kept_until_link_is_up() {
        let policy = ReconnectPolicy {
            max_attempts: 2,
            ..Default::default()
        };
        let conn = connection_with(
            ConnectionSettings::default().with_reconnect(policy),
            Some("token"),
            Arc::new(ScriptProtocol),
        );
        let factory = MemoryTransportFactory::new();
        assert!(conn.connect_using(Arc::new(factory.clone())).await);

        factory.fail_next_open(refused());
        factory
            .last_peer()
            .unwrap()
            .push("reconnect:wss://edge.example/ws");
        wait_until(|| factory.open_count() == 2 && conn.is_connected()).await;

        let urls: Vec<_> = factory
            .requests()
            .iter()
            .map(|request| request.metadata(URL_METADATA_KEY).map(str::to_string))
            .collect();
        assert_eq!(
            urls,
            [
                None,
                Some("wss://edge.example/ws".to_string()),
                Some("wss://edge.example/ws".to_string())
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_timeout() {
        let settings = ConnectionSettings {
            open_timeout: Duration::from_secs(1),
            reconnect: ReconnectPolicy::disabled(),
            ..Default::default()
        };
        let conn = connection_with(settings, Some("token"), Arc::new(PlainTextProtocol));
        let errors = record_errors(&conn);
        let factory = MemoryTransportFactory::manual_open();

        assert!(!conn.connect_using(Arc::new(factory.clone())).await);
        assert_eq!(
            *errors.lock(),
            [ConnectionError::OpenTimeout(Duration::from_secs(1))]
        );
        assert!(factory.last_peer().unwrap().is_closed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_restricted_send_pauses_queue() {
        let conn = connection();
        let errors = record_errors(&conn);
        let factory = MemoryTransportFactory::new();
        assert!(conn.connect_using(Arc::new(factory.clone())).await);
        let peer = factory.last_peer().unwrap();

        peer.fail_sends(Some(TransportError::Restricted("unverified".into())));
        conn.send("!first");
        wait_until(|| conn.is_restricted()).await;
        assert_eq!(errors.lock().len(), 1);

        conn.send("!second");
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(conn.queue().queued_messages(), ["!second"]);

        peer.fail_sends(None);
        conn.clear_restriction();
        wait_until(|| peer.sent() == ["!second"]).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_cancels_pending_reconnect() {
        let policy = ReconnectPolicy {
            max_attempts: 3,
            initial_delay: Duration::from_secs(5),
            ..Default::default()
        };
        let conn = connection_with(
            ConnectionSettings::default().with_reconnect(policy),
            Some("token"),
            Arc::new(PlainTextProtocol),
        );
        let factory = MemoryTransportFactory::new();
        assert!(conn.connect_using(Arc::new(factory.clone())).await);

        factory.last_peer().unwrap().close("bye");
        wait_until(|| conn.state() == ConnectionState::Reconnecting).await;

        conn.shutdown();
        tokio::time::sleep(Duration::from_secs(30)).await;

        assert_eq!(factory.open_count(), 1);
        assert_eq!(conn.state(), ConnectionState::Shutdown);
        assert!(!conn.connect_using(Arc::new(factory.clone())).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_is_quiet() {
        let conn = connection();
        let errors = record_errors(&conn);
        let mut states = conn.subscribe_state();
        let factory = MemoryTransportFactory::new();
        assert!(conn.connect_using(Arc::new(factory.clone())).await);
        assert_eq!(*states.borrow_and_update(), ConnectionState::Connected);

        conn.disconnect();
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert_eq!(conn.state(), ConnectionState::Disconnected);
        assert!(!conn.queue().is_running());
        assert!(errors.lock().is_empty());
        assert_eq!(factory.open_count(), 1);
    }
}
