//! Application root wiring queue, connection and correlator together.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use murmur_runtime::{MurmurClient, config::load_config};
//!
//! let config = load_config()?;
//! let client = MurmurClient::builder(config)
//!     .store(store)
//!     .identity_resolver(resolver)
//!     .build()?;
//!
//! client.service().subscribe_to_command("stats", "show", "default", None, "hud", |_, m| {
//!     println!("{:?}", m.group("hp"));
//! })?;
//! client.connect().await?;
//! client.service().send_initial_command("stats", "show")?;
//! ```
//!
//! One client owns one queue, one connection and one command service. Every
//! line the connection surfaces or sends is forwarded to the service, so the
//! correlator log holds both sides of the conversation in order.

use std::sync::Arc;

use murmur_core::{
    BoxedTransportFactory, CommandSink, ConfigStore, IdentityResolver, MemoryConfigStore,
    MessageQueue, PlainTextProtocol, Protocol, StoredTokenSource, TokenSource,
};
use murmur_framework::{CommandRegistry, CommandService};
use tracing::{debug, info, warn};

use crate::config::MurmurConfig;
use crate::connection::{Connection, ConnectionSettings};
use crate::error::{RuntimeError, RuntimeResult};
use crate::logging;

/// Listener id under which the command service receives connection lines.
pub const CORRELATOR_LISTENER: &str = "murmur.correlator";

pub struct MurmurClient {
    config: MurmurConfig,
    queue: Arc<MessageQueue>,
    connection: Arc<Connection>,
    service: Arc<CommandService>,
    store: Arc<dyn ConfigStore>,
}

impl MurmurClient {
    /// Creates a builder for `config`.
    pub fn builder(config: MurmurConfig) -> MurmurClientBuilder {
        MurmurClientBuilder::new(config)
    }

    pub fn config(&self) -> &MurmurConfig {
        &self.config
    }

    pub fn queue(&self) -> &Arc<MessageQueue> {
        &self.queue
    }

    pub fn connection(&self) -> &Arc<Connection> {
        &self.connection
    }

    pub fn service(&self) -> &Arc<CommandService> {
        &self.service
    }

    pub fn store(&self) -> &Arc<dyn ConfigStore> {
        &self.store
    }

    /// Connects with the configured transport factory.
    pub async fn connect(&self) -> RuntimeResult<bool> {
        self.connection.connect().await
    }

    /// Connects through `factory`. See [`Connection::connect_using`].
    pub async fn connect_using(&self, factory: BoxedTransportFactory) -> bool {
        self.connection.connect_using(factory).await
    }

    /// Enqueues a manually typed command and records it in the persisted
    /// command history.
    ///
    /// Returns whether the line was enqueued.
    pub fn send_raw_command(&self, text: &str) -> RuntimeResult<bool> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(false);
        }

        let enqueued = self.service.send_text(text, true);

        let mut persisted = self.store.current();
        persisted.record_command(text, self.config.commands.history_limit);
        self.store.save(&persisted)?;
        debug!(command = %text, enqueued, "Raw command sent");

        Ok(enqueued)
    }

    /// Manually issued commands, oldest first.
    pub fn command_history(&self) -> Vec<String> {
        self.store.current().command_history
    }

    /// Shuts the connection down for good.
    pub fn shutdown(&self) {
        self.connection.shutdown();
        info!("Client shut down");
    }
}

/// Builder for [`MurmurClient`].
///
/// Only the identity resolver is mandatory. Everything else falls back to:
/// - the registry at `commands.path`, or an empty registry
/// - an in-memory config store
/// - a token source reading the store's cached token
/// - [`PlainTextProtocol`]
/// - the WebSocket transport at `connection.url` (feature `ws-client`)
pub struct MurmurClientBuilder {
    config: MurmurConfig,
    registry: Option<CommandRegistry>,
    store: Option<Arc<dyn ConfigStore>>,
    token_source: Option<Arc<dyn TokenSource>>,
    identity_resolver: Option<Arc<dyn IdentityResolver>>,
    protocol: Option<Arc<dyn Protocol>>,
    transport_factory: Option<BoxedTransportFactory>,
    init_logging: bool,
}

impl MurmurClientBuilder {
    pub fn new(config: MurmurConfig) -> Self {
        Self {
            config,
            registry: None,
            store: None,
            token_source: None,
            identity_resolver: None,
            protocol: None,
            transport_factory: None,
            init_logging: true,
        }
    }

    pub fn registry(mut self, registry: CommandRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn store(mut self, store: Arc<dyn ConfigStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn token_source(mut self, source: Arc<dyn TokenSource>) -> Self {
        self.token_source = Some(source);
        self
    }

    pub fn identity_resolver(mut self, resolver: Arc<dyn IdentityResolver>) -> Self {
        self.identity_resolver = Some(resolver);
        self
    }

    pub fn protocol(mut self, protocol: Arc<dyn Protocol>) -> Self {
        self.protocol = Some(protocol);
        self
    }

    pub fn transport_factory(mut self, factory: BoxedTransportFactory) -> Self {
        self.transport_factory = Some(factory);
        self
    }

    /// Skips logging setup from `config.logging`.
    pub fn without_logging(mut self) -> Self {
        self.init_logging = false;
        self
    }

    pub fn build(self) -> RuntimeResult<MurmurClient> {
        if self.init_logging {
            logging::init_from_config(&self.config.logging);
        }

        let resolver = self
            .identity_resolver
            .ok_or(RuntimeError::MissingComponent("identity resolver"))?;

        let registry = match (self.registry, &self.config.commands.path) {
            (Some(registry), _) => registry,
            (None, Some(path)) => CommandRegistry::from_path(path)?,
            (None, None) => {
                warn!("No command registry configured, only raw commands are available");
                CommandRegistry::default()
            }
        };

        let store: Arc<dyn ConfigStore> = match self.store {
            Some(store) => store,
            None => Arc::new(MemoryConfigStore::default()),
        };
        let token_source: Arc<dyn TokenSource> = match self.token_source {
            Some(source) => source,
            None => Arc::new(StoredTokenSource::new(Arc::clone(&store))),
        };
        let protocol: Arc<dyn Protocol> = match self.protocol {
            Some(protocol) => protocol,
            None => Arc::new(PlainTextProtocol),
        };

        let queue = Arc::new(MessageQueue::new(self.config.queue.to_queue_config()));
        let connection = Connection::new(
            ConnectionSettings::from_config(&self.config.connection),
            Arc::clone(&queue),
            token_source,
            resolver,
            Arc::clone(&protocol),
        );

        match self.transport_factory {
            Some(factory) => connection.set_factory(factory),
            None => set_default_factory(&connection, &self.config),
        }

        let sink: Arc<dyn CommandSink> = queue.clone();
        let service = Arc::new(CommandService::new(Arc::new(registry), sink));
        let correlator = Arc::clone(&service);
        connection.register(
            CORRELATOR_LISTENER,
            move |message| {
                correlator.on_incoming(message.clone());
            },
            true,
        );

        info!(
            protocol = protocol.name(),
            response_keys = service.registry().len(),
            per_second = self.config.queue.per_second,
            per_minute = self.config.queue.per_minute,
            "Client built"
        );

        Ok(MurmurClient {
            config: self.config,
            queue,
            connection,
            service,
            store,
        })
    }
}

#[cfg(feature = "ws-client")]
fn set_default_factory(connection: &Connection, config: &MurmurConfig) {
    let factory = murmur_transport::WsTransportFactory::new(config.connection.url.clone());
    connection.set_factory(Arc::new(factory));
}

#[cfg(not(feature = "ws-client"))]
fn set_default_factory(_connection: &Connection, config: &MurmurConfig) {
    debug!(
        url = %config.connection.url,
        "No transport factory given and ws-client is disabled; use connect_using"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::time::Duration;

    use murmur_core::{Identity, PersistedConfig, QueueConfig, StaticIdentity};
    use murmur_framework::MatchedResponse;
    use murmur_transport::MemoryTransportFactory;
    use parking_lot::Mutex;

    const COMMANDS: &str = r#"{
        "version": 1,
        "commands": {
            "stats": {
                "show": {
                    "command": "!stats",
                    "responses": {
                        "default": { "hp": "^HP (?<hp>\\d+)/(?<max>\\d+)$" }
                    }
                },
                "give": {
                    "command": "!give {item}"
                }
            }
        }
    }"#;

    fn client_with(config: MurmurConfig) -> MurmurClient {
        let store = Arc::new(MemoryConfigStore::new(PersistedConfig {
            auth_token: Some("oauth:token".into()),
            ..Default::default()
        }));
        MurmurClient::builder(config)
            .without_logging()
            .registry(CommandRegistry::from_json_str(COMMANDS).unwrap())
            .store(store)
            .identity_resolver(Arc::new(StaticIdentity(Identity::new("7", "bot", "cid"))))
            .transport_factory(Arc::new(MemoryTransportFactory::new()))
            .build()
            .unwrap()
    }

    fn client() -> MurmurClient {
        client_with(MurmurConfig::default())
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
    fn test_identity_resolver_required() {
        let result = MurmurClient::builder(MurmurConfig::default())
            .without_logging()
            .build();
        assert!(matches!(
            result,
            Err(RuntimeError::MissingComponent("identity resolver"))
        ));
    }

    #[test]
    fn test_registry_loaded_from_config_path() {
        let path = std::env::temp_dir().join(format!("murmur-commands-{}.json", std::process::id()));
        std::fs::write(&path, COMMANDS).unwrap();

        let mut config = MurmurConfig::default();
        config.commands.path = Some(path.clone());
        let client = MurmurClient::builder(config)
            .without_logging()
            .identity_resolver(Arc::new(StaticIdentity(Identity::new("7", "bot", "cid"))))
            .build()
            .unwrap();

        assert!(client.service().registry().contains_key("command.stats.show.responses.default"));
        let _ = std::fs::remove_file(path);
    }

    #[tokio::test(start_paused = true)]
    async fn test_command_round_trip() {
        let factory = MemoryTransportFactory::new();
        let client = client();
        let replies: Arc<Mutex<Vec<MatchedResponse>>> = Arc::default();
        let sink = Arc::clone(&replies);
        client
            .service()
            .subscribe_to_command("stats", "show", "default", None, "hud", move |_, m| {
                sink.lock().push(m.clone());
            })
            .unwrap();

        assert!(client.connect_using(Arc::new(factory.clone())).await);
        assert!(client.service().send_initial_command("stats", "show").unwrap());
        assert!(!client.service().send_initial_command("stats", "show").unwrap());

        let peer = factory.last_peer().unwrap();
        wait_until(|| peer.sent() == ["!stats"]).await;
        assert!(client.service().has_command_been_sent("stats", "show"));

        peer.push("HP 7/10");
        wait_until(|| replies.lock().len() == 1).await;

        let reply = replies.lock()[0].clone();
        assert_eq!(reply.group("hp"), Some("7"));
        assert_eq!(reply.group("max"), Some("10"));
        assert_eq!(reply.line_index, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_command_awaiting_transport_not_sent_twice() {
        let registry = Arc::new(CommandRegistry::from_json_str(COMMANDS).unwrap());
        let queue = Arc::new(MessageQueue::new(QueueConfig::default()));
        let release = Arc::new(tokio::sync::Notify::new());
        let gate = Arc::clone(&release);
        queue.set_check_function(|| true);
        queue.set_send_function(move |_| {
            let gate = Arc::clone(&gate);
            Box::pin(async move {
                gate.notified().await;
                Ok(())
            })
        });
        let service = CommandService::new(registry, queue.clone());

        assert!(service.send_initial_command("stats", "show").unwrap());
        let draining = tokio::spawn({
            let queue = Arc::clone(&queue);
            async move { queue.process_queue().await }
        });
        while queue.in_flight().is_none() {
            tokio::task::yield_now().await;
        }

        assert!(queue.is_empty());
        assert!(service.has_command_been_sent("stats", "show"));
        assert!(!service.send_initial_command("stats", "show").unwrap());

        release.notify_one();
        assert_eq!(draining.await.unwrap(), 1);
        assert!(queue.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_templated_command_needs_params() {
        let factory = MemoryTransportFactory::new();
        let client = client();
        assert!(client.connect_using(Arc::new(factory.clone())).await);

        assert!(client.service().send_command("stats", "give", &HashMap::new()).is_err());

        let params = HashMap::from([("item".to_string(), "potion".to_string())]);
        assert!(client.service().send_command("stats", "give", &params).unwrap());

        let peer = factory.last_peer().unwrap();
        wait_until(|| peer.sent() == ["!give potion"]).await;
    }

    #[test]
    fn test_raw_command_history() {
        let mut config = MurmurConfig::default();
        config.commands.history_limit = 2;
        let client = client_with(config);

        assert!(client.send_raw_command(" !a ").unwrap());
        assert!(client.send_raw_command("!b").unwrap());
        assert!(client.send_raw_command("!a").unwrap());
        assert!(client.send_raw_command("!c").unwrap());
        assert!(!client.send_raw_command("   ").unwrap());

        assert_eq!(client.command_history(), ["!a", "!c"]);
        assert_eq!(client.queue().queued_messages(), ["!a", "!b", "!a", "!c"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown() {
        let client = client();
        assert!(tokio_test::assert_ok!(client.connect().await));
        client.shutdown();
        assert!(!client.connection().is_connected());
        assert!(!client.connect().await.unwrap());
    }
}
