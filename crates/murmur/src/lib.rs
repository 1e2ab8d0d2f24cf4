//! # Murmur
//!
//! A chat client core that keeps one persistent connection alive, paces
//! outbound lines under a per-second and a per-minute cap, and turns free-text
//! replies into structured events for any number of independent consumers.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────┐  events  ┌────────────┐  Message  ┌────────────────┐
//! │ Transport │─────────▶│ Connection │──────────▶│ CommandService │──▶ widget "hud"
//! │ (adapter) │          │            │           │  (correlator)  │──▶ widget "bag"
//! └───────────┘          └────────────┘           └────────────────┘
//!       ▲                      │ start/stop               │ enqueue
//!       │ send           ┌─────▼──────┐                   │
//!       └────────────────│MessageQueue│◀──────────────────┘
//!                        └────────────┘
//! ```
//!
//! - **Connection**: connect/reconnect state machine over a pluggable transport
//! - **MessageQueue**: FIFO outbound queue behind two rolling windows
//! - **CommandRegistry**: JSON command document compiled into response patterns
//! - **CommandService**: logs every line, matches it per subscription, keeps
//!   history for late subscribers and sends commands at most once
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use murmur::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = MurmurClient::builder(load_config()?)
//!         .identity_resolver(std::sync::Arc::new(StaticIdentity(identity)))
//!         .build()?;
//!
//!     client.service().subscribe_to_command("stats", "show", "default", None, "hud", |_, m| {
//!         println!("HP {:?}", m.group("hp"));
//!     })?;
//!
//!     client.connect().await?;
//!     client.service().send_initial_command("stats", "show")?;
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - `toml-config` (default) / `yaml-config`: configuration file formats
//! - `json-log`: JSON log output
//! - `ws-client`: WebSocket transport
//! - `adapter-eventsub`: EventSub envelope classifier

#[cfg(feature = "adapter-eventsub")]
pub use murmur_adapter_eventsub as eventsub;
pub use murmur_core as core;
pub use murmur_framework as framework;
pub use murmur_runtime as runtime;
pub use murmur_transport as transport;

/// Prelude module for convenient imports.
///
/// ```rust,ignore
/// use murmur::prelude::*;
/// ```
pub mod prelude {
    // Client root and configuration
    pub use murmur_runtime::config::{ConfigLoader, MurmurConfig, load_config};
    pub use murmur_runtime::{
        Connection, ConnectionError, ConnectionState, MurmurClient, ReconnectPolicy,
        RuntimeError,
    };

    // Correlation
    pub use murmur_framework::{CommandRegistry, CommandService, MatchedResponse};

    // Seams for custom implementations
    pub use murmur_core::{
        ConfigStore, Identity, IdentityResolver, Message, MessageQueue, Protocol,
        StaticIdentity, TokenSource, Transport, TransportFactory,
    };
}
