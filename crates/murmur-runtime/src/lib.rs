//! Murmur Runtime - connection lifecycle and client wiring.
//!
//! This crate provides:
//! - The persistent [`Connection`] state machine with reconnect policy
//! - Keyed listener registries for inbound lines and errors
//! - Layered configuration loading ([`config`])
//! - Logging configuration ([`logging`])
//! - [`MurmurClient`], the root owning one queue, one connection and one
//!   command service
//!
//! ```rust,ignore
//! use murmur_runtime::{MurmurClient, config::load_config};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = MurmurClient::builder(load_config()?)
//!         .identity_resolver(resolver)
//!         .build()?;
//!
//!     client.connect().await?;
//!     client.send_raw_command("!inventory")?;
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod config;
pub mod connection;
pub mod error;
pub mod listeners;
pub mod logging;

// Re-exports
pub use client::{CORRELATOR_LISTENER, MurmurClient, MurmurClientBuilder};
pub use config::{ConfigError, ConfigLoader, ConfigResult, MurmurConfig};
pub use connection::{
    Connection, ConnectionSettings, ConnectionState, ErrorListener, MessageListener,
    ReconnectPolicy,
};
pub use error::{ConnectionError, RuntimeError, RuntimeResult};
pub use listeners::ListenerSet;
pub use logging::LoggingBuilder;

// Re-export tracing for use by other crates
pub use tracing;
pub use tracing_subscriber;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use tracing::{Level, debug, error, info, instrument, span, trace, warn};
}
