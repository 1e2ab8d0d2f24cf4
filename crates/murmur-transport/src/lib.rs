//! # Murmur Transport
//!
//! Concrete [`TransportFactory`](murmur_core::TransportFactory)
//! implementations.
//!
//! ## Features
//!
//! - `ws-client`: WebSocket client transport ([`WsTransportFactory`])
//! - `full`: every transport
//!
//! The in-process [`MemoryTransportFactory`] is always available.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────┐
//! │  murmur-runtime     │  (Connection: state machine, reconnect policy)
//! ├─────────────────────┤
//! │  murmur-core        │  (Transport / TransportFactory traits)
//! ├─────────────────────┤
//! │  murmur-transport   │  <- This crate (implementations)
//! ├─────────────────────┤
//! │  Network / memory   │
//! └─────────────────────┘
//! ```
//!
//! Transports never reconnect on their own. They report `Open`, `Message`,
//! `Close` and `Error` through the event channel handed to
//! [`TransportFactory::open`](murmur_core::TransportFactory::open) and leave
//! the decision to the connection.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use murmur_transport::WsTransportFactory;
//!
//! let factory = Arc::new(WsTransportFactory::new("wss://eventsub.wss.twitch.tv/ws"));
//! client.connect_using(factory).await;
//! ```

pub mod memory;

#[cfg(feature = "ws-client")]
pub mod websocket;

pub use memory::{MemoryPeer, MemoryTransport, MemoryTransportFactory};

#[cfg(feature = "ws-client")]
pub use websocket::{WsTransport, WsTransportFactory};
