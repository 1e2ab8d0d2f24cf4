//! # Murmur Adapter for EventSub
//!
//! Classifies frames from an EventSub-style WebSocket (session control,
//! channel chat messages, whispers) into murmur [`InboundEvent`]s.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use murmur_adapter_eventsub::EventSubProtocol;
//! use murmur_runtime::MurmurClient;
//!
//! let client = MurmurClient::builder(config)
//!     .protocol(Arc::new(EventSubProtocol))
//!     .identity_resolver(resolver)
//!     .build()?;
//! ```
//!
//! Subscribing to `channel.chat.message` and `user.whisper.message` for the
//! session is the host's job; this crate only reads what arrives.
//!
//! [`InboundEvent`]: murmur_core::InboundEvent

pub mod model;
pub mod protocol;

pub use model::{Envelope, Metadata};
pub use protocol::EventSubProtocol;
