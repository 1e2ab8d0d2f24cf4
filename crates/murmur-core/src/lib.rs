//! # Murmur Core
//!
//! The core building blocks of the murmur chat command client.
//!
//! ## Layers
//!
//! ### Foundation
//!
//! - [`Message`]: an immutable, timestamped chat line
//! - Error taxonomy ([`TransportError`], [`ProtocolError`], [`StoreError`])
//!
//! ### Rate limiting
//!
//! - [`RollingTimer`]: sliding-window occurrence counter
//! - [`MessageQueue`]: FIFO outbound queue gated by per-second and per-minute windows
//!
//! ### Integration
//!
//! Seams to everything the core treats as external:
//! - [`TransportFactory`] / [`Transport`]: the vendor connection as "send text"
//!   plus a stream of [`TransportEvent`]s
//! - [`TokenSource`] / [`IdentityResolver`]: auth token and identity lookup
//! - [`ConfigStore`]: persisted settings hook
//! - [`Protocol`]: inbound envelope classification
//! - [`CommandSink`]: where the correlator enqueues outbound commands
//!
//! ## Data Flow
//!
//! ```text
//! ┌───────────┐  TransportEvent  ┌────────────┐  Message  ┌─────────────┐
//! │ Transport │─────────────────▶│ Connection │──────────▶│ Correlator  │
//! └───────────┘                  └────────────┘           └─────────────┘
//!       ▲                              │                         │
//!       │ send                         │ start/stop              │ enqueue
//!       │                        ┌─────▼──────┐                  │
//!       └────────────────────────│MessageQueue│◀─────────────────┘
//!                                └────────────┘
//! ```

pub mod foundation;
pub mod integration;
pub mod ratelimit;

pub use foundation::{
    Message, ProtocolError, ProtocolResult, StoreError, StoreResult, TransportError,
    TransportResult, now_millis,
};

pub use integration::{
    BoxedTransport, BoxedTransportFactory, ChatLine, CommandSink, ConfigStore, Identity,
    IdentityResolver, InboundEvent, MemoryConfigStore, OpenRequest, PLAIN_TEXT_PEER,
    PersistedConfig, PlainTextProtocol, Protocol, SessionEvent, StaticIdentity,
    StoredTokenSource, TokenSource, Transport, TransportEvent, TransportEventReceiver,
    TransportEventSender, TransportFactory, URL_METADATA_KEY, transport_channel,
};

pub use ratelimit::{CheckFn, MessageQueue, QueueConfig, RollingTimer, SendFn};

/// Prelude for common imports.
pub mod prelude {
    pub use super::foundation::*;
    pub use super::integration::{
        CommandSink, Identity, IdentityResolver, Protocol, TokenSource, Transport,
        TransportEvent, TransportFactory,
    };
    pub use super::ratelimit::{MessageQueue, QueueConfig, RollingTimer};
}
