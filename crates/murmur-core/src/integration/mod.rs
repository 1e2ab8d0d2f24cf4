//! Integration layer - seams to external collaborators.
//!
//! - Transport construction and the transport event channel
//! - Token source and identity resolution
//! - Persisted-config hook
//! - Inbound envelope classification
//! - Outbound command sink

pub mod identity;
pub mod protocol;
pub mod sink;
pub mod store;
pub mod transport;

pub use identity::{Identity, IdentityResolver, StaticIdentity, StoredTokenSource, TokenSource};
pub use protocol::{ChatLine, InboundEvent, PLAIN_TEXT_PEER, PlainTextProtocol, Protocol, SessionEvent};
pub use sink::CommandSink;
pub use store::{ConfigStore, MemoryConfigStore, PersistedConfig};
pub use transport::{
    BoxedTransport, BoxedTransportFactory, OpenRequest, Transport, TransportEvent,
    TransportEventReceiver, TransportEventSender, TransportFactory, URL_METADATA_KEY,
    transport_channel,
};
