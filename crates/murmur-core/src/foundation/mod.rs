//! Foundation layer - core data types and errors.

pub mod error;
pub mod message;

pub use error::{
    ProtocolError, ProtocolResult, StoreError, StoreResult, TransportError, TransportResult,
};
pub use message::{Message, now_millis};
