//! Chat lines as seen by the correlator.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// A single chat line, inbound or outbound.
///
/// Messages are immutable once created. The connection creates one for every
/// surfaced inbound event and for every outbound send that went through, so the
/// ordered log reflects both sides of the conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    text: String,
    timestamp: i64,
    is_self: bool,
    is_whisper: bool,
}

impl Message {
    /// Creates a message stamped with the current wall-clock time.
    pub fn new(text: impl Into<String>, is_self: bool, is_whisper: bool) -> Self {
        Self::with_timestamp(text, now_millis(), is_self, is_whisper)
    }

    /// Creates a message with an explicit timestamp in unix milliseconds.
    pub fn with_timestamp(
        text: impl Into<String>,
        timestamp: i64,
        is_self: bool,
        is_whisper: bool,
    ) -> Self {
        Self {
            text: text.into(),
            timestamp,
            is_self,
            is_whisper,
        }
    }

    /// A line received from a peer via direct message.
    pub fn whisper(text: impl Into<String>) -> Self {
        Self::new(text, false, true)
    }

    /// A line received in the channel.
    pub fn channel(text: impl Into<String>) -> Self {
        Self::new(text, false, false)
    }

    /// A line this client sent.
    pub fn outbound(text: impl Into<String>) -> Self {
        Self::new(text, true, true)
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Unix timestamp in milliseconds.
    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }

    pub fn is_self(&self) -> bool {
        self.is_self
    }

    pub fn is_whisper(&self) -> bool {
        self.is_whisper
    }
}

/// Current wall-clock time in unix milliseconds.
pub fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or_default()
}
