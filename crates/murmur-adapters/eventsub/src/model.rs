//! EventSub WebSocket message model.
//!
//! # Envelope
//!
//! ```text
//! Envelope { metadata, payload }
//! ├── metadata.message_type = "session_welcome"    → SessionPayload
//! ├── metadata.message_type = "session_keepalive"  → (empty)
//! ├── metadata.message_type = "session_reconnect"  → SessionPayload
//! ├── metadata.message_type = "revocation"         → RevocationPayload
//! └── metadata.message_type = "notification"       → NotificationPayload
//!     ├── channel.chat.message  → ChatMessageEvent
//!     └── user.whisper.message  → WhisperEvent
//! ```
//!
//! Only the fields the classifier reads are modelled; everything else in the
//! payload is ignored.

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const SESSION_WELCOME: &str = "session_welcome";
pub const SESSION_KEEPALIVE: &str = "session_keepalive";
pub const SESSION_RECONNECT: &str = "session_reconnect";
pub const REVOCATION: &str = "revocation";
pub const NOTIFICATION: &str = "notification";

pub const CHANNEL_CHAT_MESSAGE: &str = "channel.chat.message";
pub const USER_WHISPER_MESSAGE: &str = "user.whisper.message";

// ============================================================================
// Envelope
// ============================================================================

/// One frame as sent by the EventSub WebSocket.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    pub metadata: Metadata,
    #[serde(default)]
    pub payload: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Metadata {
    #[serde(default)]
    pub message_id: String,
    pub message_type: String,
    #[serde(default)]
    pub message_timestamp: Option<String>,
    /// Present on notifications and revocations.
    #[serde(default)]
    pub subscription_type: Option<String>,
}

// ============================================================================
// Session
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionPayload {
    pub session: Session,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub keepalive_timeout_seconds: Option<u64>,
    /// Set only on `session_reconnect`.
    #[serde(default)]
    pub reconnect_url: Option<String>,
}

// ============================================================================
// Subscriptions
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subscription {
    #[serde(default)]
    pub id: String,
    /// `enabled`, or the revocation cause (`authorization_revoked`, `user_removed`, ...).
    pub status: String,
    #[serde(rename = "type")]
    pub kind: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RevocationPayload {
    pub subscription: Subscription,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationPayload {
    pub subscription: Subscription,
    #[serde(default)]
    pub event: Option<Value>,
}

// ============================================================================
// Events
// ============================================================================

/// `channel.chat.message`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessageEvent {
    pub broadcaster_user_id: String,
    pub chatter_user_id: String,
    #[serde(default)]
    pub chatter_user_login: Option<String>,
    pub message: MessageBody,
}

/// `user.whisper.message`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WhisperEvent {
    pub from_user_id: String,
    #[serde(default)]
    pub from_user_login: Option<String>,
    pub to_user_id: String,
    pub whisper: MessageBody,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageBody {
    pub text: String,
}
