//! Inbound envelope classification.
//!
//! The vendor envelope is opaque to the core. A [`Protocol`] turns one raw
//! frame into exactly one [`InboundEvent`]: a session/control event, a channel
//! message or a whisper. Filtering by identity happens in the connection.

use crate::foundation::ProtocolResult;

/// Sender id used by [`PlainTextProtocol`] for every frame.
pub const PLAIN_TEXT_PEER: &str = "peer";

/// A chat line with its routing information.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatLine {
    /// User id of the sender.
    pub sender_id: String,
    /// Login of the sender, when the envelope carries it.
    pub sender_login: Option<String>,
    /// Channel (broadcaster) id for channel messages, recipient id for whispers.
    pub target_id: Option<String>,
    /// Message body.
    pub text: String,
}

impl ChatLine {
    pub fn new(sender_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            sender_id: sender_id.into(),
            sender_login: None,
            target_id: None,
            text: text.into(),
        }
    }

    pub fn with_login(mut self, login: impl Into<String>) -> Self {
        self.sender_login = Some(login.into());
        self
    }

    pub fn with_target(mut self, target_id: impl Into<String>) -> Self {
        self.target_id = Some(target_id.into());
        self
    }
}

/// Session-level control events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// The session is established.
    Welcome { session_id: String },
    /// Liveness ping; carries no data.
    Keepalive,
    /// The service asks the client to reconnect.
    Reconnect { url: Option<String> },
    /// A subscription was revoked by the service.
    Revocation { reason: String },
    /// A control message this client does not act on.
    Other(String),
}

/// One classified inbound frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundEvent {
    Session(SessionEvent),
    Channel(ChatLine),
    Whisper(ChatLine),
}

/// Decodes raw frames into [`InboundEvent`]s.
pub trait Protocol: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Classifies one raw frame.
    fn parse(&self, raw: &str) -> ProtocolResult<InboundEvent>;
}

/// Treats every non-empty frame as a whisper from a single peer.
///
/// Suits line-oriented backends with no envelope at all, and tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainTextProtocol;

impl Protocol for PlainTextProtocol {
    fn name(&self) -> &'static str {
        "plain-text"
    }

    fn parse(&self, raw: &str) -> ProtocolResult<InboundEvent> {
        let text = raw.trim_end_matches(['\r', '\n']);
        if text.is_empty() {
            return Ok(InboundEvent::Session(SessionEvent::Keepalive));
        }
        Ok(InboundEvent::Whisper(ChatLine::new(PLAIN_TEXT_PEER, text)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_text_whisper() {
        let event = PlainTextProtocol.parse("foo=bar\r\n").unwrap();
        assert_eq!(
            event,
            InboundEvent::Whisper(ChatLine::new(PLAIN_TEXT_PEER, "foo=bar"))
        );
    }

    #[test]
    fn test_plain_text_empty_is_keepalive() {
        let event = PlainTextProtocol.parse("\n").unwrap();
        assert_eq!(event, InboundEvent::Session(SessionEvent::Keepalive));
    }

    #[test]
    fn test_chat_line_builders() {
        let line = ChatLine::new("1", "hi").with_login("bot").with_target("2");
        assert_eq!(line.sender_login.as_deref(), Some("bot"));
        assert_eq!(line.target_id.as_deref(), Some("2"));
    }
}
