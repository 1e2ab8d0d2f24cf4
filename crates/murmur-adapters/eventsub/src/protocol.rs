//! [`Protocol`] implementation for EventSub frames.

use murmur_core::{ChatLine, InboundEvent, Protocol, ProtocolError, ProtocolResult, SessionEvent};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::trace;

use crate::model::{
    CHANNEL_CHAT_MESSAGE, ChatMessageEvent, Envelope, NOTIFICATION, NotificationPayload,
    REVOCATION, RevocationPayload, SESSION_KEEPALIVE, SESSION_RECONNECT, SESSION_WELCOME,
    SessionPayload, USER_WHISPER_MESSAGE, WhisperEvent,
};

/// Classifies EventSub WebSocket frames.
///
/// Chat messages become [`InboundEvent::Channel`] lines targeted at the
/// broadcaster; whispers become [`InboundEvent::Whisper`] lines targeted at
/// the recipient. Notifications of any other subscription type surface as
/// [`SessionEvent::Other`].
#[derive(Debug, Clone, Copy, Default)]
pub struct EventSubProtocol;

impl Protocol for EventSubProtocol {
    fn name(&self) -> &'static str {
        "eventsub"
    }

    fn parse(&self, raw: &str) -> ProtocolResult<InboundEvent> {
        let envelope: Envelope = serde_json::from_str(raw)
            .map_err(|e| ProtocolError::Malformed(format!("envelope: {e}")))?;
        let Envelope { metadata, payload } = envelope;
        trace!(
            message_id = %metadata.message_id,
            message_type = %metadata.message_type,
            "EventSub frame"
        );

        let event = match metadata.message_type.as_str() {
            SESSION_WELCOME => {
                let payload: SessionPayload = decode(payload, SESSION_WELCOME)?;
                SessionEvent::Welcome {
                    session_id: payload.session.id,
                }
            }
            SESSION_KEEPALIVE => SessionEvent::Keepalive,
            SESSION_RECONNECT => {
                let payload: SessionPayload = decode(payload, SESSION_RECONNECT)?;
                SessionEvent::Reconnect {
                    url: payload.session.reconnect_url,
                }
            }
            REVOCATION => {
                let payload: RevocationPayload = decode(payload, REVOCATION)?;
                SessionEvent::Revocation {
                    reason: format!(
                        "{} ({})",
                        payload.subscription.kind, payload.subscription.status
                    ),
                }
            }
            NOTIFICATION => {
                let payload: NotificationPayload = decode(payload, NOTIFICATION)?;
                let kind = metadata
                    .subscription_type
                    .unwrap_or(payload.subscription.kind);
                return notification(kind, payload.event);
            }
            other => SessionEvent::Other(other.to_string()),
        };
        Ok(InboundEvent::Session(event))
    }
}

fn notification(kind: String, event: Option<Value>) -> ProtocolResult<InboundEvent> {
    let event = event.ok_or_else(|| ProtocolError::MissingField {
        field: "event",
        context: kind.clone(),
    })?;

    match kind.as_str() {
        CHANNEL_CHAT_MESSAGE => {
            let event: ChatMessageEvent = decode(event, CHANNEL_CHAT_MESSAGE)?;
            let mut line = ChatLine::new(event.chatter_user_id, event.message.text)
                .with_target(event.broadcaster_user_id);
            line.sender_login = event.chatter_user_login;
            Ok(InboundEvent::Channel(line))
        }
        USER_WHISPER_MESSAGE => {
            let event: WhisperEvent = decode(event, USER_WHISPER_MESSAGE)?;
            let mut line = ChatLine::new(event.from_user_id, event.whisper.text)
                .with_target(event.to_user_id);
            line.sender_login = event.from_user_login;
            Ok(InboundEvent::Whisper(line))
        }
        _ => Ok(InboundEvent::Session(SessionEvent::Other(kind))),
    }
}

fn decode<T: DeserializeOwned>(value: Value, context: &str) -> ProtocolResult<T> {
    serde_json::from_value(value).map_err(|e| ProtocolError::Malformed(format!("{context}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(frame: Value) -> ProtocolResult<InboundEvent> {
        EventSubProtocol.parse(&frame.to_string())
    }

    fn notification_frame(kind: &str, event: Value) -> Value {
        json!({
            "metadata": {
                "message_id": "m-1",
                "message_type": "notification",
                "message_timestamp": "2024-01-01T00:00:00Z",
                "subscription_type": kind,
                "subscription_version": "1"
            },
            "payload": {
                "subscription": { "id": "s-1", "status": "enabled", "type": kind, "version": "1" },
                "event": event
            }
        })
    }

    #[test]
    fn test_welcome() {
        let event = parse(json!({
            "metadata": { "message_id": "m", "message_type": "session_welcome" },
            "payload": { "session": {
                "id": "AQoQ", "status": "connected", "keepalive_timeout_seconds": 10,
                "reconnect_url": null, "connected_at": "2024-01-01T00:00:00Z"
            }}
        }))
        .unwrap();
        assert_eq!(
            event,
            InboundEvent::Session(SessionEvent::Welcome {
                session_id: "AQoQ".into()
            })
        );
    }

    #[test]
    fn test_keepalive_and_unknown_type() {
        let keepalive = parse(json!({
            "metadata": { "message_id": "m", "message_type": "session_keepalive" },
            "payload": {}
        }))
        .unwrap();
        assert_eq!(keepalive, InboundEvent::Session(SessionEvent::Keepalive));

        let other = parse(json!({
            "metadata": { "message_id": "m", "message_type": "something_new" }
        }))
        .unwrap();
        assert_eq!(
            other,
            InboundEvent::Session(SessionEvent::Other("something_new".into()))
        );
    }

    #[test]
    fn test_reconnect_carries_url() {
        let event = parse(json!({
            "metadata": { "message_id": "m", "message_type": "session_reconnect" },
            "payload": { "session": {
                "id": "AQoQ", "status": "reconnecting",
                "reconnect_url": "wss://eventsub.wss.twitch.tv?id=abc"
            }}
        }))
        .unwrap();
        assert_eq!(
            event,
            InboundEvent::Session(SessionEvent::Reconnect {
                url: Some("wss://eventsub.wss.twitch.tv?id=abc".into())
            })
        );
    }

    #[test]
    fn test_revocation() {
        let event = parse(json!({
            "metadata": {
                "message_id": "m", "message_type": "revocation",
                "subscription_type": "user.whisper.message"
            },
            "payload": { "subscription": {
                "id": "s", "status": "authorization_revoked", "type": "user.whisper.message"
            }}
        }))
        .unwrap();
        assert_eq!(
            event,
            InboundEvent::Session(SessionEvent::Revocation {
                reason: "user.whisper.message (authorization_revoked)".into()
            })
        );
    }

    #[test]
    fn test_chat_message() {
        let event = parse(notification_frame(
            "channel.chat.message",
            json!({
                "broadcaster_user_id": "1001",
                "broadcaster_user_login": "streamer",
                "chatter_user_id": "2002",
                "chatter_user_login": "gamebot",
                "message_id": "x",
                "message": { "text": "HP 7/10", "fragments": [] }
            }),
        ))
        .unwrap();

        let InboundEvent::Channel(line) = event else {
            panic!("expected channel line, got {event:?}");
        };
        assert_eq!(line.sender_id, "2002");
        assert_eq!(line.sender_login.as_deref(), Some("gamebot"));
        assert_eq!(line.target_id.as_deref(), Some("1001"));
        assert_eq!(line.text, "HP 7/10");
    }

    #[test]
    fn test_whisper() {
        let event = parse(notification_frame(
            "user.whisper.message",
            json!({
                "from_user_id": "2002",
                "from_user_login": "gamebot",
                "to_user_id": "3003",
                "to_user_login": "viewer",
                "whisper_id": "w",
                "whisper": { "text": "gold=5" }
            }),
        ))
        .unwrap();

        assert_eq!(
            event,
            InboundEvent::Whisper(
                ChatLine::new("2002", "gold=5")
                    .with_login("gamebot")
                    .with_target("3003")
            )
        );
    }

    #[test]
    fn test_other_notification() {
        let event = parse(notification_frame("channel.follow", json!({ "user_id": "1" }))).unwrap();
        assert_eq!(
            event,
            InboundEvent::Session(SessionEvent::Other("channel.follow".into()))
        );
    }

    #[test]
    fn test_malformed_frames() {
        assert!(matches!(
            EventSubProtocol.parse("not json"),
            Err(ProtocolError::Malformed(_))
        ));

        let missing_text = notification_frame(
            "user.whisper.message",
            json!({ "from_user_id": "1", "to_user_id": "2", "whisper": {} }),
        );
        assert!(matches!(parse(missing_text), Err(ProtocolError::Malformed(_))));

        let no_event = notification_frame("channel.chat.message", Value::Null);
        assert_eq!(
            parse(no_event),
            Err(ProtocolError::MissingField {
                field: "event",
                context: "channel.chat.message".into()
            })
        );
    }
}
