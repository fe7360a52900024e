//! WebSocket message types: envelope, commands, and events.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::PushEvent;

/// Top-level WebSocket message envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WsMessage {
    /// Client-provided ID for requests; event ID for pushed events.
    pub id: String,
    /// Message type discriminator.
    #[serde(rename = "type")]
    pub msg_type: WsMessageType,
    /// ISO-8601 timestamp.
    pub timestamp: DateTime<Utc>,
    /// Variant-specific payload.
    pub payload: serde_json::Value,
}

impl WsMessage {
    /// Wraps a pushed event. The envelope carries the event's ID and
    /// timestamp.
    #[must_use]
    pub fn event(event: &PushEvent) -> Self {
        Self {
            id: event.id.to_string(),
            msg_type: WsMessageType::Event,
            timestamp: event.timestamp,
            payload: event.payload.clone(),
        }
    }

    /// Builds the response to the command with `id`.
    #[must_use]
    pub fn response(id: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            id: id.into(),
            msg_type: WsMessageType::Response,
            timestamp: Utc::now(),
            payload,
        }
    }

    /// Builds an error reply with an HTTP-like `code`.
    #[must_use]
    pub fn error(id: impl Into<String>, code: u16, message: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            msg_type: WsMessageType::Error,
            timestamp: Utc::now(),
            payload: serde_json::json!({
                "code": code,
                "message": message.into(),
            }),
        }
    }

    /// Serializes the envelope.
    #[must_use]
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// Discriminator for WebSocket message types.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum WsMessageType {
    /// Client → Server command.
    Command,
    /// Server → Client response to a command.
    Response,
    /// Server → Client pushed event.
    Event,
    /// Server → Client error.
    Error,
}

/// Commands that a client can send over WebSocket, read from the
/// envelope payload.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum WsCommand {
    /// Push `data` to one session, or to every session when `target` is
    /// absent or null.
    Publish {
        /// Target session ID.
        #[serde(default)]
        target: Option<String>,
        /// Event kind, matched by recipients' push filters.
        #[serde(default)]
        kind: Option<String>,
        /// Event payload delivered to the recipients.
        #[serde(default)]
        data: serde_json::Value,
    },
    /// Restrict pushed events to the given kinds. Absent or null kinds
    /// remove the filter.
    Filter {
        /// Accepted event kinds.
        #[serde(default)]
        kinds: Option<Vec<String>>,
    },
    /// Ask for the session's identifier and claims.
    Identify,
}

#[cfg(test)]
#[allow(clippy::panic, clippy::indexing_slicing)]
mod tests {
    use super::*;

    #[test]
    fn event_envelope_carries_event_identity() {
        let event = PushEvent::broadcast(serde_json::json!({"k": "v"}));
        let msg = WsMessage::event(&event);
        assert_eq!(msg.msg_type, WsMessageType::Event);
        assert_eq!(msg.id, event.id.to_string());
        assert_eq!(msg.timestamp, event.timestamp);

        let Ok(json) = serde_json::to_value(&msg) else {
            panic!("encode failed");
        };
        assert_eq!(json["type"], "event");
        assert_eq!(json["payload"]["k"], "v");
    }

    #[test]
    fn error_envelope_shape() {
        let Ok(json) = serde_json::from_str::<serde_json::Value>(
            &WsMessage::error("c1", 404, "unknown command").to_json(),
        ) else {
            panic!("decode failed");
        };
        assert_eq!(json["id"], "c1");
        assert_eq!(json["type"], "error");
        assert_eq!(json["payload"]["code"], 404);
        assert_eq!(json["payload"]["message"], "unknown command");
    }

    #[test]
    fn commands_parse_from_payload() {
        let publish = serde_json::json!({"command": "publish", "data": {"x": 1}});
        let Ok(WsCommand::Publish { target, kind, data }) = serde_json::from_value(publish) else {
            panic!("publish did not parse");
        };
        assert!(target.is_none());
        assert!(kind.is_none());
        assert_eq!(data["x"], 1);

        let filter = serde_json::json!({"command": "filter", "kinds": ["chat"]});
        let Ok(WsCommand::Filter { kinds: Some(kinds) }) = serde_json::from_value(filter) else {
            panic!("filter did not parse");
        };
        assert_eq!(kinds, ["chat"]);
        assert!(matches!(
            serde_json::from_value::<WsCommand>(serde_json::json!({"command": "filter"})),
            Ok(WsCommand::Filter { kinds: None })
        ));

        let identify = serde_json::json!({"command": "identify"});
        assert!(matches!(
            serde_json::from_value::<WsCommand>(identify),
            Ok(WsCommand::Identify)
        ));

        let unknown = serde_json::json!({"command": "subscribe"});
        assert!(serde_json::from_value::<WsCommand>(unknown).is_err());
    }
}
