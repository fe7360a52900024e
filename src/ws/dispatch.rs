//! Default handler for client messages.
//!
//! Clients publish events, set their push filter and ask who they are.

use async_trait::async_trait;

use super::messages::{WsCommand, WsMessage};
use crate::domain::{PushEvent, PushFilter, SessionId};
use crate::service::Fanout;
use crate::session::{MessageHandler, Session};

/// Routes `publish`, `filter` and `identify` commands.
#[derive(Debug, Clone)]
pub struct PushDispatcher {
    fanout: Fanout,
}

impl PushDispatcher {
    /// Creates a dispatcher publishing through `fanout`.
    #[must_use]
    pub fn new(fanout: Fanout) -> Self {
        Self { fanout }
    }

    async fn publish(
        &self,
        session: &Session,
        id: String,
        target: Option<String>,
        kind: Option<String>,
        data: serde_json::Value,
    ) -> WsMessage {
        let mut event = match target.as_deref() {
            Some(raw) => match raw.parse::<SessionId>() {
                Ok(target) => PushEvent::directed(target, data),
                Err(_) => return WsMessage::error(id, 400, format!("invalid target: {raw}")),
            },
            None => PushEvent::broadcast(data),
        };
        event.kind = kind;
        let event_id = event.id;
        let target = event.target;

        match self.fanout.publish(event).await {
            Ok(false) => WsMessage::error(id, 403, "publication refused"),
            Ok(true) => {
                tracing::debug!(
                    session_id = %session.identifier(),
                    %event_id,
                    "event published by client"
                );
                WsMessage::response(
                    id,
                    serde_json::json!({
                        "published": event_id,
                        "target": target,
                    }),
                )
            }
            Err(e) => {
                tracing::warn!(error = %e, "client publish failed");
                WsMessage::error(id, e.status_code().as_u16(), e.to_string())
            }
        }
    }
}

#[async_trait]
impl MessageHandler for PushDispatcher {
    async fn on_message(&self, session: &Session, text: &str) -> Option<String> {
        let Ok(msg) = serde_json::from_str::<WsMessage>(text) else {
            return Some(WsMessage::error("", 400, "malformed JSON").to_json());
        };

        let reply = match serde_json::from_value::<WsCommand>(msg.payload) {
            Ok(WsCommand::Publish { target, kind, data }) => {
                self.publish(session, msg.id, target, kind, data).await
            }
            Ok(WsCommand::Filter { kinds }) => {
                let filter = kinds.map(PushFilter::new);
                session.set_filter(filter.clone());
                tracing::debug!(session_id = %session.identifier(), ?filter, "push filter updated");
                WsMessage::response(msg.id, serde_json::json!({ "filter": filter }))
            }
            Ok(WsCommand::Identify) => WsMessage::response(
                msg.id,
                serde_json::json!({
                    "session_id": session.identifier(),
                    "claims": session.claims_map(),
                }),
            ),
            Err(_) => WsMessage::error(msg.id, 404, "unknown command"),
        };
        Some(reply.to_json())
    }
}
