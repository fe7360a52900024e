//! Events fanned out to push sessions.
//!
//! A [`PushEvent`] is published through [`crate::service::Fanout`], travels
//! across processes on the store backplane, and is finally handed to the
//! [`super::SessionRegistry`] of every process for delivery.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::SessionId;

/// A payload addressed to one session or to every session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PushEvent {
    /// Event identifier, echoed to clients as the envelope id.
    pub id: uuid::Uuid,
    /// Target session. `None` broadcasts to all sessions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<SessionId>,
    /// Application-defined event kind, matched by session push filters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    /// Application payload, opaque to the gateway.
    pub payload: serde_json::Value,
    /// Publication timestamp.
    pub timestamp: DateTime<Utc>,
}

impl PushEvent {
    /// Creates an event addressed to a single session.
    #[must_use]
    pub fn directed(target: SessionId, payload: serde_json::Value) -> Self {
        Self::build(Some(target), payload)
    }

    /// Creates an event addressed to every live session.
    #[must_use]
    pub fn broadcast(payload: serde_json::Value) -> Self {
        Self::build(None, payload)
    }

    /// Sets the event kind.
    #[must_use]
    pub fn with_kind(mut self, kind: impl Into<String>) -> Self {
        self.kind = Some(kind.into());
        self
    }

    fn build(target: Option<SessionId>, payload: serde_json::Value) -> Self {
        Self {
            id: uuid::Uuid::new_v4(),
            target,
            kind: None,
            payload,
            timestamp: Utc::now(),
        }
    }
}
