//! Live session storage keyed by [`SessionId`].
//!
//! The registry is written from the synchronous unregister callback of a
//! stopping session, so it uses a blocking [`parking_lot::RwLock`]. The
//! lock is never held while a session is being stopped, nor while the
//! [`PushSessionHandler`] hooks run.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use parking_lot::RwLock;

use super::{PushEvent, SessionId};
use crate::error::GatewayError;
use crate::session::{PushSessionHandler, Session, UnregisterFn};

/// Central store for all live push sessions of this process.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<SessionId, Arc<Session>>>,
    handler: Option<Arc<dyn PushSessionHandler>>,
}

impl SessionRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty registry that reports to `handler`.
    #[must_use]
    pub fn with_handler(handler: Arc<dyn PushSessionHandler>) -> Self {
        Self {
            sessions: RwLock::default(),
            handler: Some(handler),
        }
    }

    /// Returns the lifecycle handler, if one is installed.
    #[must_use]
    pub fn handler(&self) -> Option<&Arc<dyn PushSessionHandler>> {
        self.handler.as_ref()
    }

    /// Adds a session.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::InvalidRequest`] if a session with the same
    /// identifier is already registered.
    pub fn register(&self, session: Arc<Session>) -> Result<SessionId, GatewayError> {
        let id = session.identifier();
        let mut map = self.sessions.write();
        if map.contains_key(&id) {
            return Err(GatewayError::InvalidRequest(format!(
                "session {id} already registered"
            )));
        }
        map.insert(id, Arc::clone(&session));
        drop(map);
        tracing::debug!(session_id = %id, "session registered");
        if let Some(handler) = &self.handler {
            handler.on_session_start(&session);
        }
        Ok(id)
    }

    /// Removes a session. Returns `false` if it was not registered, in
    /// which case the stop hook does not run.
    pub fn unregister(&self, session: &Session) -> bool {
        let id = session.identifier();
        let removed = self.sessions.write().remove(&id).is_some();
        if removed {
            tracing::debug!(session_id = %id, "session unregistered");
            if let Some(handler) = &self.handler {
                handler.on_session_stop(session);
            }
        }
        removed
    }

    /// Returns the callback sessions call when they stop.
    ///
    /// The callback holds a weak reference: sessions never keep the
    /// registry alive.
    #[must_use]
    pub fn unregister_callback(self: &Arc<Self>) -> UnregisterFn {
        let registry: Weak<Self> = Arc::downgrade(self);
        Arc::new(move |session: &Session| {
            if let Some(registry) = registry.upgrade() {
                registry.unregister(session);
            }
        })
    }

    /// Returns a live session.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::SessionNotFound`] if no such session exists.
    pub fn get(&self, id: SessionId) -> Result<Arc<Session>, GatewayError> {
        self.sessions
            .read()
            .get(&id)
            .cloned()
            .ok_or(GatewayError::SessionNotFound(id))
    }

    /// Returns the identifiers of all live sessions.
    #[must_use]
    pub fn ids(&self) -> Vec<SessionId> {
        self.sessions.read().keys().copied().collect()
    }

    /// Returns the number of live sessions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    /// Returns `true` if no session is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }

    /// Queues an event on its target session, or on every session when
    /// the event has no target. Returns how many sessions accepted it.
    pub fn deliver(&self, event: &PushEvent) -> usize {
        let recipients: Vec<Arc<Session>> = {
            let map = self.sessions.read();
            match event.target {
                Some(id) => map.get(&id).cloned().into_iter().collect(),
                None => map.values().cloned().collect(),
            }
        };
        let delivered = recipients
            .iter()
            .filter(|s| self.should_push(s, event) && s.push(event))
            .count();
        tracing::trace!(event_id = %event.id, delivered, "event delivered");
        delivered
    }

    fn should_push(&self, session: &Session, event: &PushEvent) -> bool {
        let Some(handler) = &self.handler else {
            return true;
        };
        match handler.should_push(session, event) {
            Ok(push) => push,
            Err(e) => {
                tracing::error!(
                    session_id = %session.identifier(),
                    event_id = %event.id,
                    error = %e,
                    "push hook failed"
                );
                false
            }
        }
    }

    /// Stops every live session. Returns how many were stopped.
    pub fn stop_all(&self) -> usize {
        let sessions: Vec<Arc<Session>> = self.sessions.read().values().cloned().collect();
        sessions.iter().filter(|s| s.stop()).count()
    }
}
