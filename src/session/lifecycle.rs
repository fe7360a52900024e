//! Application hooks around the life of a push session.
//!
//! A [`PushSessionHandler`] is installed on the
//! [`crate::domain::SessionRegistry`]. It vets a session right after
//! admission, is told when the session starts and stops, and decides which
//! events reach it.

use std::fmt;

use async_trait::async_trait;

use super::Session;
use crate::domain::PushEvent;
use crate::error::GatewayError;

/// Lifecycle and delivery hooks for push sessions.
///
/// Every method has a permissive default, so implementors only override
/// what they need.
#[async_trait]
pub trait PushSessionHandler: Send + Sync + fmt::Debug {
    /// Runs after authentication, before the upgrade is accepted.
    /// `Ok(false)` or an error refuses the session.
    async fn on_session_init(&self, _session: &Session) -> Result<bool, GatewayError> {
        Ok(true)
    }

    /// Runs once the session is registered.
    fn on_session_start(&self, _session: &Session) {}

    /// Runs once when a registered session is unregistered.
    ///
    /// Called while the session's close lock is held: it must not call
    /// [`Session::stop`] or [`Session::closed`] on the same session.
    fn on_session_stop(&self, _session: &Session) {}

    /// Decides whether `event` is pushed to `session`. An error skips the
    /// event for that session.
    fn should_push(&self, _session: &Session, _event: &PushEvent) -> Result<bool, GatewayError> {
        Ok(true)
    }
}

/// Runs [`PushSessionHandler::on_session_init`].
///
/// # Errors
///
/// Returns [`GatewayError::Forbidden`] when the handler refuses the session
/// or fails.
pub async fn init_session(
    handler: &dyn PushSessionHandler,
    session: &Session,
) -> Result<(), GatewayError> {
    match handler.on_session_init(session).await {
        Ok(true) => Ok(()),
        Ok(false) => {
            tracing::info!(session_id = %session.identifier(), "session refused by handler");
            Err(GatewayError::Forbidden(
                "not allowed to start a push session".to_string(),
            ))
        }
        Err(e) => {
            tracing::warn!(session_id = %session.identifier(), error = %e, "session init failed");
            Err(GatewayError::Forbidden(e.to_string()))
        }
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use std::sync::Arc;

    use axum::http::{HeaderMap, Uri};
    use tracing::Span;

    use super::*;
    use crate::config::GatewayConfig;
    use crate::session::UpgradeRequest;

    #[derive(Debug)]
    struct Permissive;

    impl PushSessionHandler for Permissive {}

    #[derive(Debug)]
    struct AdminsOnly;

    #[async_trait]
    impl PushSessionHandler for AdminsOnly {
        async fn on_session_init(&self, session: &Session) -> Result<bool, GatewayError> {
            match session.claims_map().get("role").map(String::as_str) {
                Some("admin") => Ok(true),
                Some(_) => Ok(false),
                None => Err(GatewayError::Internal("claims unavailable".to_string())),
            }
        }
    }

    fn session(claims: &[&str]) -> Session {
        let request = UpgradeRequest::new(
            Arc::new(HeaderMap::new()),
            Uri::from_static("/events"),
            "10.0.0.1",
        )
        .with_claims(claims.iter().map(|c| (*c).to_string()).collect());
        let Ok(session) = Session::new(
            request,
            Arc::new(GatewayConfig::default()),
            Arc::new(|_: &Session| {}),
            &Span::none(),
        ) else {
            panic!("session construction failed");
        };
        session
    }

    #[tokio::test]
    async fn default_hooks_accept_everything() {
        let session = session(&[]);
        assert!(init_session(&Permissive, &session).await.is_ok());
        let event = PushEvent::broadcast(serde_json::Value::Null);
        assert!(matches!(Permissive.should_push(&session, &event), Ok(true)));
    }

    #[tokio::test]
    async fn refusal_and_failure_are_forbidden() {
        assert!(init_session(&AdminsOnly, &session(&["role=admin"])).await.is_ok());
        assert!(matches!(
            init_session(&AdminsOnly, &session(&["role=guest"])).await,
            Err(GatewayError::Forbidden(_))
        ));
        let Err(GatewayError::Forbidden(reason)) = init_session(&AdminsOnly, &session(&[])).await
        else {
            panic!("handler failure must be forbidden");
        };
        assert!(reason.contains("claims unavailable"));
    }
}
