//! Axum WebSocket upgrade handler for the push endpoint.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::ws::{WebSocket, WebSocketUpgrade};
use axum::extract::{ConnectInfo, State};
use axum::http::{HeaderMap, Uri};
use axum::response::{IntoResponse, Response};
use tracing::Span;

use super::auth::authenticate;
use super::dispatch::PushDispatcher;
use crate::app_state::AppState;
use crate::domain::SessionRegistry;
use crate::error::GatewayError;
use crate::session::{Session, UpgradeRequest, WsTransport, init_session};

/// `GET /events`: upgrades to a WebSocket push session.
///
/// The session is built, authenticated and passed to the registry's
/// [`crate::session::PushSessionHandler`] before the upgrade is accepted,
/// so rejected clients get a plain HTTP error.
///
/// # Errors
///
/// Returns [`GatewayError::Unauthorized`] when authentication fails,
/// [`GatewayError::Forbidden`] when the session handler refuses the
/// session, and [`GatewayError::IdentifierGeneration`] when no session
/// identifier can be drawn.
pub async fn push_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    uri: Uri,
) -> Result<Response, GatewayError> {
    let request = UpgradeRequest::new(Arc::new(headers), uri, peer.to_string());
    let claims = request
        .token()
        .map(|token| state.claims.extract(&token))
        .unwrap_or_default();
    let forwarded_for = request.forwarded_for();

    let pending = PendingSession::new(Session::new(
        request.with_claims(claims),
        Arc::clone(&state.config),
        state.registry.unregister_callback(),
        &Span::current(),
    )?);
    let session = pending.session();

    if state.config.trust_proxy_headers
        && let Some(addr) = forwarded_for
    {
        session.set_remote_address(addr);
    }

    authenticate(&state.authenticators, session).await?;
    if let Some(handler) = state.registry.handler() {
        init_session(handler.as_ref(), session).await?;
    }

    let registry = Arc::clone(&state.registry);
    let dispatcher = Arc::clone(&state.dispatcher);
    Ok(ws
        .on_upgrade(move |socket| run_session(socket, pending.accept(), registry, dispatcher))
        .into_response())
}

/// A session that has not reached its receive loop yet.
///
/// Dropping it stops the session, so a rejected or abandoned upgrade
/// still cancels the session's lifetime token.
struct PendingSession {
    session: Arc<Session>,
    armed: bool,
}

impl PendingSession {
    fn new(session: Session) -> Self {
        Self {
            session: Arc::new(session),
            armed: true,
        }
    }

    fn session(&self) -> &Session {
        &self.session
    }

    /// Hands the session over to its receive loop.
    fn accept(mut self) -> Arc<Session> {
        self.armed = false;
        Arc::clone(&self.session)
    }
}

impl Drop for PendingSession {
    fn drop(&mut self) {
        if self.armed {
            tracing::debug!(parent: self.session.span(), "upgrade abandoned");
            self.session.stop();
        }
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use axum::http::HeaderMap;

    use super::*;
    use crate::config::GatewayConfig;

    fn pending(registry: &Arc<SessionRegistry>) -> PendingSession {
        let request = UpgradeRequest::new(
            Arc::new(HeaderMap::new()),
            Uri::from_static("/events"),
            "10.0.0.1",
        );
        let Ok(session) = Session::new(
            request,
            Arc::new(GatewayConfig::default()),
            registry.unregister_callback(),
            &Span::none(),
        ) else {
            panic!("session construction failed");
        };
        PendingSession::new(session)
    }

    #[test]
    fn abandoned_upgrade_stops_the_session() {
        let registry = Arc::new(SessionRegistry::new());
        let pending = pending(&registry);
        let lifetime = pending.session().context();
        drop(pending);
        assert!(lifetime.is_cancelled());
    }

    #[test]
    fn accepted_session_stays_open() {
        let registry = Arc::new(SessionRegistry::new());
        let session = pending(&registry).accept();
        assert!(!session.is_closed());
        assert!(!session.context().is_cancelled());
    }
}
