//! Session admission: authenticators run before a session is registered.
//!
//! Authenticators are consulted in order. The first [`AuthAction::Ok`]
//! admits the session, the first [`AuthAction::Ko`] or error rejects it,
//! and [`AuthAction::Continue`] defers to the next one. A chain that only
//! continues admits the session.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::GatewayError;
use crate::session::Session;

/// Verdict of one authenticator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthAction {
    /// Admit the session without consulting later authenticators.
    Ok,
    /// Reject the session.
    Ko,
    /// No opinion.
    Continue,
}

/// Decides whether a session may start.
#[async_trait]
pub trait SessionAuthenticator: Send + Sync + fmt::Debug {
    /// Inspects the session (token, claims, headers, remote address).
    async fn authenticate_session(&self, session: &Session) -> Result<AuthAction, GatewayError>;
}

/// Runs the authenticator chain against `session`.
///
/// # Errors
///
/// Returns [`GatewayError::Unauthorized`] on a [`AuthAction::Ko`] verdict.
/// An authenticator error is returned as is when it is already an
/// admission error, and as [`GatewayError::Unauthorized`] otherwise.
pub async fn authenticate(
    authenticators: &[Arc<dyn SessionAuthenticator>],
    session: &Session,
) -> Result<(), GatewayError> {
    for authenticator in authenticators {
        match authenticator.authenticate_session(session).await {
            Ok(AuthAction::Ok) => return Ok(()),
            Ok(AuthAction::Continue) => {}
            Ok(AuthAction::Ko) => {
                tracing::info!(
                    session_id = %session.identifier(),
                    authenticator = ?authenticator,
                    "session rejected"
                );
                return Err(GatewayError::Unauthorized(
                    "session rejected by authenticator".to_string(),
                ));
            }
            Err(e @ (GatewayError::Unauthorized(_) | GatewayError::Forbidden(_))) => return Err(e),
            Err(e) => {
                tracing::warn!(session_id = %session.identifier(), error = %e, "authenticator failed");
                return Err(GatewayError::Unauthorized(e.to_string()));
            }
        }
    }
    Ok(())
}

/// Rejects sessions that carry no token.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokenRequired;

#[async_trait]
impl SessionAuthenticator for TokenRequired {
    async fn authenticate_session(&self, session: &Session) -> Result<AuthAction, GatewayError> {
        match session.token() {
            Some(token) if !token.is_empty() => Ok(AuthAction::Continue),
            _ => Ok(AuthAction::Ko),
        }
    }
}

type AuthFn = dyn Fn(&Session) -> Result<AuthAction, GatewayError> + Send + Sync;

/// Authenticator backed by a closure.
pub struct FnAuthenticator {
    name: &'static str,
    func: Box<AuthFn>,
}

impl FnAuthenticator {
    /// Wraps `func` under a name used in logs.
    pub fn new<F>(name: &'static str, func: F) -> Self
    where
        F: Fn(&Session) -> Result<AuthAction, GatewayError> + Send + Sync + 'static,
    {
        Self {
            name,
            func: Box::new(func),
        }
    }
}

impl fmt::Debug for FnAuthenticator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnAuthenticator")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl SessionAuthenticator for FnAuthenticator {
    async fn authenticate_session(&self, session: &Session) -> Result<AuthAction, GatewayError> {
        (self.func)(session)
    }
}
