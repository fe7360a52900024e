//! Shared application state injected into all Axum handlers.

use std::sync::Arc;

use crate::config::GatewayConfig;
use crate::domain::{ClaimsExtractor, OpaqueTokenClaims, SessionRegistry};
use crate::service::Fanout;
use crate::store::StoreClient;
use crate::ws::{PushDispatcher, SessionAuthenticator, TokenRequired};

/// Shared application state available to all handlers via Axum's
/// `State` extractor.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Configuration snapshot handed to every session.
    pub config: Arc<GatewayConfig>,
    /// Live sessions of this process.
    pub registry: Arc<SessionRegistry>,
    /// Event publishing entry point.
    pub fanout: Fanout,
    /// Backing store client, when one is configured.
    pub store: Option<Arc<StoreClient>>,
    /// Handler for client messages.
    pub dispatcher: Arc<PushDispatcher>,
    /// Admission chain, consulted in order.
    pub authenticators: Arc<[Arc<dyn SessionAuthenticator>]>,
    /// Turns the session token into claims.
    pub claims: Arc<dyn ClaimsExtractor>,
}

impl AppState {
    /// Assembles the state. `REQUIRE_TOKEN` installs [`TokenRequired`]
    /// as the first authenticator.
    #[must_use]
    pub fn new(
        config: Arc<GatewayConfig>,
        registry: Arc<SessionRegistry>,
        fanout: Fanout,
        store: Option<Arc<StoreClient>>,
    ) -> Self {
        let mut authenticators: Vec<Arc<dyn SessionAuthenticator>> = Vec::new();
        if config.require_token {
            authenticators.push(Arc::new(TokenRequired));
        }
        Self {
            dispatcher: Arc::new(PushDispatcher::new(fanout.clone())),
            config,
            registry,
            fanout,
            store,
            authenticators: authenticators.into(),
            claims: Arc::new(OpaqueTokenClaims),
        }
    }

    /// Appends an authenticator to the admission chain.
    #[must_use]
    pub fn with_authenticator(mut self, authenticator: Arc<dyn SessionAuthenticator>) -> Self {
        let mut chain = self.authenticators.to_vec();
        chain.push(authenticator);
        self.authenticators = chain.into();
        self
    }

    /// Replaces the claims extractor.
    #[must_use]
    pub fn with_claims_extractor(mut self, claims: Arc<dyn ClaimsExtractor>) -> Self {
        self.claims = claims;
        self
    }
}
