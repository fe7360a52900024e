//! HTTP surface: route handlers and router composition.
//!
//! The WebSocket push endpoint is mounted at the configured path; system
//! endpoints live at the root.

pub mod handlers;

use axum::Router;
use axum::routing::get;

use crate::app_state::AppState;
use crate::ws::handler::push_handler;

/// Builds the complete router with the push endpoint at `push_endpoint`.
pub fn build_router(push_endpoint: &str) -> Router<AppState> {
    Router::new()
        .route(push_endpoint, get(push_handler))
        .merge(handlers::system::routes())
}
