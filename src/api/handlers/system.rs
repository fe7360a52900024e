//! System endpoints: health check.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;
use serde::Serialize;

use crate::app_state::AppState;

/// Backing store status reported by `/health`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreHealth {
    /// No store configured; fan-out is process-local.
    Disabled,
    /// The store answered a ping within the configured deadline.
    Reachable,
    /// The ping failed or timed out.
    Unreachable,
}

/// Health check response.
#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    timestamp: String,
    version: &'static str,
    sessions: usize,
    store: StoreHealth,
}

/// `GET /health`: service health status.
///
/// Answers `503` with status `degraded` when a configured store cannot be
/// reached.
pub async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let store = match &state.store {
        None => StoreHealth::Disabled,
        Some(client) => match client.ping(state.config.store_ping_timeout()).await {
            Ok(()) => StoreHealth::Reachable,
            Err(e) => {
                tracing::warn!(error = %e, "store health check failed");
                StoreHealth::Unreachable
            }
        },
    };

    let (code, status) = match store {
        StoreHealth::Unreachable => (StatusCode::SERVICE_UNAVAILABLE, "degraded"),
        StoreHealth::Disabled | StoreHealth::Reachable => (StatusCode::OK, "healthy"),
    };

    (
        code,
        Json(HealthResponse {
            status,
            timestamp: Utc::now().to_rfc3339(),
            version: env!("CARGO_PKG_VERSION"),
            sessions: state.registry.len(),
            store,
        }),
    )
}

/// System routes mounted at the root level.
pub fn routes() -> Router<AppState> {
    Router::new().route("/health", get(health_handler))
}
