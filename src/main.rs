//! push-gateway server entry point.
//!
//! Starts the Axum HTTP server with the WebSocket push endpoint and, when a
//! store is configured, the backplane subscriber.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use push_gateway::api;
use push_gateway::app_state::AppState;
use push_gateway::config::GatewayConfig;
use push_gateway::domain::{EventBus, SessionRegistry};
use push_gateway::service::{Fanout, deliver_events};
use push_gateway::store::Backplane;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let config = Arc::new(GatewayConfig::from_env()?);
    tracing::info!(addr = %config.listen_addr, "starting push-gateway");

    let shutdown = CancellationToken::new();
    let registry = Arc::new(SessionRegistry::new());
    let event_bus = EventBus::new(config.event_bus_capacity);

    // Subscribe before anything can publish.
    tokio::spawn(deliver_events(
        event_bus.subscribe(),
        Arc::clone(&registry),
        shutdown.clone(),
    ));

    let (fanout, store) = match config.store_descriptor() {
        Some(descriptor) => {
            let client = Arc::new(descriptor.make_client()?.with_timeout(config.store_timeout()));
            if let Err(e) = client.ping(config.store_ping_timeout()).await {
                tracing::error!(store = %descriptor, error = %e, "store not reachable");
            }
            let backplane = Backplane::new(Arc::clone(&client), config.store_channel.clone());
            tokio::spawn(backplane.clone().run(event_bus.clone(), shutdown.clone()));
            (Fanout::distributed(event_bus, backplane), Some(client))
        }
        None => {
            tracing::info!("no store configured, fan-out is process-local");
            (Fanout::local(event_bus), None)
        }
    };

    let app_state = AppState::new(Arc::clone(&config), Arc::clone(&registry), fanout, store);

    let app = api::build_router(&config.push_endpoint)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(app_state);

    let listener = tokio::net::TcpListener::bind(config.listen_addr).await?;
    tracing::info!(
        addr = %config.listen_addr,
        endpoint = %config.push_endpoint,
        "server listening"
    );

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
    .await?;

    let stopped = registry.stop_all();
    shutdown.cancel();
    tracing::info!(sessions = stopped, "server stopped");

    Ok(())
}

/// Installs the global subscriber. `LOG_FORMAT=json` switches to JSON lines.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));
    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

/// Resolves on Ctrl-C and cancels the background tasks.
async fn shutdown_signal(shutdown: CancellationToken) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "unable to listen for shutdown signal");
        shutdown.cancelled().await;
    }
    tracing::info!("shutdown requested");
    shutdown.cancel();
}
