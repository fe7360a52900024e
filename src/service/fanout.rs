//! Event fan-out: from publishers to every session that should see it.
//!
//! Publishers hand events to [`Fanout`]. With a store configured the event
//! goes to the backplane channel and comes back to every process
//! (including this one) through its subscriber; otherwise it goes straight
//! onto the local [`EventBus`]. A [`PublishHandler`] may veto events
//! before they leave. [`deliver_events`] drains the bus into the
//! [`SessionRegistry`].

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::domain::{EventBus, PushEvent, SessionRegistry};
use crate::error::GatewayError;
use crate::store::Backplane;

/// Attempts made to hand an event to the backplane.
const PUBLISH_ATTEMPTS: usize = 3;

/// Decides whether an event may be published at all.
pub trait PublishHandler: Send + Sync + fmt::Debug {
    /// Returns `Ok(false)` to drop `event` silently.
    ///
    /// # Errors
    ///
    /// An error drops the event and is reported to the publisher.
    fn should_publish(&self, event: &PushEvent) -> Result<bool, GatewayError>;
}

/// Entry point for publishing [`PushEvent`]s.
#[derive(Debug, Clone)]
pub struct Fanout {
    bus: EventBus,
    backplane: Option<Backplane>,
    publish_handler: Option<Arc<dyn PublishHandler>>,
}

impl Fanout {
    /// Creates a single-process fan-out.
    #[must_use]
    pub fn local(bus: EventBus) -> Self {
        Self {
            bus,
            backplane: None,
            publish_handler: None,
        }
    }

    /// Creates a fan-out that routes every event through `backplane`.
    #[must_use]
    pub fn distributed(bus: EventBus, backplane: Backplane) -> Self {
        Self {
            bus,
            backplane: Some(backplane),
            publish_handler: None,
        }
    }

    /// Installs the handler consulted before every publication.
    #[must_use]
    pub fn with_publish_handler(mut self, handler: Arc<dyn PublishHandler>) -> Self {
        self.publish_handler = Some(handler);
        self
    }

    /// Returns the local event bus.
    #[must_use]
    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    /// Returns the backplane, if one is configured.
    #[must_use]
    pub fn backplane(&self) -> Option<&Backplane> {
        self.backplane.as_ref()
    }

    /// Publishes an event. Returns `false` if the publish handler
    /// dropped it.
    ///
    /// Backplane publication is attempted up to three times.
    ///
    /// # Errors
    ///
    /// Returns the publish handler's error, or the last store error once
    /// every backplane attempt failed. Local publishing never fails.
    pub async fn publish(&self, event: PushEvent) -> Result<bool, GatewayError> {
        if let Some(handler) = &self.publish_handler {
            match handler.should_publish(&event) {
                Ok(true) => {}
                Ok(false) => {
                    tracing::debug!(event_id = %event.id, "event dropped by publish handler");
                    return Ok(false);
                }
                Err(e) => {
                    tracing::error!(event_id = %event.id, error = %e, "publish handler failed");
                    return Err(e);
                }
            }
        }

        match &self.backplane {
            Some(backplane) => {
                let receivers =
                    with_attempts(PUBLISH_ATTEMPTS, || backplane.publish(&event)).await?;
                tracing::debug!(event_id = %event.id, receivers, "event sent to backplane");
            }
            None => {
                let receivers = self.bus.publish(event);
                tracing::debug!(receivers, "event published locally");
            }
        }
        Ok(true)
    }
}

/// Runs `op` until it succeeds or `attempts` runs are spent.
async fn with_attempts<T, F, Fut>(attempts: usize, mut op: F) -> Result<T, GatewayError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, GatewayError>>,
{
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if attempt < attempts => {
                tracing::warn!(attempt, error = %e, "publish attempt failed");
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Delivers bus events to registered sessions until `shutdown` is
/// cancelled or the bus closes.
pub async fn deliver_events(
    mut rx: broadcast::Receiver<PushEvent>,
    registry: Arc<SessionRegistry>,
    shutdown: CancellationToken,
) {
    loop {
        tokio::select! {
            () = shutdown.cancelled() => break,
            event = rx.recv() => match event {
                Ok(event) => {
                    registry.deliver(&event);
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!(lagged = n, "delivery task lagged behind event bus");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
        }
    }
    tracing::debug!("delivery task stopped");
}
