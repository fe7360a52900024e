//! Cross-process fan-out over the store's pub/sub channel.
//!
//! Every gateway process publishes [`PushEvent`]s to one channel and
//! subscribes to it. Received events are republished on the local
//! [`EventBus`], from where each process delivers to its own sessions.

use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use tokio_util::sync::CancellationToken;

use super::client::StoreClient;
use crate::domain::{EventBus, PushEvent};
use crate::error::GatewayError;

/// Delay before resubscribing after the subscription is lost.
const RESUBSCRIBE_DELAY: Duration = Duration::from_secs(1);

/// Publisher and subscriber for the fan-out channel.
#[derive(Debug, Clone)]
pub struct Backplane {
    client: Arc<StoreClient>,
    channel: String,
}

impl Backplane {
    /// Creates a backplane on `channel`.
    #[must_use]
    pub fn new(client: Arc<StoreClient>, channel: impl Into<String>) -> Self {
        Self {
            client,
            channel: channel.into(),
        }
    }

    /// Returns the fan-out channel name.
    #[must_use]
    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Returns the underlying store client.
    #[must_use]
    pub fn client(&self) -> &Arc<StoreClient> {
        &self.client
    }

    /// Publishes an event to every gateway process.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Serialization`] if the event cannot be
    /// encoded and [`GatewayError::Store`] if publishing fails.
    pub async fn publish(&self, event: &PushEvent) -> Result<usize, GatewayError> {
        let payload = serde_json::to_string(event)?;
        self.client.publish(&self.channel, &payload).await
    }

    /// Forwards channel messages onto `bus` until `shutdown` is cancelled.
    ///
    /// A lost subscription is re-established after a short delay.
    pub async fn run(self, bus: EventBus, shutdown: CancellationToken) {
        loop {
            match self.client.subscribe(&self.channel).await {
                Ok(mut pubsub) => {
                    tracing::info!(channel = %self.channel, "backplane subscribed");
                    let mut messages = pubsub.on_message();
                    loop {
                        tokio::select! {
                            () = shutdown.cancelled() => return,
                            message = messages.next() => match message {
                                Some(message) => match message.get_payload::<String>() {
                                    Ok(payload) => {
                                        forward(&payload, &bus);
                                    }
                                    Err(e) => {
                                        tracing::warn!(error = %e, "unreadable backplane payload");
                                    }
                                },
                                None => {
                                    tracing::warn!(channel = %self.channel, "backplane subscription lost");
                                    break;
                                }
                            },
                        }
                    }
                }
                Err(e) => {
                    tracing::error!(channel = %self.channel, error = %e, "backplane subscription failed");
                }
            }

            tokio::select! {
                () = shutdown.cancelled() => return,
                () = tokio::time::sleep(RESUBSCRIBE_DELAY) => {}
            }
        }
    }
}

/// Decodes one channel payload and republishes it locally.
///
/// Returns `false` for payloads that are not push events.
fn forward(payload: &str, bus: &EventBus) -> bool {
    match serde_json::from_str::<PushEvent>(payload) {
        Ok(event) => {
            bus.publish(event);
            true
        }
        Err(e) => {
            tracing::warn!(error = %e, "dropping malformed backplane message");
            false
        }
    }
}
