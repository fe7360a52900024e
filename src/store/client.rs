//! Mode-aware backing store client.
//!
//! [`StoreClient`] hides whether the store is a single node, a
//! sentinel-guarded master or a cluster behind one surface: `ping`,
//! `publish`, `subscribe`, `get` and `set`. Connections are opened on
//! first use and shared afterwards; an I/O failure or a timeout drops the
//! shared connection so the next call reconnects (and, behind sentinels,
//! re-resolves the current master). Every operation, connection setup
//! included, is bounded by a deadline.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use redis::aio::{MultiplexedConnection, PubSub};
use redis::cluster::ClusterClient;
use redis::cluster_async::ClusterConnection;
use redis::sentinel::{Sentinel, SentinelNodeConnectionInfo};
use redis::{AsyncCommands, ConnectionInfo, RedisConnectionInfo, RedisResult};
use tokio::sync::Mutex;

/// Deadline of store operations unless [`StoreClient::with_timeout`] says
/// otherwise.
pub const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_secs(5);

use super::descriptor::StoreDescriptor;
use crate::error::GatewayError;

/// Connection strategy of a [`StoreClient`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreMode {
    /// Direct connection to one node.
    Standalone,
    /// Master resolved through sentinels.
    Sentinel,
    /// Cluster-aware routing.
    Cluster,
}

impl StoreMode {
    /// Returns the lowercase name of the mode.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Standalone => "standalone",
            Self::Sentinel => "sentinel",
            Self::Cluster => "cluster",
        }
    }
}

impl fmt::Display for StoreMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

enum Strategy {
    Standalone(redis::Client),
    Sentinel {
        sentinel: Mutex<Sentinel>,
        master: String,
        node: SentinelNodeConnectionInfo,
    },
    Cluster {
        client: ClusterClient,
        // PUBLISH is propagated cluster-wide, so one node is enough to
        // subscribe.
        subscriber: redis::Client,
    },
}

#[derive(Clone)]
enum StoreConnection {
    Single(MultiplexedConnection),
    Cluster(ClusterConnection),
}

/// Client for the backing store, built by
/// [`StoreDescriptor::make_client`].
pub struct StoreClient {
    strategy: Strategy,
    label: String,
    timeout: Duration,
    connection: parking_lot::Mutex<Option<StoreConnection>>,
}

impl StoreClient {
    pub(super) fn standalone(
        descriptor: &StoreDescriptor,
        node: ConnectionInfo,
    ) -> Result<Self, GatewayError> {
        let client = redis::Client::open(node)?;
        Ok(Self::with_strategy(descriptor, Strategy::Standalone(client)))
    }

    pub(super) fn sentinel(
        descriptor: &StoreDescriptor,
        sentinels: Vec<ConnectionInfo>,
        master: RedisConnectionInfo,
    ) -> Result<Self, GatewayError> {
        let sentinel = Sentinel::build(sentinels)?;
        let node = SentinelNodeConnectionInfo {
            redis_connection_info: Some(master),
            ..SentinelNodeConnectionInfo::default()
        };
        Ok(Self::with_strategy(
            descriptor,
            Strategy::Sentinel {
                sentinel: Mutex::new(sentinel),
                master: descriptor.cluster_name().to_string(),
                node,
            },
        ))
    }

    pub(super) fn cluster(
        descriptor: &StoreDescriptor,
        nodes: Vec<ConnectionInfo>,
    ) -> Result<Self, GatewayError> {
        let first = nodes.first().cloned().ok_or_else(|| {
            GatewayError::InvalidStoreAddress("no store address configured".to_string())
        })?;
        let mut builder = ClusterClient::builder(nodes);
        if let Some(password) = descriptor.password() {
            builder = builder.password(password.to_string());
        }
        let client = builder.build()?;
        let subscriber = redis::Client::open(first)?;
        Ok(Self::with_strategy(
            descriptor,
            Strategy::Cluster { client, subscriber },
        ))
    }

    fn with_strategy(descriptor: &StoreDescriptor, strategy: Strategy) -> Self {
        Self {
            strategy,
            label: descriptor.to_string(),
            timeout: DEFAULT_STORE_TIMEOUT,
            connection: parking_lot::Mutex::new(None),
        }
    }

    /// Sets the deadline for connection setup and each command.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Returns the deadline for connection setup and each command.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Returns the connection strategy.
    #[must_use]
    pub fn mode(&self) -> StoreMode {
        match self.strategy {
            Strategy::Standalone(_) => StoreMode::Standalone,
            Strategy::Sentinel { .. } => StoreMode::Sentinel,
            Strategy::Cluster { .. } => StoreMode::Cluster,
        }
    }

    /// Round-trips a `PING`, connecting first if needed.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::StoreTimeout`] when `timeout` elapses and
    /// [`GatewayError::Store`] when the store answers with an error or
    /// cannot be reached.
    pub async fn ping(&self, timeout: Duration) -> Result<(), GatewayError> {
        self.bounded(timeout, async {
            let mut conn = self.connection().await?;
            let result: RedisResult<String> = match &mut conn {
                StoreConnection::Single(c) => redis::cmd("PING").query_async(c).await,
                StoreConnection::Cluster(c) => redis::cmd("PING").query_async(c).await,
            };
            self.settle(result).map(|_| ())
        })
        .await
    }

    /// Publishes `payload` on `channel`. Returns the number of subscribers
    /// that received it (on the node that served the command).
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Store`] on connection or command failure and
    /// [`GatewayError::StoreTimeout`] past the client deadline.
    pub async fn publish(&self, channel: &str, payload: &str) -> Result<usize, GatewayError> {
        self.bounded(self.timeout, async {
            let mut conn = self.connection().await?;
            let result: RedisResult<usize> = match &mut conn {
                StoreConnection::Single(c) => c.publish(channel, payload).await,
                StoreConnection::Cluster(c) => c.publish(channel, payload).await,
            };
            self.settle(result)
        })
        .await
    }

    /// Opens a dedicated pub/sub connection subscribed to `channel`.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Store`] if the connection or the
    /// subscription fails and [`GatewayError::StoreTimeout`] past the
    /// client deadline.
    pub async fn subscribe(&self, channel: &str) -> Result<PubSub, GatewayError> {
        self.bounded(self.timeout, async {
            let client = match &self.strategy {
                Strategy::Standalone(client) => client.clone(),
                Strategy::Sentinel {
                    sentinel,
                    master,
                    node,
                } => sentinel
                    .lock()
                    .await
                    .async_master_for(master, Some(node))
                    .await?,
                Strategy::Cluster { subscriber, .. } => subscriber.clone(),
            };
            let mut pubsub = client.get_async_pubsub().await?;
            pubsub.subscribe(channel).await?;
            Ok(pubsub)
        })
        .await
    }

    /// Reads a string value.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Store`] on connection or command failure and
    /// [`GatewayError::StoreTimeout`] past the client deadline.
    pub async fn get(&self, key: &str) -> Result<Option<String>, GatewayError> {
        self.bounded(self.timeout, async {
            let mut conn = self.connection().await?;
            let result: RedisResult<Option<String>> = match &mut conn {
                StoreConnection::Single(c) => c.get(key).await,
                StoreConnection::Cluster(c) => c.get(key).await,
            };
            self.settle(result)
        })
        .await
    }

    /// Writes a string value.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Store`] on connection or command failure and
    /// [`GatewayError::StoreTimeout`] past the client deadline.
    pub async fn set(&self, key: &str, value: &str) -> Result<(), GatewayError> {
        self.bounded(self.timeout, async {
            let mut conn = self.connection().await?;
            let result: RedisResult<()> = match &mut conn {
                StoreConnection::Single(c) => c.set(key, value).await,
                StoreConnection::Cluster(c) => c.set(key, value).await,
            };
            self.settle(result)
        })
        .await
    }

    /// Runs `op` under `timeout`. A timed out operation drops the shared
    /// connection.
    async fn bounded<T>(
        &self,
        timeout: Duration,
        op: impl Future<Output = Result<T, GatewayError>>,
    ) -> Result<T, GatewayError> {
        match tokio::time::timeout(timeout, op).await {
            Ok(result) => result,
            Err(_) => {
                self.connection.lock().take();
                tracing::warn!(store = %self.label, ?timeout, "store operation timed out");
                Err(GatewayError::StoreTimeout(timeout))
            }
        }
    }

    /// Returns the shared connection, opening one if needed. The cache lock
    /// is not held while connecting; when two callers race, the first
    /// connection stored wins.
    async fn connection(&self) -> Result<StoreConnection, GatewayError> {
        let cached = self.connection.lock().clone();
        if let Some(conn) = cached {
            return Ok(conn);
        }
        let conn = self.connect().await?;
        let mut cached = self.connection.lock();
        if let Some(existing) = cached.as_ref() {
            return Ok(existing.clone());
        }
        *cached = Some(conn.clone());
        drop(cached);
        tracing::debug!(store = %self.label, "store connection established");
        Ok(conn)
    }

    async fn connect(&self) -> Result<StoreConnection, GatewayError> {
        let conn = match &self.strategy {
            Strategy::Standalone(client) => {
                StoreConnection::Single(client.get_multiplexed_async_connection().await?)
            }
            Strategy::Sentinel {
                sentinel,
                master,
                node,
            } => {
                let client = sentinel
                    .lock()
                    .await
                    .async_master_for(master, Some(node))
                    .await?;
                StoreConnection::Single(client.get_multiplexed_async_connection().await?)
            }
            Strategy::Cluster { client, .. } => {
                StoreConnection::Cluster(client.get_async_connection().await?)
            }
        };
        Ok(conn)
    }

    fn settle<T>(&self, result: RedisResult<T>) -> Result<T, GatewayError> {
        match result {
            Ok(value) => Ok(value),
            Err(e) => {
                if e.is_io_error() || e.is_connection_dropped() || e.is_connection_refusal() {
                    self.connection.lock().take();
                    tracing::warn!(store = %self.label, error = %e, "store connection dropped");
                }
                Err(e.into())
            }
        }
    }
}

impl fmt::Debug for StoreClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreClient")
            .field("mode", &self.mode())
            .field("store", &self.label)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}
