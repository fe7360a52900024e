//! How to reach the backing key-value/pub-sub store.
//!
//! A [`StoreDescriptor`] is immutable. [`StoreDescriptor::make_client`]
//! turns it into a [`StoreClient`] for the selected mode without touching
//! the network; readiness is checked by the caller with
//! [`StoreClient::ping`].

use std::fmt;

use redis::{ConnectionAddr, ConnectionInfo, RedisConnectionInfo};

use super::client::StoreClient;
use crate::error::GatewayError;

/// High-availability topology selected by a non-empty cluster name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HaTopology {
    /// Sentinel-guarded master; the name is the sentinel master name.
    Sentinel,
    /// Cluster; the database index does not apply.
    Cluster,
}

/// Connection description for the backing store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreDescriptor {
    addresses: Vec<String>,
    password: String,
    database: i64,
    cluster_name: String,
    topology: HaTopology,
}

impl StoreDescriptor {
    /// Describes a standalone store, or a sentinel-guarded one when
    /// `cluster_name` is not empty.
    ///
    /// `addresses` must not be empty; [`Self::make_client`] rejects an
    /// empty list. An empty `password` means no authentication.
    #[must_use]
    pub fn new(
        addresses: Vec<String>,
        password: impl Into<String>,
        database: i64,
        cluster_name: impl Into<String>,
    ) -> Self {
        Self {
            addresses,
            password: password.into(),
            database,
            cluster_name: cluster_name.into(),
            topology: HaTopology::Sentinel,
        }
    }

    /// Describes a store cluster reachable through any of `addresses`.
    #[must_use]
    pub fn cluster(
        addresses: Vec<String>,
        password: impl Into<String>,
        cluster_name: impl Into<String>,
    ) -> Self {
        Self {
            topology: HaTopology::Cluster,
            ..Self::new(addresses, password, 0, cluster_name)
        }
    }

    /// Returns the configured endpoints.
    #[must_use]
    pub fn addresses(&self) -> &[String] {
        &self.addresses
    }

    /// Returns the credential, if one is set.
    #[must_use]
    pub fn password(&self) -> Option<&str> {
        Some(self.password.as_str()).filter(|p| !p.is_empty())
    }

    /// Returns the logical database index.
    #[must_use]
    pub fn database(&self) -> i64 {
        self.database
    }

    /// Returns the cluster or sentinel group name (empty in standalone mode).
    #[must_use]
    pub fn cluster_name(&self) -> &str {
        &self.cluster_name
    }

    /// Returns `true` when a cluster or sentinel name is set.
    #[must_use]
    pub fn is_high_availability_mode(&self) -> bool {
        !self.cluster_name.is_empty()
    }

    /// Returns the high-availability topology, `None` in standalone mode.
    #[must_use]
    pub fn topology(&self) -> Option<HaTopology> {
        self.is_high_availability_mode().then_some(self.topology)
    }

    /// Builds a client for the descriptor's mode.
    ///
    /// No connection is attempted here. Call [`StoreClient::ping`] with a
    /// deadline before relying on the client.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::InvalidStoreAddress`] if the address list is
    /// empty or an address is not `host:port`, and [`GatewayError::Store`]
    /// if the client library rejects the configuration.
    pub fn make_client(&self) -> Result<StoreClient, GatewayError> {
        if self.addresses.is_empty() {
            return Err(GatewayError::InvalidStoreAddress(
                "no store address configured".to_string(),
            ));
        }

        let client = match self.topology() {
            None => StoreClient::standalone(self, self.node_info(0)?)?,
            Some(HaTopology::Sentinel) => {
                let sentinels = self
                    .addresses
                    .iter()
                    .map(|addr| {
                        Ok(ConnectionInfo {
                            addr: parse_address(addr)?,
                            redis: RedisConnectionInfo::default(),
                        })
                    })
                    .collect::<Result<Vec<_>, GatewayError>>()?;
                StoreClient::sentinel(self, sentinels, self.redis_info(self.database))?
            }
            Some(HaTopology::Cluster) => {
                let nodes = (0..self.addresses.len())
                    .map(|i| self.node_info(i))
                    .collect::<Result<Vec<_>, GatewayError>>()?;
                StoreClient::cluster(self, nodes)?
            }
        };

        tracing::info!(store = %self, mode = %client.mode(), "store client created");
        Ok(client)
    }

    /// Connection info for the `index`-th address, with credentials.
    fn node_info(&self, index: usize) -> Result<ConnectionInfo, GatewayError> {
        let addr = self.addresses.get(index).ok_or_else(|| {
            GatewayError::InvalidStoreAddress("no store address configured".to_string())
        })?;
        let database = match self.topology() {
            Some(HaTopology::Cluster) => 0,
            _ => self.database,
        };
        Ok(ConnectionInfo {
            addr: parse_address(addr)?,
            redis: self.redis_info(database),
        })
    }

    fn redis_info(&self, database: i64) -> RedisConnectionInfo {
        RedisConnectionInfo {
            db: database,
            password: self.password().map(str::to_string),
            ..RedisConnectionInfo::default()
        }
    }
}

impl fmt::Display for StoreDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_high_availability_mode() {
            return write!(
                f,
                "<store clusterName: {} addresses: [{}] db: {}>",
                self.cluster_name,
                self.addresses.join(" "),
                self.database
            );
        }
        let address = self.addresses.first().map_or("", String::as_str);
        write!(f, "<store address: {} db: {}>", address, self.database)
    }
}

/// Parses `host:port`, `[v6]:port` or `redis://host:port` into a TCP address.
fn parse_address(addr: &str) -> Result<ConnectionAddr, GatewayError> {
    let invalid = || GatewayError::InvalidStoreAddress(addr.to_string());
    let bare = addr.strip_prefix("redis://").unwrap_or(addr);
    let (host, port) = bare.rsplit_once(':').ok_or_else(invalid)?;
    let host = host.trim_start_matches('[').trim_end_matches(']');
    if host.is_empty() {
        return Err(invalid());
    }
    let port: u16 = port.parse().map_err(|_| invalid())?;
    Ok(ConnectionAddr::Tcp(host.to_string(), port))
}
