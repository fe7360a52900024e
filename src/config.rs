//! Gateway configuration loaded from environment variables.
//!
//! Follows 12-factor style: all settings come from environment variables
//! (or a `.env` file via `dotenvy`). [`GatewayConfig::default`] returns the
//! values used when a variable is not set.

use std::net::SocketAddr;
use std::time::Duration;

use crate::store::{HaTopology, StoreDescriptor};

/// Top-level gateway configuration.
///
/// Loaded once at startup via [`GatewayConfig::from_env`]. Every session
/// keeps a shared snapshot of it.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Socket address to bind the HTTP server to (e.g. `0.0.0.0:3000`).
    pub listen_addr: SocketAddr,

    /// Path of the WebSocket push endpoint.
    pub push_endpoint: String,

    /// Capacity of each session's outgoing event queue.
    pub outbox_capacity: usize,

    /// Capacity of the in-process EventBus broadcast channel.
    pub event_bus_capacity: usize,

    /// Take the client address from `X-Forwarded-For` when present.
    pub trust_proxy_headers: bool,

    /// Reject sessions that carry no token.
    pub require_token: bool,

    /// Backing store addresses (`host:port`). Empty disables the backplane.
    pub store_addresses: Vec<String>,

    /// Backing store password.
    pub store_password: Option<String>,

    /// Logical database index (standalone and sentinel modes).
    pub store_db: i64,

    /// Sentinel master name or cluster name. Empty selects standalone mode.
    pub store_cluster_name: String,

    /// Which high-availability topology a cluster name refers to.
    pub store_ha_topology: HaTopology,

    /// Pub/sub channel carrying fan-out events between processes.
    pub store_channel: String,

    /// Upper bound for store readiness checks, in milliseconds.
    pub store_ping_timeout_ms: u64,

    /// Upper bound for opening a store connection and for each store
    /// command, in milliseconds.
    pub store_timeout_ms: u64,

    /// How far an event's timestamp may lag behind a session's creation
    /// time before the event is considered stale for that session.
    pub clock_skew_tolerance_ms: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([0, 0, 0, 0], 3000)),
            push_endpoint: "/events".to_string(),
            outbox_capacity: 1024,
            event_bus_capacity: 10_000,
            trust_proxy_headers: false,
            require_token: false,
            store_addresses: Vec::new(),
            store_password: None,
            store_db: 0,
            store_cluster_name: String::new(),
            store_ha_topology: HaTopology::Sentinel,
            store_channel: "push-events".to_string(),
            store_ping_timeout_ms: 2000,
            store_timeout_ms: 5000,
            clock_skew_tolerance_ms: 2000,
        }
    }
}

impl GatewayConfig {
    /// Loads configuration from environment variables.
    ///
    /// Falls back to the [`Default`] values when a variable is not set.
    /// Calls `dotenvy::dotenv().ok()` to optionally load a `.env` file.
    ///
    /// # Errors
    ///
    /// Returns an error if `LISTEN_ADDR` is set but cannot be parsed as
    /// a [`SocketAddr`].
    pub fn from_env() -> Result<Self, Box<dyn std::error::Error>> {
        dotenvy::dotenv().ok();
        let defaults = Self::default();

        let listen_addr: SocketAddr = match std::env::var("LISTEN_ADDR") {
            Ok(v) => v.parse()?,
            Err(_) => defaults.listen_addr,
        };

        let store_ha_topology = match std::env::var("STORE_HA_MODE").ok().as_deref() {
            Some("cluster") | Some("CLUSTER") => HaTopology::Cluster,
            _ => HaTopology::Sentinel,
        };

        Ok(Self {
            listen_addr,
            push_endpoint: std::env::var("PUSH_ENDPOINT").unwrap_or(defaults.push_endpoint),
            outbox_capacity: parse_env("OUTBOX_CAPACITY", defaults.outbox_capacity),
            event_bus_capacity: parse_env("EVENT_BUS_CAPACITY", defaults.event_bus_capacity),
            trust_proxy_headers: parse_env_bool(
                "TRUST_PROXY_HEADERS",
                defaults.trust_proxy_headers,
            ),
            require_token: parse_env_bool("REQUIRE_TOKEN", defaults.require_token),
            store_addresses: parse_env_list("STORE_ADDRESSES"),
            store_password: std::env::var("STORE_PASSWORD")
                .ok()
                .filter(|p| !p.is_empty()),
            store_db: parse_env("STORE_DB", defaults.store_db),
            store_cluster_name: std::env::var("STORE_CLUSTER_NAME")
                .unwrap_or(defaults.store_cluster_name),
            store_ha_topology,
            store_channel: std::env::var("STORE_CHANNEL").unwrap_or(defaults.store_channel),
            store_ping_timeout_ms: parse_env(
                "STORE_PING_TIMEOUT_MS",
                defaults.store_ping_timeout_ms,
            ),
            store_timeout_ms: parse_env("STORE_TIMEOUT_MS", defaults.store_timeout_ms),
            clock_skew_tolerance_ms: parse_env(
                "CLOCK_SKEW_TOLERANCE_MS",
                defaults.clock_skew_tolerance_ms,
            ),
        })
    }

    /// Returns the descriptor of the configured backing store, or `None`
    /// when no store address is configured.
    #[must_use]
    pub fn store_descriptor(&self) -> Option<StoreDescriptor> {
        if self.store_addresses.is_empty() {
            return None;
        }
        let addresses = self.store_addresses.clone();
        let password = self.store_password.clone().unwrap_or_default();
        let name = self.store_cluster_name.clone();
        Some(match self.store_ha_topology {
            HaTopology::Cluster if !name.is_empty() => {
                StoreDescriptor::cluster(addresses, password, name)
            }
            _ => StoreDescriptor::new(addresses, password, self.store_db, name),
        })
    }

    /// Returns the store readiness check deadline.
    #[must_use]
    pub fn store_ping_timeout(&self) -> Duration {
        Duration::from_millis(self.store_ping_timeout_ms)
    }

    /// Returns the deadline for store connection setup and commands.
    #[must_use]
    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }
}

/// Parses an environment variable as `T`, returning `default` on missing
/// or invalid values.
fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Parses an environment variable as a boolean. Accepts `"true"`, `"1"`,
/// `"false"`, `"0"` (case-insensitive). Returns `default` otherwise.
fn parse_env_bool(key: &str, default: bool) -> bool {
    std::env::var(key)
        .ok()
        .and_then(|v| parse_bool(&v))
        .unwrap_or(default)
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "1" => Some(true),
        "false" | "0" => Some(false),
        _ => None,
    }
}

/// Parses a comma separated environment variable, dropping empty items.
fn parse_env_list(key: &str) -> Vec<String> {
    std::env::var(key)
        .map(|v| split_list(&v))
        .unwrap_or_default()
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn defaults_disable_the_backplane() {
        let config = GatewayConfig::default();
        assert_eq!(config.push_endpoint, "/events");
        assert!(config.store_descriptor().is_none());
        assert_eq!(config.store_ping_timeout(), Duration::from_secs(2));
        assert_eq!(config.store_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn list_parsing_trims_and_skips_empty() {
        assert_eq!(split_list(" a:1 ,, b:2 ,"), vec!["a:1", "b:2"]);
        assert!(split_list("").is_empty());
    }

    #[test]
    fn bool_parsing_is_case_insensitive() {
        assert_eq!(parse_bool("TRUE"), Some(true));
        assert_eq!(parse_bool("True"), Some(true));
        assert_eq!(parse_bool("0"), Some(false));
        assert_eq!(parse_bool("maybe"), None);
    }

    #[test]
    fn standalone_descriptor_from_config() {
        let config = GatewayConfig {
            store_addresses: vec!["localhost:6379".into()],
            store_db: 3,
            ..GatewayConfig::default()
        };
        let Some(descriptor) = config.store_descriptor() else {
            panic!("descriptor expected");
        };
        assert!(!descriptor.is_high_availability_mode());
        assert_eq!(descriptor.to_string(), "<store address: localhost:6379 db: 3>");
    }

    #[test]
    fn cluster_topology_from_config() {
        let config = GatewayConfig {
            store_addresses: vec!["n1:7000".into(), "n2:7001".into()],
            store_cluster_name: "main".into(),
            store_ha_topology: HaTopology::Cluster,
            ..GatewayConfig::default()
        };
        let Some(descriptor) = config.store_descriptor() else {
            panic!("descriptor expected");
        };
        assert_eq!(descriptor.topology(), Some(HaTopology::Cluster));
    }
}
