//! Identity claims attached to a session.
//!
//! Claims are opaque `key=value` strings. [`Claims`] keeps the ordered
//! entries and the derived key/value map in one value, so replacing the
//! claims of a session always replaces both at once.
//!
//! Map derivation splits each entry on the first `=`. Entries without a
//! `=` stay in the ordered list but are not part of the map. When a key
//! repeats, the later entry wins.

use std::collections::HashMap;

/// Ordered claim entries together with their derived map.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Claims {
    entries: Vec<String>,
    map: HashMap<String, String>,
}

impl Claims {
    /// Builds claims from raw `key=value` entries.
    #[must_use]
    pub fn new(entries: Vec<String>) -> Self {
        let map = derive_map(&entries);
        Self { entries, map }
    }

    /// Returns the entries in the order they were supplied.
    #[must_use]
    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    /// Returns the key/value map derived from the entries.
    #[must_use]
    pub fn map(&self) -> &HashMap<String, String> {
        &self.map
    }

    /// Returns the value of a single claim key.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.map.get(key).map(String::as_str)
    }

    /// Returns `true` when there are no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn derive_map(entries: &[String]) -> HashMap<String, String> {
    entries
        .iter()
        .filter_map(|entry| entry.split_once('='))
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

/// Turns the raw token of an upgrade request into claim entries.
///
/// Token verification happens upstream; implementations only decode.
pub trait ClaimsExtractor: Send + Sync + std::fmt::Debug {
    /// Returns the `key=value` entries carried by `token`.
    fn extract(&self, token: &str) -> Vec<String>;
}

/// Extractor for tokens that carry no readable claims.
#[derive(Debug, Clone, Copy, Default)]
pub struct OpaqueTokenClaims;

impl ClaimsExtractor for OpaqueTokenClaims {
    fn extract(&self, _token: &str) -> Vec<String> {
        Vec::new()
    }
}
