//! Per-session selection of the event kinds a client wants pushed.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::PushEvent;

/// Set of event kinds a session accepts.
///
/// An event passes when its kind is in the set. Events without a kind
/// never pass a filter; a session without a filter receives everything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushFilter {
    kinds: BTreeSet<String>,
}

impl PushFilter {
    /// Creates a filter accepting `kinds`.
    #[must_use]
    pub fn new<I, S>(kinds: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            kinds: kinds.into_iter().map(Into::into).collect(),
        }
    }

    /// Returns the accepted kinds in sorted order.
    pub fn kinds(&self) -> impl Iterator<Item = &str> {
        self.kinds.iter().map(String::as_str)
    }

    /// Returns `true` if `event` must not be pushed.
    #[must_use]
    pub fn is_filtered_out(&self, event: &PushEvent) -> bool {
        event
            .kind
            .as_ref()
            .is_none_or(|kind| !self.kinds.contains(kind))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_listed_kinds_pass() {
        let filter = PushFilter::new(["order.created", "order.deleted"]);
        let created = PushEvent::broadcast(serde_json::Value::Null).with_kind("order.created");
        let updated = PushEvent::broadcast(serde_json::Value::Null).with_kind("order.updated");
        assert!(!filter.is_filtered_out(&created));
        assert!(filter.is_filtered_out(&updated));
    }

    #[test]
    fn events_without_kind_are_filtered_out() {
        let filter = PushFilter::new(["order.created"]);
        assert!(filter.is_filtered_out(&PushEvent::broadcast(serde_json::Value::Null)));
        assert!(PushFilter::default().is_filtered_out(&PushEvent::broadcast(serde_json::Value::Null)));
    }

    #[test]
    fn kinds_are_sorted_and_deduplicated() {
        let filter = PushFilter::new(["b", "a", "b"]);
        assert_eq!(filter.kinds().collect::<Vec<_>>(), ["a", "b"]);
    }
}
