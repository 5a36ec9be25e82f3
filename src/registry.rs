//! Subscription registry
//!
//! The set of instruments any downstream consumer currently wants. Mutated
//! by subscribe/unsubscribe calls, read by the upstream session whenever it
//! (re)connects or pushes newly added keys.

use std::collections::HashSet;

use parking_lot::RwLock;

use crate::tick::InstrumentKey;

/// Set of instruments of current downstream interest
///
/// Never cleared by a reconnect; the full set is re-sent upstream after
/// every successful connection instead.
#[derive(Debug, Default)]
pub struct SubscriptionRegistry {
    instruments: RwLock<HashSet<InstrumentKey>>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self {
            instruments: RwLock::new(HashSet::new()),
        }
    }

    /// Add keys to the set, returning only the ones not already present
    pub fn subscribe(&self, keys: &[InstrumentKey]) -> Vec<InstrumentKey> {
        let mut instruments = self.instruments.write();
        let mut added = Vec::new();
        for key in keys {
            if instruments.insert(key.clone()) {
                added.push(key.clone());
            }
        }
        added
    }

    /// Remove keys from the set; keys never subscribed are ignored
    pub fn unsubscribe(&self, keys: &[InstrumentKey]) {
        let mut instruments = self.instruments.write();
        for key in keys {
            instruments.remove(key);
        }
    }

    /// Point-in-time snapshot of the full set
    ///
    /// Callers push this upstream without holding any registry lock.
    pub fn snapshot(&self) -> Vec<InstrumentKey> {
        self.instruments.read().iter().cloned().collect()
    }

    /// Number of subscribed instruments
    pub fn len(&self) -> usize {
        self.instruments.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.instruments.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys(raw: &[&str]) -> Vec<InstrumentKey> {
        raw.iter().map(|key| key.to_string()).collect()
    }

    #[test]
    fn test_subscribe_returns_only_new_keys() {
        let registry = SubscriptionRegistry::new();

        let added = registry.subscribe(&keys(&["A", "B"]));
        assert_eq!(added.len(), 2);

        let added = registry.subscribe(&keys(&["B", "C"]));
        assert_eq!(added, keys(&["C"]));
        assert_eq!(registry.len(), 3);
    }

    #[test]
    fn test_empty_subscribe_is_noop() {
        let registry = SubscriptionRegistry::new();
        assert!(registry.subscribe(&[]).is_empty());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_snapshot_reflects_net_effect() {
        let registry = SubscriptionRegistry::new();
        registry.subscribe(&keys(&["A", "B", "C"]));
        registry.unsubscribe(&keys(&["B"]));
        registry.subscribe(&keys(&["D", "A"]));
        registry.unsubscribe(&keys(&["E"]));

        let mut snapshot = registry.snapshot();
        snapshot.sort();
        assert_eq!(snapshot, keys(&["A", "C", "D"]));
    }

    #[test]
    fn test_unsubscribe_unknown_key_is_noop() {
        let registry = SubscriptionRegistry::new();
        registry.subscribe(&keys(&["A"]));
        registry.unsubscribe(&keys(&["Z"]));
        assert_eq!(registry.len(), 1);
    }
}
