//! Subscription registry
//!
//! Insertion-ordered set of subscription descriptors keyed by
//! (channel, symbol, extra). The registry is plain data owned by the
//! client behind a lock; it survives reconnects and drives replay.

use rustc_hash::FxHashMap;
use services_common::{now_millis, Channel, SubscriptionDescriptor, SubscriptionKey};

/// Insertion-ordered descriptor store for one venue
#[derive(Debug, Default)]
pub struct SubscriptionRegistry {
    entries: Vec<SubscriptionDescriptor>,
    index: FxHashMap<SubscriptionKey, usize>,
}

impl SubscriptionRegistry {
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a descriptor, or return the existing one's position.
    ///
    /// Re-subscribing an already-known key keeps the original insertion
    /// position so replay order stays stable.
    pub fn upsert(&mut self, sub: SubscriptionDescriptor) -> usize {
        let key = sub.key();
        if let Some(&pos) = self.index.get(&key) {
            return pos;
        }
        let pos = self.entries.len();
        self.entries.push(sub);
        self.index.insert(key, pos);
        pos
    }

    /// Look up a descriptor by key
    #[must_use]
    pub fn get(&self, key: &SubscriptionKey) -> Option<&SubscriptionDescriptor> {
        self.index.get(key).map(|&pos| &self.entries[pos])
    }

    /// Mark a descriptor active after a successful send
    pub fn mark_active(&mut self, key: &SubscriptionKey) {
        if let Some(&pos) = self.index.get(key) {
            self.entries[pos].mark_active();
        }
    }

    /// Mark a descriptor inactive
    pub fn mark_inactive(&mut self, key: &SubscriptionKey) {
        if let Some(&pos) = self.index.get(key) {
            self.entries[pos].mark_inactive();
        }
    }

    /// Attach the venue-issued subscription id
    pub fn set_subscription_id(&mut self, key: &SubscriptionKey, id: String) {
        if let Some(&pos) = self.index.get(key) {
            self.entries[pos].subscription_id = Some(id);
        }
    }

    /// Stamp the last data frame attributed to (channel, symbol, extra).
    ///
    /// A qualified frame (`extra = Some`, e.g. a candle interval) stamps
    /// only the descriptor carrying the same qualifier, so two intervals
    /// on one symbol keep independent liveness. An unqualified frame
    /// stamps every subscription of the pair, since venues attach no
    /// further tag to such frames.
    pub fn touch(&mut self, channel: Channel, symbol: &str, extra: Option<&str>) {
        for entry in &mut self.entries {
            if entry.channel == channel
                && entry.symbol == symbol
                && (extra.is_none() || entry.extra.as_deref() == extra)
            {
                entry.last_update_at = Some(now_millis());
            }
        }
    }

    /// Remove a descriptor, preserving the order of the rest
    pub fn remove(&mut self, key: &SubscriptionKey) -> Option<SubscriptionDescriptor> {
        let pos = self.index.remove(key)?;
        let removed = self.entries.remove(pos);
        for value in self.index.values_mut() {
            if *value > pos {
                *value -= 1;
            }
        }
        Some(removed)
    }

    /// Active descriptors in insertion order (the replay set)
    #[must_use]
    pub fn active_in_order(&self) -> Vec<SubscriptionDescriptor> {
        self.entries.iter().filter(|s| s.is_active).cloned().collect()
    }

    /// All descriptors in insertion order
    #[must_use]
    pub fn all(&self) -> &[SubscriptionDescriptor] {
        &self.entries
    }

    /// Number of registered descriptors
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when nothing is registered
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
