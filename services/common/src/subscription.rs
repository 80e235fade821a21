//! Subscription descriptors

use crate::types::{now_millis, Channel};
use serde::{Deserialize, Serialize};

/// Uniqueness key of a subscription within a venue
pub type SubscriptionKey = (Channel, String, Option<String>);

/// One logical subscription on a venue.
///
/// Descriptors live in the client's registry, survive reconnects, and drive
/// replay. `extra` carries channel qualifiers such as the candle interval.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SubscriptionDescriptor {
    /// Logical channel
    pub channel: Channel,
    /// Canonical `BASE/QUOTE` symbol
    pub symbol: String,
    /// Channel qualifier (candle interval)
    pub extra: Option<String>,
    /// Venue-issued id, when the venue assigns one
    pub subscription_id: Option<String>,
    /// True while the venue-side subscription is believed live
    pub is_active: bool,
    /// Registration time, Unix milliseconds
    pub created_at: i64,
    /// Last successful subscribe send, Unix milliseconds
    pub subscribed_at: Option<i64>,
    /// Last data frame attributed to this subscription, Unix milliseconds
    pub last_update_at: Option<i64>,
}

impl SubscriptionDescriptor {
    /// Register a new, not-yet-active subscription
    #[must_use]
    pub fn new(channel: Channel, symbol: impl Into<String>, extra: Option<String>) -> Self {
        Self {
            channel,
            symbol: symbol.into(),
            extra,
            subscription_id: None,
            is_active: false,
            created_at: now_millis(),
            subscribed_at: None,
            last_update_at: None,
        }
    }

    /// Uniqueness key within a venue
    #[must_use]
    pub fn key(&self) -> SubscriptionKey {
        (self.channel, self.symbol.clone(), self.extra.clone())
    }

    /// Mark the subscription live after a successful send
    pub fn mark_active(&mut self) {
        self.is_active = true;
        self.subscribed_at = Some(now_millis());
    }

    /// Mark the subscription inactive (unsubscribe or terminal failure)
    pub fn mark_inactive(&mut self) {
        self.is_active = false;
    }
}
