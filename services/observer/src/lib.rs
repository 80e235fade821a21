//! Observability core
//!
//! A concurrent table from venue name to per-venue metrics, each holding a
//! concurrent `channel:symbol` table. Mutations ride the hash maps'
//! per-bucket locks; readers never block writers. Updates fan out on a
//! bounded broadcast channel, so a lagging consumer drops oldest events
//! rather than stalling the producers.

pub mod metrics;

pub use metrics::{ChannelMetrics, ChannelStats, HealthStatus, VenueHealth};

use dashmap::DashMap;
use services_common::now_millis;
use tokio::sync::broadcast;
use tracing::debug;

/// Channel-error and reconnect tolerances used by the health classifier
const DEGRADED_FAILURE_THRESHOLD: u64 = 10;
const DEGRADED_RECONNECT_THRESHOLD: u32 = 3;

/// Default fan-out capacity before slow consumers start losing events
const DEFAULT_EVENT_CAPACITY: usize = 1024;

/// Event published by the observer
#[derive(Clone, Debug)]
pub enum ObserverEvent {
    /// Per-venue statistics changed after a received message
    MetricsUpdated {
        /// Venue name
        venue: String,
        /// Aggregated venue statistics after the update
        stats: ChannelStats,
    },
    /// Connection state flipped
    HealthChanged {
        /// Venue name
        venue: String,
        /// Health projection after the flip
        health: VenueHealth,
    },
}

/// Per-venue state behind the observer's outer map
#[derive(Debug, Default)]
struct VenueMetrics {
    connected_since: Option<i64>,
    is_connected: bool,
    is_authenticated: bool,
    reconnect_attempts: u32,
    total_reconnects: u32,
    last_error: Option<String>,
    last_error_at: Option<i64>,
    channels: DashMap<String, ChannelMetrics>,
}

impl VenueMetrics {
    fn total_failures(&self) -> u64 {
        self.channels.iter().map(|entry| entry.error_count).sum()
    }
}

/// Concurrent metrics aggregator shared by all stream clients.
///
/// One instance is typically created at startup and handed to every client;
/// it may equally be process-wide. All operations are venue-keyed.
pub struct MarketObserver {
    venues: DashMap<String, VenueMetrics>,
    events: broadcast::Sender<ObserverEvent>,
}

impl Default for MarketObserver {
    fn default() -> Self {
        Self::new()
    }
}

impl MarketObserver {
    /// Create an observer with the default fan-out capacity
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_EVENT_CAPACITY)
    }

    /// Create an observer with an explicit fan-out capacity
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let (events, _) = broadcast::channel(capacity);
        Self {
            venues: DashMap::new(),
            events,
        }
    }

    /// Subscribe to metric and health events
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<ObserverEvent> {
        self.events.subscribe()
    }

    fn channel_key(channel: &str, symbol: &str) -> String {
        format!("{channel}:{symbol}")
    }

    /// Record one received frame for a (channel, symbol) stream
    pub fn on_message_received(
        &self,
        venue: &str,
        channel: &str,
        symbol: &str,
        size: usize,
        latency_ms: f64,
    ) {
        let now = now_millis();
        {
            let venue_entry = self.venues.entry(venue.to_string()).or_default();
            let mut metrics = venue_entry
                .channels
                .entry(Self::channel_key(channel, symbol))
                .or_default();
            metrics.message_count += 1;
            metrics.bytes_received += size as u64;
            metrics.last_message_at = Some(now);
            metrics.total_latency_ms += latency_ms;
        }
        if let Some(stats) = self.statistics(venue) {
            let _ = self.events.send(ObserverEvent::MetricsUpdated {
                venue: venue.to_string(),
                stats,
            });
        }
    }

    /// Record a connection-state flip.
    ///
    /// A rising edge stamps connected-since and folds any accumulated
    /// reconnect attempts into the completed-reconnect counter; a falling
    /// edge counts one more attempt. Both edges publish a health event.
    pub fn on_connection_state_changed(&self, venue: &str, connected: bool) {
        {
            let mut entry = self.venues.entry(venue.to_string()).or_default();
            if connected {
                entry.connected_since = Some(now_millis());
                entry.is_connected = true;
                if entry.reconnect_attempts > 0 {
                    entry.total_reconnects += 1;
                    entry.reconnect_attempts = 0;
                }
            } else {
                entry.is_connected = false;
                entry.reconnect_attempts += 1;
            }
        }
        let health = self.health(venue);
        debug!(venue, connected, status = ?health.status, "connection state changed");
        let _ = self.events.send(ObserverEvent::HealthChanged {
            venue: venue.to_string(),
            health,
        });
    }

    /// Record whether the venue's private transport authenticated
    pub fn set_authenticated(&self, venue: &str, authenticated: bool) {
        let mut entry = self.venues.entry(venue.to_string()).or_default();
        entry.is_authenticated = authenticated;
    }

    /// Record an error and charge it to every active channel of the venue
    pub fn on_error(&self, venue: &str, message: &str) {
        let mut entry = self.venues.entry(venue.to_string()).or_default();
        entry.last_error = Some(message.to_string());
        entry.last_error_at = Some(now_millis());
        for mut channel in entry.channels.iter_mut() {
            if channel.is_active {
                channel.error_count += 1;
            }
        }
    }

    /// Insert or flip the active flag of a (channel, symbol) entry.
    ///
    /// Entries are never deleted, so statistics stay queryable after an
    /// unsubscribe.
    pub fn on_subscription_changed(&self, venue: &str, channel: &str, symbol: &str, active: bool) {
        let venue_entry = self.venues.entry(venue.to_string()).or_default();
        let mut metrics = venue_entry
            .channels
            .entry(Self::channel_key(channel, symbol))
            .or_default();
        metrics.is_active = active;
    }

    /// Statistics for one (channel, symbol) stream
    #[must_use]
    pub fn channel_statistics(&self, venue: &str, channel: &str, symbol: &str) -> Option<ChannelStats> {
        let venue_entry = self.venues.get(venue)?;
        let metrics = venue_entry.channels.get(&Self::channel_key(channel, symbol))?;
        let uptime = Self::uptime_seconds(&venue_entry);
        Some(Self::stats_from(
            metrics.message_count,
            metrics.bytes_received,
            metrics.total_latency_ms,
            metrics.last_message_at,
            metrics.error_count,
            uptime,
        ))
    }

    /// Aggregated statistics across all channels of a venue
    #[must_use]
    pub fn statistics(&self, venue: &str) -> Option<ChannelStats> {
        let venue_entry = self.venues.get(venue)?;
        let mut messages = 0u64;
        let mut bytes = 0u64;
        let mut latency = 0.0f64;
        let mut errors = 0u64;
        let mut last: Option<i64> = None;
        for channel in venue_entry.channels.iter() {
            messages += channel.message_count;
            bytes += channel.bytes_received;
            latency += channel.total_latency_ms;
            errors += channel.error_count;
            last = match (last, channel.last_message_at) {
                (Some(a), Some(b)) => Some(a.max(b)),
                (a, b) => a.or(b),
            };
        }
        let uptime = Self::uptime_seconds(&venue_entry);
        Some(Self::stats_from(messages, bytes, latency, last, errors, uptime))
    }

    fn stats_from(
        messages: u64,
        bytes: u64,
        total_latency_ms: f64,
        last_message_at: Option<i64>,
        errors: u64,
        uptime_seconds: u64,
    ) -> ChannelStats {
        let average_latency_ms = if messages == 0 {
            0.0
        } else {
            total_latency_ms / messages as f64
        };
        let messages_per_second = if uptime_seconds == 0 {
            0.0
        } else {
            messages as f64 / uptime_seconds as f64
        };
        ChannelStats {
            message_count: messages,
            bytes_received: bytes,
            average_latency_ms,
            last_message_at,
            error_count: errors,
            uptime_seconds,
            messages_per_second,
        }
    }

    fn uptime_seconds(venue: &VenueMetrics) -> u64 {
        if !venue.is_connected {
            return 0;
        }
        venue
            .connected_since
            .map(|since| ((now_millis() - since).max(0) as u64) / 1_000)
            .unwrap_or(0)
    }

    /// Health projection for a venue.
    ///
    /// Unknown venues report `Unhealthy` with zeroed counters.
    #[must_use]
    pub fn health(&self, venue: &str) -> VenueHealth {
        let Some(entry) = self.venues.get(venue) else {
            return VenueHealth {
                venue: venue.to_string(),
                status: HealthStatus::Unhealthy,
                is_connected: false,
                reconnect_attempts: 0,
                total_reconnects: 0,
                total_message_failures: 0,
                last_error: None,
                last_error_at: None,
            };
        };
        let failures = entry.total_failures();
        let status = if !entry.is_connected {
            HealthStatus::Unhealthy
        } else if failures > DEGRADED_FAILURE_THRESHOLD
            || entry.reconnect_attempts > DEGRADED_RECONNECT_THRESHOLD
        {
            HealthStatus::Degraded
        } else {
            HealthStatus::Healthy
        };
        VenueHealth {
            venue: venue.to_string(),
            status,
            is_connected: entry.is_connected,
            reconnect_attempts: entry.reconnect_attempts,
            total_reconnects: entry.total_reconnects,
            total_message_failures: failures,
            last_error: entry.last_error.clone(),
            last_error_at: entry.last_error_at,
        }
    }

    /// True when the venue currently reports connected
    #[must_use]
    pub fn is_connected(&self, venue: &str) -> bool {
        self.venues.get(venue).is_some_and(|v| v.is_connected)
    }

    /// Completed reconnect cycles for a venue
    #[must_use]
    pub fn total_reconnects(&self, venue: &str) -> u32 {
        self.venues.get(venue).map_or(0, |v| v.total_reconnects)
    }

    /// Zero the per-channel counters, reconnect counters and error fields.
    ///
    /// Connection state (flag and connected-since) is left untouched.
    pub fn reset_statistics(&self, venue: &str) {
        if let Some(mut entry) = self.venues.get_mut(venue) {
            entry.reconnect_attempts = 0;
            entry.total_reconnects = 0;
            entry.last_error = None;
            entry.last_error_at = None;
            for mut channel in entry.channels.iter_mut() {
                channel.reset();
            }
        }
    }
}
