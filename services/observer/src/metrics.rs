//! Metric record shapes

use serde::{Deserialize, Serialize};

/// Derived health classification for a venue connection
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum HealthStatus {
    /// Connected with failures and reconnects inside tolerances
    Healthy,
    /// Connected but accumulating failures or reconnect attempts
    Degraded,
    /// Not connected
    Unhealthy,
}

/// Counters for one (channel, symbol) stream on a venue
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ChannelMetrics {
    /// Frames attributed to this stream
    pub message_count: u64,
    /// Payload bytes received
    pub bytes_received: u64,
    /// Last frame time, Unix milliseconds
    pub last_message_at: Option<i64>,
    /// Accumulated processing latency in milliseconds
    pub total_latency_ms: f64,
    /// Errors charged to this stream
    pub error_count: u64,
    /// True while the subscription is live
    pub is_active: bool,
}

impl ChannelMetrics {
    /// Mean per-message processing latency
    #[must_use]
    pub fn average_latency_ms(&self) -> f64 {
        if self.message_count == 0 {
            0.0
        } else {
            // message counts stay far below f64's exact-integer range
            self.total_latency_ms / self.message_count as f64
        }
    }

    /// Zero the counters, keeping the active flag
    pub fn reset(&mut self) {
        let was_active = self.is_active;
        *self = Self::default();
        self.is_active = was_active;
    }
}

/// Aggregated statistics view returned by queries
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ChannelStats {
    /// Frames counted
    pub message_count: u64,
    /// Payload bytes counted
    pub bytes_received: u64,
    /// Mean processing latency in milliseconds
    pub average_latency_ms: f64,
    /// Most recent frame time, Unix milliseconds
    pub last_message_at: Option<i64>,
    /// Errors counted
    pub error_count: u64,
    /// Seconds since the venue connected, 0 when disconnected
    pub uptime_seconds: u64,
    /// message_count / uptime_seconds, 0 when uptime is 0
    pub messages_per_second: f64,
}

/// Health projection for a venue
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct VenueHealth {
    /// Venue name
    pub venue: String,
    /// Derived classification
    pub status: HealthStatus,
    /// Current connection flag
    pub is_connected: bool,
    /// Attempts since the connection last dropped
    pub reconnect_attempts: u32,
    /// Completed reconnect cycles
    pub total_reconnects: u32,
    /// Errors summed across the venue's channels
    pub total_message_failures: u64,
    /// Most recent error text
    pub last_error: Option<String>,
    /// Most recent error time, Unix milliseconds
    pub last_error_at: Option<i64>,
}
