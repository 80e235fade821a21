//! Consumer-facing event type

use services_common::{BookUpdate, Candle, Ticker, TradeBatch};

/// Normalized record fanned out by a stream client.
///
/// Delivered on a bounded broadcast channel: per venue the order matches
/// the transport's frame order, and a lagging consumer drops oldest events
/// instead of stalling the reader task.
#[derive(Clone, Debug)]
pub enum MarketEvent {
    /// Best bid/ask and 24h statistics
    Ticker(Ticker),
    /// Order-book ladder after a snapshot or delta merge
    Book(BookUpdate),
    /// Executed trades
    Trades(TradeBatch),
    /// OHLCV candlestick
    Candle(Candle),
    /// Non-fatal error surfaced by a client
    Error {
        /// Venue name
        venue: String,
        /// Human-readable description
        message: String,
    },
    /// Informational notice (state changes, venue notices)
    Info {
        /// Venue name
        venue: String,
        /// Human-readable description
        message: String,
    },
}

impl MarketEvent {
    /// Venue the event originated from
    #[must_use]
    pub fn venue(&self) -> &str {
        match self {
            Self::Ticker(t) => &t.venue,
            Self::Book(b) => &b.venue,
            Self::Trades(t) => &t.venue,
            Self::Candle(c) => &c.venue,
            Self::Error { venue, .. } | Self::Info { venue, .. } => venue,
        }
    }
}
