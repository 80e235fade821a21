//! Venue adapter contract
//!
//! An adapter supplies the venue-specific half of a stream client: the
//! endpoint, symbol and frame formats, the ping form, and the parser that
//! turns raw frames into normalized records. Parsers are synchronous
//! CPU-only code; all I/O stays in the client.

use crate::transport::WireMessage;
use orderbook::OrderBook;
use rustc_hash::FxHashMap;
use services_common::{
    BookUpdate, Candle, Channel, FeedError, FeedResult, Market, SubscriptionDescriptor, Ticker,
    TradeBatch,
};
use std::time::Duration;

/// Output of one parsed frame
#[derive(Clone, Debug)]
pub enum VenueEvent {
    /// Normalized ticker
    Ticker(Ticker),
    /// Order-book ladder after merging the frame
    Book(BookUpdate),
    /// Normalized trade batch
    Trades(TradeBatch),
    /// Normalized candle
    Candle(Candle),
    /// The venue acknowledged a subscription
    SubscriptionAck {
        /// Logical channel
        channel: Channel,
        /// Canonical symbol, when the ack carries one
        symbol: Option<String>,
        /// Channel qualifier (candle interval), when the ack carries one
        extra: Option<String>,
        /// Venue-issued subscription id, when assigned
        subscription_id: Option<String>,
    },
    /// Application-level pong
    Pong,
    /// Venue heartbeat frame
    Heartbeat,
    /// The venue asked the client to reconnect
    ReconnectRequest,
    /// Venue error frame
    VenueError {
        /// Venue-supplied error text
        message: String,
        /// True when the venue marks the condition terminal
        fatal: bool,
    },
}

/// Venue-specific hooks consumed by the stream client.
///
/// Implementations hold the per-symbol book state because snapshot/delta
/// framing is venue-specific; the client resets it around reconnects.
pub trait VenueAdapter: Send {
    /// Venue name used in normalized records and metrics
    fn name(&self) -> &'static str;

    /// Public stream endpoint
    fn public_url(&self) -> &str;

    /// Private stream endpoint, when the venue exposes one
    fn private_url(&self) -> Option<&str> {
        None
    }

    /// Application ping cadence; also drives the inbound-frame deadline
    fn ping_interval(&self) -> Duration;

    /// Venue rendering of a market
    fn format_symbol(&self, market: &Market) -> String;

    /// Application ping frame; `None` means rely on transport pings
    fn create_ping_message(&self) -> Option<String>;

    /// True when the venue accepts grouped subscription frames
    fn supports_batch_subscription(&self) -> bool {
        false
    }

    /// Build the subscribe frame for one descriptor.
    ///
    /// # Errors
    ///
    /// `FeedError::Contract` when the venue does not offer the channel.
    fn subscribe_frame(&self, sub: &SubscriptionDescriptor) -> FeedResult<String>;

    /// Build the unsubscribe frame for one descriptor.
    ///
    /// # Errors
    ///
    /// `FeedError::Contract` when the venue does not offer the channel.
    fn unsubscribe_frame(&self, sub: &SubscriptionDescriptor) -> FeedResult<String>;

    /// Coalesce descriptors into as few frames as the venue allows.
    ///
    /// The default sends one frame per descriptor; batch-capable venues
    /// override with their grouping.
    ///
    /// # Errors
    ///
    /// Propagates the first frame-building failure.
    fn batch_subscribe_frames(&self, subs: &[SubscriptionDescriptor]) -> FeedResult<Vec<String>> {
        subs.iter().map(|sub| self.subscribe_frame(sub)).collect()
    }

    /// Parse one raw frame into normalized events.
    ///
    /// # Errors
    ///
    /// `FeedError::Parse` when the payload shape does not match; the frame
    /// is dropped and counted toward the quarantine threshold.
    fn process_message(&mut self, raw: &WireMessage, is_private: bool)
        -> FeedResult<Vec<VenueEvent>>;

    /// Drop all per-symbol book state (called around reconnects)
    fn reset_books(&mut self);

    /// Drop book state for one symbol (called on unsubscribe)
    fn drop_symbol(&mut self, _symbol: &str) {}
}

/// Per-symbol ladder cache shared by the adapters
#[derive(Debug, Default)]
pub struct BookTracker {
    books: FxHashMap<String, OrderBook>,
}

impl BookTracker {
    /// Create an empty tracker
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Book for a symbol, created on first touch
    pub fn book_mut(&mut self, symbol: &str) -> &mut OrderBook {
        self.books.entry(symbol.to_string()).or_default()
    }

    /// Emit the current ladder for a symbol as a normalized update
    #[must_use]
    pub fn emit(&self, venue: &str, symbol: &str) -> Option<BookUpdate> {
        self.books.get(symbol).map(|book| BookUpdate {
            venue: venue.to_string(),
            symbol: symbol.to_string(),
            book: book.to_data(),
        })
    }

    /// Clear every ladder (reconnect)
    pub fn clear(&mut self) {
        self.books.clear();
    }

    /// Drop one symbol's ladder (unsubscribe)
    pub fn remove(&mut self, symbol: &str) {
        self.books.remove(symbol);
    }
}

/// Reject a frame that is not UTF-8 text.
///
/// All four supported venues speak JSON text; a binary frame here is a
/// protocol violation worth a parse error, not a crash.
///
/// # Errors
///
/// `FeedError::Parse` for non-text frames.
pub fn expect_text(raw: &WireMessage) -> FeedResult<&str> {
    match raw {
        WireMessage::Text(text) => Ok(text),
        other => Err(FeedError::Parse(format!(
            "expected text frame, got {other:?}"
        ))),
    }
}
