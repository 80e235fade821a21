//! Normalized market-data records
//!
//! Every venue adapter decodes its wire frames into these shapes. Prices
//! and quantities are exact decimals; timestamps are Unix milliseconds.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Current wall-clock time in Unix milliseconds
#[must_use]
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Trading side
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum Side {
    /// Buy side (bid)
    Bid,
    /// Sell side (ask/offer)
    Ask,
}

/// Order type reported on a trade, where the venue exposes one
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum OrderType {
    /// Marketable execution
    Market,
    /// Resting limit order
    Limit,
}

/// Logical stream kind
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum Channel {
    /// Best bid/ask plus 24h statistics
    Ticker,
    /// Price-level ladder
    Orderbook,
    /// Executed trades
    Trades,
    /// OHLCV candlesticks
    Candles,
}

impl Channel {
    /// Canonical lowercase channel name
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Ticker => "ticker",
            Self::Orderbook => "orderbook",
            Self::Trades => "trades",
            Self::Candles => "candles",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-row tag a venue may attach to a book level
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum LevelAction {
    /// Level newly inserted
    New,
    /// Quantity replaced at an existing price
    Update,
    /// Level removed
    Delete,
}

/// One price level of an order book
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BookLevel {
    /// Price
    pub price: Decimal,
    /// Quantity at this price (0 = delete sentinel)
    pub qty: Decimal,
    /// Order count at this level, where the venue reports one
    pub count: Option<u32>,
    /// Venue-assigned level/order id
    pub id: Option<u64>,
    /// Action tag, where the venue reports one
    pub action: Option<LevelAction>,
}

impl BookLevel {
    /// Create a plain (price, qty) level
    #[must_use]
    pub const fn new(price: Decimal, qty: Decimal) -> Self {
        Self {
            price,
            qty,
            count: None,
            id: None,
            action: None,
        }
    }

    /// Attach a per-level order count
    #[must_use]
    pub const fn with_count(mut self, count: u32) -> Self {
        self.count = Some(count);
        self
    }

    /// True when this row deletes the level at `price`
    #[must_use]
    pub fn is_delete(&self) -> bool {
        self.qty.is_zero() || self.action == Some(LevelAction::Delete)
    }
}

/// A sorted two-sided ladder plus its event timestamp.
///
/// Bids are strictly non-increasing by price, asks strictly non-decreasing;
/// no two levels on a side share a price.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct OrderBookData {
    /// Bid levels, best first
    pub bids: Vec<BookLevel>,
    /// Ask levels, best first
    pub asks: Vec<BookLevel>,
    /// Event timestamp in Unix milliseconds
    pub ts: i64,
}

/// Order-book emission with its venue and symbol attached
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BookUpdate {
    /// Source venue name
    pub venue: String,
    /// Canonical symbol
    pub symbol: String,
    /// The ladder after the mutation
    pub book: OrderBookData,
}

/// Normalized ticker record
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Ticker {
    /// Source venue name
    pub venue: String,
    /// Canonical symbol
    pub symbol: String,
    /// Event timestamp in Unix milliseconds
    pub ts: i64,
    /// Best bid price
    pub bid: Option<Decimal>,
    /// Size at the best bid
    pub bid_size: Option<Decimal>,
    /// Best ask price
    pub ask: Option<Decimal>,
    /// Size at the best ask
    pub ask_size: Option<Decimal>,
    /// Last traded price
    pub last: Option<Decimal>,
    /// 24h high
    pub high_24h: Option<Decimal>,
    /// 24h low
    pub low_24h: Option<Decimal>,
    /// 24h base volume
    pub volume_24h: Option<Decimal>,
    /// 24h price change
    pub change_24h: Option<Decimal>,
}

impl Ticker {
    /// Create an empty ticker for a venue/symbol
    #[must_use]
    pub fn new(venue: impl Into<String>, symbol: impl Into<String>, ts: i64) -> Self {
        Self {
            venue: venue.into(),
            symbol: symbol.into(),
            ts,
            bid: None,
            bid_size: None,
            ask: None,
            ask_size: None,
            last: None,
            high_24h: None,
            low_24h: None,
            volume_24h: None,
            change_24h: None,
        }
    }
}

/// One executed trade
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    /// Venue-assigned trade id
    pub id: Option<String>,
    /// Execution timestamp in Unix milliseconds
    pub ts: i64,
    /// Taker side
    pub side: Side,
    /// Order type, where reported
    pub order_type: Option<OrderType>,
    /// Execution price
    pub price: Decimal,
    /// Base quantity
    pub qty: Decimal,
    /// Quote amount (price × qty), where reported
    pub amount: Option<Decimal>,
}

/// A batch of trades delivered in one frame
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TradeBatch {
    /// Source venue name
    pub venue: String,
    /// Canonical symbol
    pub symbol: String,
    /// Frame timestamp in Unix milliseconds
    pub ts: i64,
    /// Trades in venue delivery order
    pub trades: Vec<Trade>,
}

/// One OHLCV candlestick
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    /// Source venue name
    pub venue: String,
    /// Canonical symbol
    pub symbol: String,
    /// Canonical interval (`1m`, `1h`, …)
    pub interval: String,
    /// Bucket open timestamp in Unix milliseconds
    pub ts: i64,
    /// Open price
    pub open: Decimal,
    /// High price
    pub high: Decimal,
    /// Low price
    pub low: Decimal,
    /// Close price
    pub close: Decimal,
    /// Base volume
    pub volume: Decimal,
}
