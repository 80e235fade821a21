//! Bitstamp WebSocket adapter
//!
//! Channels are lowercase strings suffixed with the joined symbol
//! (`order_book_btcusd`). The venue pushes heartbeats and may ask clients
//! to reconnect; it offers no application ping, so the client falls back
//! to transport-level pings. One frame per subscription; no batching.

use crate::adapter::{expect_text, BookTracker, VenueAdapter, VenueEvent};
use crate::transport::WireMessage;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::{json, Value};
use services_common::{
    now_millis, symbols, BookLevel, Channel, FeedError, FeedResult, Market, Side,
    SubscriptionDescriptor, Trade, TradeBatch,
};
use std::time::Duration;

/// Public endpoint
pub const BITSTAMP_WS_URL: &str = "wss://ws.bitstamp.net";

const PING_INTERVAL: Duration = Duration::from_secs(30);

/// Full-book channel prefix (each frame is a complete snapshot)
const BOOK_PREFIX: &str = "order_book_";
/// Differential book channel prefix (each frame is a delta set)
const DIFF_BOOK_PREFIX: &str = "diff_order_book_";
/// Trades channel prefix
const TRADES_PREFIX: &str = "live_trades_";

#[derive(Debug, Deserialize)]
struct BookPayload {
    #[serde(default)]
    microtimestamp: Option<String>,
    #[serde(default)]
    timestamp: Option<String>,
    #[serde(default)]
    bids: Vec<[String; 2]>,
    #[serde(default)]
    asks: Vec<[String; 2]>,
}

#[derive(Debug, Deserialize)]
struct TradePayload {
    id: u64,
    #[serde(default)]
    microtimestamp: Option<String>,
    #[serde(default)]
    timestamp: Option<String>,
    price_str: String,
    amount_str: String,
    /// 0 = buy, 1 = sell (taker side)
    #[serde(rename = "type")]
    side: u8,
}

/// Bitstamp adapter
#[derive(Debug, Default)]
pub struct BitstampAdapter {
    books: BookTracker,
}

impl BitstampAdapter {
    /// Create the adapter
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn wire_symbol(symbol: &str) -> FeedResult<String> {
        let market = Market::parse(symbol)?;
        Ok(symbols::to_bitstamp(&market))
    }

    fn channel_name(sub: &SubscriptionDescriptor) -> FeedResult<String> {
        let wire = Self::wire_symbol(&sub.symbol)?;
        match sub.channel {
            Channel::Orderbook => {
                // `extra = diff` selects the differential channel
                if sub.extra.as_deref() == Some("diff") {
                    Ok(format!("{DIFF_BOOK_PREFIX}{wire}"))
                } else {
                    Ok(format!("{BOOK_PREFIX}{wire}"))
                }
            }
            Channel::Trades => Ok(format!("{TRADES_PREFIX}{wire}")),
            Channel::Ticker => Err(FeedError::Contract(
                "Bitstamp has no ticker channel".to_string(),
            )),
            Channel::Candles => Err(FeedError::Contract(
                "Bitstamp has no candles channel".to_string(),
            )),
        }
    }

    /// `order_book_btcusd` → (Orderbook, `BTC/USD`)
    fn split_channel(channel: &str) -> Option<(Channel, String, bool)> {
        for (prefix, logical, is_diff) in [
            (DIFF_BOOK_PREFIX, Channel::Orderbook, true),
            (BOOK_PREFIX, Channel::Orderbook, false),
            (TRADES_PREFIX, Channel::Trades, false),
        ] {
            if let Some(wire) = channel.strip_prefix(prefix) {
                let symbol = symbols::from_bitstamp(wire)
                    .map(|m| m.canonical())
                    .unwrap_or_else(|| wire.to_uppercase());
                return Some((logical, symbol, is_diff));
            }
        }
        None
    }

    fn payload_ts(micro: Option<&str>, seconds: Option<&str>) -> i64 {
        if let Some(us) = micro.and_then(|raw| raw.parse::<i64>().ok()) {
            return us / 1_000;
        }
        if let Some(s) = seconds.and_then(|raw| raw.parse::<i64>().ok()) {
            return s * 1_000;
        }
        now_millis()
    }

    fn levels_from(rows: &[[String; 2]]) -> FeedResult<Vec<BookLevel>> {
        rows.iter()
            .map(|[price, qty]| {
                let price = price
                    .parse::<Decimal>()
                    .map_err(|e| FeedError::Parse(format!("bad price {price:?}: {e}")))?;
                let qty = qty
                    .parse::<Decimal>()
                    .map_err(|e| FeedError::Parse(format!("bad qty {qty:?}: {e}")))?;
                Ok(BookLevel::new(price, qty))
            })
            .collect()
    }

    fn parse_book(
        &mut self,
        symbol: &str,
        is_diff: bool,
        data: &Value,
    ) -> FeedResult<Vec<VenueEvent>> {
        let payload: BookPayload = serde_json::from_value(data.clone())
            .map_err(|e| FeedError::Parse(format!("book payload: {e}")))?;
        let ts = Self::payload_ts(
            payload.microtimestamp.as_deref(),
            payload.timestamp.as_deref(),
        );
        let bids = Self::levels_from(&payload.bids)?;
        let asks = Self::levels_from(&payload.asks)?;

        let book = self.books.book_mut(symbol);
        if is_diff {
            book.apply_deltas(Side::Bid, bids, ts);
            book.apply_deltas(Side::Ask, asks, ts);
        } else {
            book.apply_snapshot(bids, asks, ts);
        }
        Ok(self
            .books
            .emit("bitstamp", symbol)
            .map(VenueEvent::Book)
            .into_iter()
            .collect())
    }

    fn parse_trade(symbol: &str, data: &Value) -> FeedResult<Vec<VenueEvent>> {
        let payload: TradePayload = serde_json::from_value(data.clone())
            .map_err(|e| FeedError::Parse(format!("trade payload: {e}")))?;
        let ts = Self::payload_ts(
            payload.microtimestamp.as_deref(),
            payload.timestamp.as_deref(),
        );
        let price = payload
            .price_str
            .parse::<Decimal>()
            .map_err(|e| FeedError::Parse(format!("bad price: {e}")))?;
        let qty = payload
            .amount_str
            .parse::<Decimal>()
            .map_err(|e| FeedError::Parse(format!("bad amount: {e}")))?;
        let side = match payload.side {
            0 => Side::Bid,
            1 => Side::Ask,
            other => return Err(FeedError::Parse(format!("unknown trade type {other}"))),
        };
        let trade = Trade {
            id: Some(payload.id.to_string()),
            ts,
            side,
            order_type: None,
            price,
            qty,
            amount: Some(price * qty),
        };
        Ok(vec![VenueEvent::Trades(TradeBatch {
            venue: "bitstamp".to_string(),
            symbol: symbol.to_string(),
            ts,
            trades: vec![trade],
        })])
    }
}

impl VenueAdapter for BitstampAdapter {
    fn name(&self) -> &'static str {
        "bitstamp"
    }

    fn public_url(&self) -> &str {
        BITSTAMP_WS_URL
    }

    fn ping_interval(&self) -> Duration {
        PING_INTERVAL
    }

    fn format_symbol(&self, market: &Market) -> String {
        symbols::to_bitstamp(market)
    }

    fn create_ping_message(&self) -> Option<String> {
        // Bitstamp pushes heartbeats; the client uses transport pings
        None
    }

    fn subscribe_frame(&self, sub: &SubscriptionDescriptor) -> FeedResult<String> {
        let channel = Self::channel_name(sub)?;
        Ok(json!({"event": "bts:subscribe", "data": {"channel": channel}}).to_string())
    }

    fn unsubscribe_frame(&self, sub: &SubscriptionDescriptor) -> FeedResult<String> {
        let channel = Self::channel_name(sub)?;
        Ok(json!({"event": "bts:unsubscribe", "data": {"channel": channel}}).to_string())
    }

    fn process_message(
        &mut self,
        raw: &WireMessage,
        _is_private: bool,
    ) -> FeedResult<Vec<VenueEvent>> {
        let text = expect_text(raw)?;
        let value: Value = serde_json::from_str(text)
            .map_err(|e| FeedError::Parse(format!("invalid json: {e}")))?;
        let event = value.get("event").and_then(Value::as_str).unwrap_or("");
        let channel = value.get("channel").and_then(Value::as_str).unwrap_or("");
        let data = value.get("data").unwrap_or(&Value::Null);

        match event {
            "bts:heartbeat" => Ok(vec![VenueEvent::Heartbeat]),
            "bts:request_reconnect" => Ok(vec![VenueEvent::ReconnectRequest]),
            "bts:subscription_succeeded" => match Self::split_channel(channel) {
                Some((logical, symbol, is_diff)) => Ok(vec![VenueEvent::SubscriptionAck {
                    channel: logical,
                    symbol: Some(symbol),
                    extra: is_diff.then(|| "diff".to_string()),
                    subscription_id: None,
                }]),
                None => Ok(vec![]),
            },
            "bts:error" => {
                let message = data
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or("venue error")
                    .to_string();
                Ok(vec![VenueEvent::VenueError {
                    message,
                    fatal: false,
                }])
            }
            "data" => match Self::split_channel(channel) {
                Some((Channel::Orderbook, symbol, is_diff)) => {
                    self.parse_book(&symbol, is_diff, data)
                }
                _ => Err(FeedError::Parse(format!(
                    "data frame on unknown channel {channel:?}"
                ))),
            },
            "trade" => match Self::split_channel(channel) {
                Some((Channel::Trades, symbol, _)) => Self::parse_trade(&symbol, data),
                _ => Err(FeedError::Parse(format!(
                    "trade frame on unknown channel {channel:?}"
                ))),
            },
            other => Err(FeedError::Parse(format!("unknown event {other:?}"))),
        }
    }

    fn reset_books(&mut self) {
        self.books.clear();
    }

    fn drop_symbol(&mut self, symbol: &str) {
        self.books.remove(symbol);
    }
}
