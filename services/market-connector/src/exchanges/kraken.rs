//! Kraken v2 WebSocket adapter
//!
//! Symbols travel in canonical `BASE/QUOTE` form. Subscriptions group by
//! channel, so a batch replay sends at most one frame per channel with the
//! full symbol array.

use crate::adapter::{expect_text, BookTracker, VenueAdapter, VenueEvent};
use crate::exchanges::millis_from_rfc3339;
use crate::transport::WireMessage;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use services_common::{
    now_millis, symbols, BookLevel, Channel, FeedError, FeedResult, Market, OrderType, Side,
    SubscriptionDescriptor, Ticker, Trade, TradeBatch,
};
use std::time::Duration;

/// Public v2 endpoint
pub const KRAKEN_WS_URL: &str = "wss://ws.kraken.com/v2";

/// Book depth requested on subscribe
const BOOK_DEPTH: u32 = 25;

const PING_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Serialize)]
struct MethodFrame<'a> {
    method: &'a str,
    params: SubscribeParams,
}

#[derive(Serialize)]
struct SubscribeParams {
    channel: &'static str,
    symbol: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    depth: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    snapshot: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct TickerData {
    symbol: String,
    bid: Decimal,
    bid_qty: Decimal,
    ask: Decimal,
    ask_qty: Decimal,
    last: Decimal,
    volume: Decimal,
    low: Decimal,
    high: Decimal,
    change: Decimal,
}

#[derive(Debug, Deserialize)]
struct BookRow {
    price: Decimal,
    qty: Decimal,
}

#[derive(Debug, Deserialize)]
struct BookData {
    symbol: String,
    #[serde(default)]
    bids: Vec<BookRow>,
    #[serde(default)]
    asks: Vec<BookRow>,
    #[serde(default)]
    timestamp: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TradeData {
    symbol: String,
    side: String,
    price: Decimal,
    qty: Decimal,
    #[serde(default)]
    ord_type: Option<String>,
    #[serde(default)]
    trade_id: Option<u64>,
    #[serde(default)]
    timestamp: Option<String>,
}

/// Kraken v2 adapter
#[derive(Debug, Default)]
pub struct KrakenAdapter {
    books: BookTracker,
}

impl KrakenAdapter {
    /// Create the adapter
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn wire_channel(channel: Channel) -> FeedResult<&'static str> {
        match channel {
            Channel::Ticker => Ok("ticker"),
            Channel::Orderbook => Ok("book"),
            Channel::Trades => Ok("trade"),
            Channel::Candles => Err(FeedError::Contract(
                "candles are not offered on the Kraken v2 stream".to_string(),
            )),
        }
    }

    fn logical_channel(wire: &str) -> Option<Channel> {
        match wire {
            "ticker" => Some(Channel::Ticker),
            "book" => Some(Channel::Orderbook),
            "trade" => Some(Channel::Trades),
            _ => None,
        }
    }

    fn method_frame(method: &str, channel: Channel, symbols: Vec<String>) -> FeedResult<String> {
        let wire = Self::wire_channel(channel)?;
        let params = SubscribeParams {
            channel: wire,
            symbol: symbols,
            depth: (channel == Channel::Orderbook).then_some(BOOK_DEPTH),
            snapshot: (channel == Channel::Orderbook).then_some(true),
        };
        serde_json::to_string(&MethodFrame { method, params })
            .map_err(|e| FeedError::Parse(format!("frame encode failed: {e}")))
    }

    fn parse_ticker(&self, data: &Value) -> FeedResult<Vec<VenueEvent>> {
        let rows: Vec<TickerData> = serde_json::from_value(data.clone())
            .map_err(|e| FeedError::Parse(format!("ticker data: {e}")))?;
        let mut events = Vec::with_capacity(rows.len());
        for row in rows {
            let mut ticker = Ticker::new("kraken", row.symbol.clone(), now_millis());
            ticker.bid = Some(row.bid);
            ticker.bid_size = Some(row.bid_qty);
            ticker.ask = Some(row.ask);
            ticker.ask_size = Some(row.ask_qty);
            ticker.last = Some(row.last);
            ticker.volume_24h = Some(row.volume);
            ticker.low_24h = Some(row.low);
            ticker.high_24h = Some(row.high);
            ticker.change_24h = Some(row.change);
            events.push(VenueEvent::Ticker(ticker));
        }
        Ok(events)
    }

    fn parse_book(&mut self, kind: &str, data: &Value) -> FeedResult<Vec<VenueEvent>> {
        let rows: Vec<BookData> = serde_json::from_value(data.clone())
            .map_err(|e| FeedError::Parse(format!("book data: {e}")))?;
        let mut events = Vec::with_capacity(rows.len());
        for row in rows {
            let ts = match &row.timestamp {
                Some(raw) => millis_from_rfc3339(raw)?,
                None => now_millis(),
            };
            let bids: Vec<BookLevel> = row
                .bids
                .iter()
                .map(|r| BookLevel::new(r.price, r.qty))
                .collect();
            let asks: Vec<BookLevel> = row
                .asks
                .iter()
                .map(|r| BookLevel::new(r.price, r.qty))
                .collect();

            let book = self.books.book_mut(&row.symbol);
            if kind == "snapshot" {
                book.apply_snapshot(bids, asks, ts);
            } else {
                book.apply_deltas(Side::Bid, bids, ts);
                book.apply_deltas(Side::Ask, asks, ts);
            }
            if let Some(update) = self.books.emit("kraken", &row.symbol) {
                events.push(VenueEvent::Book(update));
            }
        }
        Ok(events)
    }

    fn parse_trades(&self, data: &Value) -> FeedResult<Vec<VenueEvent>> {
        let rows: Vec<TradeData> = serde_json::from_value(data.clone())
            .map_err(|e| FeedError::Parse(format!("trade data: {e}")))?;
        let mut events: Vec<VenueEvent> = Vec::new();
        for row in rows {
            let ts = match &row.timestamp {
                Some(raw) => millis_from_rfc3339(raw)?,
                None => now_millis(),
            };
            let side = match row.side.as_str() {
                "buy" => Side::Bid,
                "sell" => Side::Ask,
                other => return Err(FeedError::Parse(format!("unknown trade side {other:?}"))),
            };
            let order_type = row.ord_type.as_deref().and_then(|t| match t {
                "market" => Some(OrderType::Market),
                "limit" => Some(OrderType::Limit),
                _ => None,
            });
            let trade = Trade {
                id: row.trade_id.map(|id| id.to_string()),
                ts,
                side,
                order_type,
                price: row.price,
                qty: row.qty,
                amount: Some(row.price * row.qty),
            };

            // Frames usually carry one symbol; group defensively anyway
            match events.iter_mut().find_map(|e| match e {
                VenueEvent::Trades(batch) if batch.symbol == row.symbol => Some(batch),
                _ => None,
            }) {
                Some(batch) => {
                    batch.ts = batch.ts.max(ts);
                    batch.trades.push(trade);
                }
                None => events.push(VenueEvent::Trades(TradeBatch {
                    venue: "kraken".to_string(),
                    symbol: row.symbol.clone(),
                    ts,
                    trades: vec![trade],
                })),
            }
        }
        Ok(events)
    }

    fn parse_method(&self, value: &Value) -> FeedResult<Vec<VenueEvent>> {
        let method = value.get("method").and_then(Value::as_str).unwrap_or("");
        match method {
            "pong" => Ok(vec![VenueEvent::Pong]),
            "subscribe" => {
                let success = value
                    .get("success")
                    .and_then(Value::as_bool)
                    .unwrap_or(false);
                if !success {
                    let message = value
                        .get("error")
                        .and_then(Value::as_str)
                        .unwrap_or("subscribe rejected")
                        .to_string();
                    return Ok(vec![VenueEvent::VenueError {
                        message,
                        fatal: false,
                    }]);
                }
                let result = value.get("result").unwrap_or(&Value::Null);
                let channel = result
                    .get("channel")
                    .and_then(Value::as_str)
                    .and_then(Self::logical_channel);
                let symbol = result
                    .get("symbol")
                    .and_then(Value::as_str)
                    .map(ToString::to_string);
                match channel {
                    Some(channel) => Ok(vec![VenueEvent::SubscriptionAck {
                        channel,
                        symbol,
                        extra: None,
                        subscription_id: None,
                    }]),
                    None => Ok(vec![]),
                }
            }
            // Unsubscribe acks and unknown methods carry no data
            _ => Ok(vec![]),
        }
    }
}

impl VenueAdapter for KrakenAdapter {
    fn name(&self) -> &'static str {
        "kraken"
    }

    fn public_url(&self) -> &str {
        KRAKEN_WS_URL
    }

    fn ping_interval(&self) -> Duration {
        PING_INTERVAL
    }

    fn format_symbol(&self, market: &Market) -> String {
        symbols::to_kraken(market)
    }

    fn create_ping_message(&self) -> Option<String> {
        Some(r#"{"method":"ping"}"#.to_string())
    }

    fn supports_batch_subscription(&self) -> bool {
        true
    }

    fn subscribe_frame(&self, sub: &SubscriptionDescriptor) -> FeedResult<String> {
        Self::method_frame("subscribe", sub.channel, vec![sub.symbol.clone()])
    }

    fn unsubscribe_frame(&self, sub: &SubscriptionDescriptor) -> FeedResult<String> {
        Self::method_frame("unsubscribe", sub.channel, vec![sub.symbol.clone()])
    }

    fn batch_subscribe_frames(&self, subs: &[SubscriptionDescriptor]) -> FeedResult<Vec<String>> {
        // One frame per channel, symbols in first-seen order
        let mut groups: Vec<(Channel, Vec<String>)> = Vec::new();
        for sub in subs {
            match groups.iter_mut().find(|(channel, _)| *channel == sub.channel) {
                Some((_, symbols)) => {
                    if !symbols.contains(&sub.symbol) {
                        symbols.push(sub.symbol.clone());
                    }
                }
                None => groups.push((sub.channel, vec![sub.symbol.clone()])),
            }
        }
        groups
            .into_iter()
            .map(|(channel, symbols)| Self::method_frame("subscribe", channel, symbols))
            .collect()
    }

    fn process_message(
        &mut self,
        raw: &WireMessage,
        _is_private: bool,
    ) -> FeedResult<Vec<VenueEvent>> {
        let text = expect_text(raw)?;
        let value: Value = serde_json::from_str(text)
            .map_err(|e| FeedError::Parse(format!("invalid json: {e}")))?;

        if let Some(channel) = value.get("channel").and_then(Value::as_str) {
            let kind = value.get("type").and_then(Value::as_str).unwrap_or("update");
            let data = value.get("data").unwrap_or(&Value::Null);
            return match channel {
                "heartbeat" => Ok(vec![VenueEvent::Heartbeat]),
                "status" => Ok(vec![]),
                "ticker" => self.parse_ticker(data),
                "book" => self.parse_book(kind, data),
                "trade" => self.parse_trades(data),
                other => Err(FeedError::Parse(format!("unknown channel {other:?}"))),
            };
        }
        if value.get("method").is_some() {
            return self.parse_method(&value);
        }
        if let Some(message) = value.get("error").and_then(Value::as_str) {
            return Ok(vec![VenueEvent::VenueError {
                message: message.to_string(),
                fatal: false,
            }]);
        }
        Err(FeedError::Parse("unrecognized frame shape".to_string()))
    }

    fn reset_books(&mut self) {
        self.books.clear();
    }

    fn drop_symbol(&mut self, symbol: &str) {
        self.books.remove(symbol);
    }
}
