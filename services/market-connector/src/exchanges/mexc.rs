//! MEXC spot WebSocket adapter
//!
//! Subscriptions are channel strings pushed through a single
//! `SUBSCRIPTION` method frame, so any number of streams batch into one
//! frame. Data frames carry the channel string in `c`, the joined symbol
//! in `s`, and a millisecond timestamp in `t`.

use crate::adapter::{expect_text, BookTracker, VenueAdapter, VenueEvent};
use crate::transport::WireMessage;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::{json, Value};
use services_common::{
    interval, now_millis, symbols, BookLevel, Candle, Channel, FeedError, FeedResult, Market,
    Side, SubscriptionDescriptor, Ticker, Trade, TradeBatch,
};
use std::time::Duration;

/// Public spot endpoint
pub const MEXC_WS_URL: &str = "wss://wbs.mexc.com/ws";

/// The venue drops idle connections without a ping every 20 s
const PING_INTERVAL: Duration = Duration::from_secs(20);

/// Depth requested on the limit-depth channel
const BOOK_DEPTH: u32 = 20;

const DEPTH_CHANNEL: &str = "spot@public.limit.depth.v3.api";
const DEALS_CHANNEL: &str = "spot@public.deals.v3.api";
const BOOK_TICKER_CHANNEL: &str = "spot@public.bookTicker.v3.api";
const KLINE_CHANNEL: &str = "spot@public.kline.v3.api";

#[derive(Debug, Deserialize)]
struct DepthRow {
    p: Decimal,
    v: Decimal,
}

#[derive(Debug, Deserialize)]
struct DepthPayload {
    #[serde(default)]
    bids: Vec<DepthRow>,
    #[serde(default)]
    asks: Vec<DepthRow>,
}

#[derive(Debug, Deserialize)]
struct DealRow {
    p: Decimal,
    v: Decimal,
    /// 1 = buy, 2 = sell (taker side)
    #[serde(rename = "S")]
    side: u8,
    t: i64,
}

#[derive(Debug, Deserialize)]
struct DealsPayload {
    #[serde(default)]
    deals: Vec<DealRow>,
}

#[derive(Debug, Deserialize)]
struct BookTickerPayload {
    /// Best ask quantity
    #[serde(rename = "A")]
    ask_qty: Decimal,
    /// Best bid quantity
    #[serde(rename = "B")]
    bid_qty: Decimal,
    /// Best ask price
    a: Decimal,
    /// Best bid price
    b: Decimal,
}

#[derive(Debug, Deserialize)]
struct KlinePayload {
    k: KlineRow,
}

#[derive(Debug, Deserialize)]
struct KlineRow {
    /// Bucket open, seconds
    t: i64,
    o: Decimal,
    c: Decimal,
    h: Decimal,
    l: Decimal,
    v: Decimal,
    /// Venue interval rendering (`Min1`)
    i: String,
}

/// MEXC adapter
#[derive(Debug, Default)]
pub struct MexcAdapter {
    books: BookTracker,
}

impl MexcAdapter {
    /// Create the adapter
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn wire_symbol(symbol: &str) -> FeedResult<String> {
        let market = Market::parse(symbol)?;
        Ok(symbols::to_mexc(&market))
    }

    fn channel_string(sub: &SubscriptionDescriptor) -> FeedResult<String> {
        let wire = Self::wire_symbol(&sub.symbol)?;
        match sub.channel {
            Channel::Ticker => Ok(format!("{BOOK_TICKER_CHANNEL}@{wire}")),
            Channel::Orderbook => Ok(format!("{DEPTH_CHANNEL}@{wire}@{BOOK_DEPTH}")),
            Channel::Trades => Ok(format!("{DEALS_CHANNEL}@{wire}")),
            Channel::Candles => {
                let canonical = sub.extra.as_deref().unwrap_or("1m");
                Ok(format!(
                    "{KLINE_CHANNEL}@{wire}@{}",
                    interval::to_mexc(canonical)
                ))
            }
        }
    }

    fn method_frame(method: &str, params: Vec<String>) -> String {
        json!({"method": method, "params": params}).to_string()
    }

    /// `Min1` → `1m`; venue renderings map back to canonical intervals
    fn canonical_interval(wire: &str) -> String {
        let (prefix, suffix): (&str, &str) = ["Min", "Hour", "Day", "Week", "Month"]
            .iter()
            .find_map(|p| wire.strip_prefix(p).map(|rest| (*p, rest)))
            .unwrap_or(("", wire));
        let unit = match prefix {
            "Min" => "m",
            "Hour" => "h",
            "Day" => "d",
            "Week" => "w",
            "Month" => "M",
            _ => return wire.to_string(),
        };
        if prefix == "Min" && suffix == "60" {
            return "1h".to_string();
        }
        format!("{suffix}{unit}")
    }

    fn canonical_symbol(joined: &str) -> String {
        symbols::from_mexc(joined)
            .map(|m| m.canonical())
            .unwrap_or_else(|| joined.to_uppercase())
    }

    fn parse_depth(&mut self, symbol: &str, data: &Value, ts: i64) -> FeedResult<Vec<VenueEvent>> {
        let payload: DepthPayload = serde_json::from_value(data.clone())
            .map_err(|e| FeedError::Parse(format!("depth payload: {e}")))?;
        let bids = payload
            .bids
            .iter()
            .map(|r| BookLevel::new(r.p, r.v))
            .collect();
        let asks = payload
            .asks
            .iter()
            .map(|r| BookLevel::new(r.p, r.v))
            .collect();
        // Limit-depth frames are full top-N snapshots
        self.books.book_mut(symbol).apply_snapshot(bids, asks, ts);
        Ok(self
            .books
            .emit("mexc", symbol)
            .map(VenueEvent::Book)
            .into_iter()
            .collect())
    }

    fn parse_deals(symbol: &str, data: &Value, frame_ts: i64) -> FeedResult<Vec<VenueEvent>> {
        let payload: DealsPayload = serde_json::from_value(data.clone())
            .map_err(|e| FeedError::Parse(format!("deals payload: {e}")))?;
        let trades = payload
            .deals
            .iter()
            .map(|deal| {
                let side = match deal.side {
                    1 => Ok(Side::Bid),
                    2 => Ok(Side::Ask),
                    other => Err(FeedError::Parse(format!("unknown deal side {other}"))),
                }?;
                Ok(Trade {
                    id: None,
                    ts: deal.t,
                    side,
                    order_type: None,
                    price: deal.p,
                    qty: deal.v,
                    amount: Some(deal.p * deal.v),
                })
            })
            .collect::<FeedResult<Vec<Trade>>>()?;
        Ok(vec![VenueEvent::Trades(TradeBatch {
            venue: "mexc".to_string(),
            symbol: symbol.to_string(),
            ts: frame_ts,
            trades,
        })])
    }

    fn parse_book_ticker(symbol: &str, data: &Value, ts: i64) -> FeedResult<Vec<VenueEvent>> {
        let payload: BookTickerPayload = serde_json::from_value(data.clone())
            .map_err(|e| FeedError::Parse(format!("bookTicker payload: {e}")))?;
        let mut ticker = Ticker::new("mexc", symbol, ts);
        ticker.bid = Some(payload.b);
        ticker.bid_size = Some(payload.bid_qty);
        ticker.ask = Some(payload.a);
        ticker.ask_size = Some(payload.ask_qty);
        Ok(vec![VenueEvent::Ticker(ticker)])
    }

    fn parse_kline(symbol: &str, data: &Value) -> FeedResult<Vec<VenueEvent>> {
        let payload: KlinePayload = serde_json::from_value(data.clone())
            .map_err(|e| FeedError::Parse(format!("kline payload: {e}")))?;
        let row = payload.k;
        Ok(vec![VenueEvent::Candle(Candle {
            venue: "mexc".to_string(),
            symbol: symbol.to_string(),
            interval: Self::canonical_interval(&row.i),
            ts: row.t * 1_000,
            open: row.o,
            high: row.h,
            low: row.l,
            close: row.c,
            volume: row.v,
        })])
    }

    fn parse_ack(value: &Value) -> Option<Vec<VenueEvent>> {
        let msg = value.get("msg").and_then(Value::as_str)?;
        if msg == "PONG" {
            return Some(vec![VenueEvent::Pong]);
        }
        let code = value.get("code").and_then(Value::as_i64).unwrap_or(0);
        if code != 0 {
            return Some(vec![VenueEvent::VenueError {
                message: format!("code {code}: {msg}"),
                fatal: false,
            }]);
        }
        // Ack message text echoes the channel string(s)
        let mut events = Vec::new();
        for channel_str in msg.split(',') {
            let mut parts = channel_str.trim().split('@');
            let prefix = match (parts.next(), parts.next()) {
                (Some(a), Some(b)) => format!("{a}@{b}"),
                _ => continue,
            };
            let logical = match prefix.as_str() {
                BOOK_TICKER_CHANNEL => Channel::Ticker,
                DEPTH_CHANNEL => Channel::Orderbook,
                DEALS_CHANNEL => Channel::Trades,
                KLINE_CHANNEL => Channel::Candles,
                _ => continue,
            };
            let symbol = parts.next().map(Self::canonical_symbol);
            let extra = if logical == Channel::Candles {
                parts.next().map(Self::canonical_interval)
            } else {
                None
            };
            events.push(VenueEvent::SubscriptionAck {
                channel: logical,
                symbol,
                extra,
                subscription_id: None,
            });
        }
        Some(events)
    }
}

impl VenueAdapter for MexcAdapter {
    fn name(&self) -> &'static str {
        "mexc"
    }

    fn public_url(&self) -> &str {
        MEXC_WS_URL
    }

    fn ping_interval(&self) -> Duration {
        PING_INTERVAL
    }

    fn format_symbol(&self, market: &Market) -> String {
        symbols::to_mexc(market)
    }

    fn create_ping_message(&self) -> Option<String> {
        Some(r#"{"method":"PING"}"#.to_string())
    }

    fn supports_batch_subscription(&self) -> bool {
        true
    }

    fn subscribe_frame(&self, sub: &SubscriptionDescriptor) -> FeedResult<String> {
        Ok(Self::method_frame(
            "SUBSCRIPTION",
            vec![Self::channel_string(sub)?],
        ))
    }

    fn unsubscribe_frame(&self, sub: &SubscriptionDescriptor) -> FeedResult<String> {
        Ok(Self::method_frame(
            "UNSUBSCRIPTION",
            vec![Self::channel_string(sub)?],
        ))
    }

    fn batch_subscribe_frames(&self, subs: &[SubscriptionDescriptor]) -> FeedResult<Vec<String>> {
        // All channel strings travel in one frame
        let params = subs
            .iter()
            .map(Self::channel_string)
            .collect::<FeedResult<Vec<String>>>()?;
        Ok(vec![Self::method_frame("SUBSCRIPTION", params)])
    }

    fn process_message(
        &mut self,
        raw: &WireMessage,
        _is_private: bool,
    ) -> FeedResult<Vec<VenueEvent>> {
        let text = expect_text(raw)?;
        let value: Value = serde_json::from_str(text)
            .map_err(|e| FeedError::Parse(format!("invalid json: {e}")))?;

        if let Some(channel) = value.get("c").and_then(Value::as_str) {
            let symbol = value
                .get("s")
                .and_then(Value::as_str)
                .map(Self::canonical_symbol)
                .ok_or_else(|| FeedError::Parse("data frame without symbol".to_string()))?;
            let ts = value.get("t").and_then(Value::as_i64).unwrap_or_else(now_millis);
            let data = value
                .get("d")
                .ok_or_else(|| FeedError::Parse("data frame without payload".to_string()))?;

            return if channel.starts_with(DEPTH_CHANNEL) {
                self.parse_depth(&symbol, data, ts)
            } else if channel.starts_with(DEALS_CHANNEL) {
                Self::parse_deals(&symbol, data, ts)
            } else if channel.starts_with(BOOK_TICKER_CHANNEL) {
                Self::parse_book_ticker(&symbol, data, ts)
            } else if channel.starts_with(KLINE_CHANNEL) {
                Self::parse_kline(&symbol, data)
            } else {
                Err(FeedError::Parse(format!("unknown channel {channel:?}")))
            };
        }

        if let Some(events) = Self::parse_ack(&value) {
            return Ok(events);
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
