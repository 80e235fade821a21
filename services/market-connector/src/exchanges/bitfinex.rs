//! Bitfinex v2 WebSocket adapter
//!
//! Subscriptions are acknowledged with a numeric channel id; data then
//! arrives as arrays keyed by that id. Book rows are (price, count,
//! amount) with count 0 as the delete sentinel and the amount sign
//! selecting the side. One frame per subscription; no batching.

use crate::adapter::{expect_text, BookTracker, VenueAdapter, VenueEvent};
use crate::exchanges::decimal_from;
use crate::transport::WireMessage;
use orderbook::SignedRow;
use rustc_hash::FxHashMap;
use serde_json::{json, Value};
use services_common::{
    interval, now_millis, symbols, Candle, Channel, FeedError, FeedResult, Market, Side,
    SubscriptionDescriptor, Ticker, Trade, TradeBatch,
};
use std::time::Duration;

/// Public v2 endpoint
pub const BITFINEX_WS_URL: &str = "wss://api-pub.bitfinex.com/ws/2";

const PING_INTERVAL: Duration = Duration::from_secs(30);

/// Info code: the server asks clients to reconnect
const INFO_RECONNECT: i64 = 20051;

#[derive(Clone, Debug)]
struct ChannelSub {
    channel: Channel,
    symbol: String,
    interval: Option<String>,
}

/// Bitfinex adapter
#[derive(Debug, Default)]
pub struct BitfinexAdapter {
    books: BookTracker,
    channels: FxHashMap<u64, ChannelSub>,
}

impl BitfinexAdapter {
    /// Create the adapter
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn wire_symbol(symbol: &str) -> FeedResult<String> {
        let market = Market::parse(symbol)?;
        Ok(symbols::to_bitfinex(&market))
    }

    fn candle_key(symbol: &str, candle_interval: &str) -> FeedResult<String> {
        let wire = Self::wire_symbol(symbol)?;
        Ok(format!(
            "trade:{}:{}",
            interval::to_bitfinex(candle_interval),
            wire
        ))
    }

    fn event_frame(&self, event: &str, sub: &SubscriptionDescriptor) -> FeedResult<String> {
        let frame = match sub.channel {
            Channel::Ticker => json!({
                "event": event,
                "channel": "ticker",
                "symbol": Self::wire_symbol(&sub.symbol)?,
            }),
            Channel::Orderbook => json!({
                "event": event,
                "channel": "book",
                "symbol": Self::wire_symbol(&sub.symbol)?,
                "prec": "P0",
                "freq": "F0",
                "len": "25",
            }),
            Channel::Trades => json!({
                "event": event,
                "channel": "trades",
                "symbol": Self::wire_symbol(&sub.symbol)?,
            }),
            Channel::Candles => {
                let candle_interval = sub.extra.as_deref().unwrap_or("1m");
                json!({
                    "event": event,
                    "channel": "candles",
                    "key": Self::candle_key(&sub.symbol, candle_interval)?,
                })
            }
        };
        Ok(frame.to_string())
    }

    fn parse_event(&mut self, value: &Value) -> FeedResult<Vec<VenueEvent>> {
        let event = value.get("event").and_then(Value::as_str).unwrap_or("");
        match event {
            "subscribed" => self.parse_subscribed(value),
            "unsubscribed" => {
                if let Some(chan_id) = value.get("chanId").and_then(Value::as_u64) {
                    self.channels.remove(&chan_id);
                }
                Ok(vec![])
            }
            "pong" => Ok(vec![VenueEvent::Pong]),
            "info" => {
                let code = value.get("code").and_then(Value::as_i64);
                if code == Some(INFO_RECONNECT) {
                    return Ok(vec![VenueEvent::ReconnectRequest]);
                }
                Ok(vec![])
            }
            "error" => {
                let message = value
                    .get("msg")
                    .and_then(Value::as_str)
                    .unwrap_or("venue error")
                    .to_string();
                Ok(vec![VenueEvent::VenueError {
                    message,
                    fatal: false,
                }])
            }
            "" => Err(FeedError::Parse("object frame without event".to_string())),
            _ => Ok(vec![]),
        }
    }

    fn parse_subscribed(&mut self, value: &Value) -> FeedResult<Vec<VenueEvent>> {
        let chan_id = value
            .get("chanId")
            .and_then(Value::as_u64)
            .ok_or_else(|| FeedError::Parse("subscribed without chanId".to_string()))?;
        let wire_channel = value.get("channel").and_then(Value::as_str).unwrap_or("");

        let sub = match wire_channel {
            "ticker" | "trades" | "book" => {
                let wire_symbol = value
                    .get("symbol")
                    .and_then(Value::as_str)
                    .ok_or_else(|| FeedError::Parse("subscribed without symbol".to_string()))?;
                let symbol = symbols::from_bitfinex(wire_symbol)
                    .map(|m| m.canonical())
                    .unwrap_or_else(|| wire_symbol.to_string());
                let channel = match wire_channel {
                    "ticker" => Channel::Ticker,
                    "trades" => Channel::Trades,
                    _ => Channel::Orderbook,
                };
                ChannelSub {
                    channel,
                    symbol,
                    interval: None,
                }
            }
            "candles" => {
                let key = value
                    .get("key")
                    .and_then(Value::as_str)
                    .ok_or_else(|| FeedError::Parse("candles without key".to_string()))?;
                // key shape: trade:1m:tBTCUSD
                let mut parts = key.splitn(3, ':');
                let (_, candle_interval, wire_symbol) =
                    match (parts.next(), parts.next(), parts.next()) {
                        (Some(_), Some(i), Some(s)) => ((), i, s),
                        _ => return Err(FeedError::Parse(format!("bad candles key {key:?}"))),
                    };
                let symbol = symbols::from_bitfinex(wire_symbol)
                    .map(|m| m.canonical())
                    .unwrap_or_else(|| wire_symbol.to_string());
                ChannelSub {
                    channel: Channel::Candles,
                    symbol,
                    interval: Some(candle_interval.to_string()),
                }
            }
            other => return Err(FeedError::Parse(format!("unknown channel {other:?}"))),
        };

        let ack = VenueEvent::SubscriptionAck {
            channel: sub.channel,
            symbol: Some(sub.symbol.clone()),
            extra: sub.interval.clone(),
            subscription_id: Some(chan_id.to_string()),
        };
        self.channels.insert(chan_id, sub);
        Ok(vec![ack])
    }

    fn parse_array(&mut self, items: &[Value]) -> FeedResult<Vec<VenueEvent>> {
        let chan_id = items
            .first()
            .and_then(Value::as_u64)
            .ok_or_else(|| FeedError::Parse("array frame without channel id".to_string()))?;
        if items.get(1).and_then(Value::as_str) == Some("hb") {
            return Ok(vec![VenueEvent::Heartbeat]);
        }
        let Some(sub) = self.channels.get(&chan_id).cloned() else {
            // Data for a channel we never subscribed is a venue bug; drop it
            return Err(FeedError::Parse(format!("unknown channel id {chan_id}")));
        };
        match sub.channel {
            Channel::Ticker => Self::parse_ticker_payload(&sub, items),
            Channel::Orderbook => self.parse_book_payload(&sub, items),
            Channel::Trades => Self::parse_trades_payload(&sub, items),
            Channel::Candles => Self::parse_candle_payload(&sub, items),
        }
    }

    fn parse_ticker_payload(sub: &ChannelSub, items: &[Value]) -> FeedResult<Vec<VenueEvent>> {
        let row = items
            .get(1)
            .and_then(Value::as_array)
            .ok_or_else(|| FeedError::Parse("ticker payload missing".to_string()))?;
        if row.len() < 10 {
            return Err(FeedError::Parse(format!(
                "ticker row has {} fields, expected 10",
                row.len()
            )));
        }
        let mut ticker = Ticker::new("bitfinex", sub.symbol.clone(), now_millis());
        ticker.bid = Some(decimal_from(&row[0])?);
        ticker.bid_size = Some(decimal_from(&row[1])?);
        ticker.ask = Some(decimal_from(&row[2])?);
        ticker.ask_size = Some(decimal_from(&row[3])?);
        ticker.change_24h = Some(decimal_from(&row[4])?);
        ticker.last = Some(decimal_from(&row[6])?);
        ticker.volume_24h = Some(decimal_from(&row[7])?);
        ticker.high_24h = Some(decimal_from(&row[8])?);
        ticker.low_24h = Some(decimal_from(&row[9])?);
        Ok(vec![VenueEvent::Ticker(ticker)])
    }

    fn signed_row(row: &[Value]) -> FeedResult<SignedRow> {
        if row.len() < 3 {
            return Err(FeedError::Parse(format!(
                "book row has {} fields, expected 3",
                row.len()
            )));
        }
        let count = row[1]
            .as_u64()
            .ok_or_else(|| FeedError::Parse(format!("bad count {}", row[1])))?;
        Ok(SignedRow::new(
            decimal_from(&row[0])?,
            count as u32,
            decimal_from(&row[2])?,
        ))
    }

    fn parse_book_payload(
        &mut self,
        sub: &ChannelSub,
        items: &[Value],
    ) -> FeedResult<Vec<VenueEvent>> {
        let payload = items
            .get(1)
            .and_then(Value::as_array)
            .ok_or_else(|| FeedError::Parse("book payload missing".to_string()))?;
        let ts = now_millis();
        let book = self.books.book_mut(&sub.symbol);

        // A snapshot is an array of rows; an update is a single row
        if payload.first().is_some_and(Value::is_array) {
            let rows = payload
                .iter()
                .map(|row| {
                    row.as_array()
                        .ok_or_else(|| FeedError::Parse("bad snapshot row".to_string()))
                        .and_then(|r| Self::signed_row(r))
                })
                .collect::<FeedResult<Vec<SignedRow>>>()?;
            book.apply_signed_snapshot(rows, ts);
        } else {
            book.apply_signed(Self::signed_row(payload)?, ts);
        }

        Ok(self
            .books
            .emit("bitfinex", &sub.symbol)
            .map(VenueEvent::Book)
            .into_iter()
            .collect())
    }

    fn trade_from_row(row: &[Value]) -> FeedResult<Trade> {
        if row.len() < 4 {
            return Err(FeedError::Parse(format!(
                "trade row has {} fields, expected 4",
                row.len()
            )));
        }
        let id = row[0].as_u64().map(|id| id.to_string());
        let ts = row[1]
            .as_i64()
            .ok_or_else(|| FeedError::Parse(format!("bad trade timestamp {}", row[1])))?;
        let amount = decimal_from(&row[2])?;
        let price = decimal_from(&row[3])?;
        let side = if amount.is_sign_negative() {
            Side::Ask
        } else {
            Side::Bid
        };
        let qty = amount.abs();
        Ok(Trade {
            id,
            ts,
            side,
            order_type: None,
            price,
            qty,
            amount: Some(price * qty),
        })
    }

    fn parse_trades_payload(sub: &ChannelSub, items: &[Value]) -> FeedResult<Vec<VenueEvent>> {
        let payload = items
            .get(1)
            .ok_or_else(|| FeedError::Parse("trades payload missing".to_string()))?;

        // "te"/"tu" execution frames carry one row; snapshots carry many
        let rows: Vec<&Vec<Value>> = if let Some(kind) = payload.as_str() {
            if kind == "tu" {
                // Update frames duplicate the preceding execution
                return Ok(vec![]);
            }
            let row = items
                .get(2)
                .and_then(Value::as_array)
                .ok_or_else(|| FeedError::Parse("execution row missing".to_string()))?;
            vec![row]
        } else {
            payload
                .as_array()
                .ok_or_else(|| FeedError::Parse("trades payload shape".to_string()))?
                .iter()
                .map(|row| {
                    row.as_array()
                        .ok_or_else(|| FeedError::Parse("bad trade row".to_string()))
                })
                .collect::<FeedResult<Vec<_>>>()?
        };

        let trades = rows
            .into_iter()
            .map(|row| Self::trade_from_row(row))
            .collect::<FeedResult<Vec<Trade>>>()?;
        let ts = trades.iter().map(|t| t.ts).max().unwrap_or_else(now_millis);
        Ok(vec![VenueEvent::Trades(TradeBatch {
            venue: "bitfinex".to_string(),
            symbol: sub.symbol.clone(),
            ts,
            trades,
        })])
    }

    fn candle_from_row(sub: &ChannelSub, row: &[Value]) -> FeedResult<Candle> {
        if row.len() < 6 {
            return Err(FeedError::Parse(format!(
                "candle row has {} fields, expected 6",
                row.len()
            )));
        }
        let ts = row[0]
            .as_i64()
            .ok_or_else(|| FeedError::Parse(format!("bad candle timestamp {}", row[0])))?;
        // Bitfinex candle order is [mts, open, close, high, low, volume]
        Ok(Candle {
            venue: "bitfinex".to_string(),
            symbol: sub.symbol.clone(),
            interval: sub.interval.clone().unwrap_or_else(|| "1m".to_string()),
            ts,
            open: decimal_from(&row[1])?,
            close: decimal_from(&row[2])?,
            high: decimal_from(&row[3])?,
            low: decimal_from(&row[4])?,
            volume: decimal_from(&row[5])?,
        })
    }

    fn parse_candle_payload(sub: &ChannelSub, items: &[Value]) -> FeedResult<Vec<VenueEvent>> {
        let payload = items
            .get(1)
            .and_then(Value::as_array)
            .ok_or_else(|| FeedError::Parse("candle payload missing".to_string()))?;
        if payload.first().is_some_and(Value::is_array) {
            // Snapshot: emit the most recent bucket only
            let latest = payload
                .iter()
                .filter_map(Value::as_array)
                .max_by_key(|row| row.first().and_then(Value::as_i64).unwrap_or(0));
            return match latest {
                Some(row) => Ok(vec![VenueEvent::Candle(Self::candle_from_row(sub, row)?)]),
                None => Ok(vec![]),
            };
        }
        Ok(vec![VenueEvent::Candle(Self::candle_from_row(
            sub, payload,
        )?)])
    }
}

impl VenueAdapter for BitfinexAdapter {
    fn name(&self) -> &'static str {
        "bitfinex"
    }

    fn public_url(&self) -> &str {
        BITFINEX_WS_URL
    }

    fn ping_interval(&self) -> Duration {
        PING_INTERVAL
    }

    fn format_symbol(&self, market: &Market) -> String {
        symbols::to_bitfinex(market)
    }

    fn create_ping_message(&self) -> Option<String> {
        Some(r#"{"event":"ping","cid":1}"#.to_string())
    }

    fn subscribe_frame(&self, sub: &SubscriptionDescriptor) -> FeedResult<String> {
        self.event_frame("subscribe", sub)
    }

    fn unsubscribe_frame(&self, sub: &SubscriptionDescriptor) -> FeedResult<String> {
        // Bitfinex unsubscribes by channel id; the interval is part of the
        // identity, so only the exact candle stream is torn down
        let chan_id = self
            .channels
            .iter()
            .find(|(_, c)| {
                c.channel == sub.channel
                    && c.symbol == sub.symbol
                    && c.interval.as_deref() == sub.extra.as_deref()
            })
            .map(|(id, _)| *id)
            .or_else(|| {
                sub.subscription_id
                    .as_deref()
                    .and_then(|raw| raw.parse().ok())
            })
            .ok_or_else(|| {
                FeedError::Argument(format!(
                    "no live channel id for {} {}",
                    sub.channel, sub.symbol
                ))
            })?;
        Ok(json!({"event": "unsubscribe", "chanId": chan_id}).to_string())
    }

    fn process_message(
        &mut self,
        raw: &WireMessage,
        _is_private: bool,
    ) -> FeedResult<Vec<VenueEvent>> {
        let text = expect_text(raw)?;
        let value: Value = serde_json::from_str(text)
            .map_err(|e| FeedError::Parse(format!("invalid json: {e}")))?;
        match &value {
            Value::Object(_) => self.parse_event(&value),
            Value::Array(items) => self.parse_array(items),
            other => Err(FeedError::Parse(format!("unexpected frame: {other}"))),
        }
    }

    fn reset_books(&mut self) {
        self.books.clear();
        // Channel ids die with the connection
        self.channels.clear();
    }

    fn drop_symbol(&mut self, symbol: &str) {
        self.books.remove(symbol);
    }
}
