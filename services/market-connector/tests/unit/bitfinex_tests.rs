//! Bitfinex adapter wire-format and parser tests

use market_connector::exchanges::BitfinexAdapter;
use market_connector::{VenueAdapter, VenueEvent, WireMessage};
use rust_decimal_macros::dec;
use serde_json::{json, Value};
use services_common::{Channel, Market, Side, SubscriptionDescriptor};

fn text(raw: impl Into<String>) -> WireMessage {
    WireMessage::Text(raw.into())
}

fn process(adapter: &mut BitfinexAdapter, frame: Value) -> Vec<VenueEvent> {
    adapter
        .process_message(&text(frame.to_string()), false)
        .expect("frame should parse")
}

/// Adapter with a book channel registered under id 266343
fn adapter_with_book() -> BitfinexAdapter {
    let mut adapter = BitfinexAdapter::new();
    let events = process(
        &mut adapter,
        json!({
            "event": "subscribed", "channel": "book", "chanId": 266343,
            "symbol": "tBTCUSD", "prec": "P0", "freq": "F0", "len": "25"
        }),
    );
    assert!(matches!(
        events.as_slice(),
        [VenueEvent::SubscriptionAck { .. }]
    ));
    adapter
}

#[test]
fn subscribe_frames_match_wire_shapes() {
    let adapter = BitfinexAdapter::new();

    let frame = adapter
        .subscribe_frame(&SubscriptionDescriptor::new(
            Channel::Orderbook,
            "BTC/USD",
            None,
        ))
        .unwrap();
    let value: Value = serde_json::from_str(&frame).unwrap();
    assert_eq!(
        value,
        json!({
            "event": "subscribe", "channel": "book", "symbol": "tBTCUSD",
            "prec": "P0", "freq": "F0", "len": "25"
        })
    );

    let frame = adapter
        .subscribe_frame(&SubscriptionDescriptor::new(
            Channel::Candles,
            "BTC/USD",
            Some("1m".to_string()),
        ))
        .unwrap();
    let value: Value = serde_json::from_str(&frame).unwrap();
    assert_eq!(
        value,
        json!({"event": "subscribe", "channel": "candles", "key": "trade:1m:tBTCUSD"})
    );
}

#[test]
fn symbol_format_has_t_prefix() {
    let adapter = BitfinexAdapter::new();
    let market = Market::parse("BTC/USD").unwrap();
    assert_eq!(adapter.format_symbol(&market), "tBTCUSD");
}

#[test]
fn no_batch_support() {
    assert!(!BitfinexAdapter::new().supports_batch_subscription());
}

#[test]
fn subscribed_ack_carries_channel_id() {
    let mut adapter = BitfinexAdapter::new();
    let events = process(
        &mut adapter,
        json!({"event": "subscribed", "channel": "trades", "chanId": 18, "symbol": "tBTCUSD"}),
    );
    let [VenueEvent::SubscriptionAck {
        channel,
        symbol,
        extra,
        subscription_id,
    }] = events.as_slice()
    else {
        panic!("expected ack, got {events:?}");
    };
    assert_eq!(*channel, Channel::Trades);
    assert_eq!(symbol.as_deref(), Some("BTC/USD"));
    assert!(extra.is_none());
    assert_eq!(subscription_id.as_deref(), Some("18"));
}

#[test]
fn signed_snapshot_splits_sides() {
    let mut adapter = adapter_with_book();
    let events = process(
        &mut adapter,
        json!([266343, [[50000.0, 2, 1.5], [49999.0, 1, 3.0], [50004.0, 3, -2.0]]]),
    );
    let [VenueEvent::Book(update)] = events.as_slice() else {
        panic!("expected book event, got {events:?}");
    };
    assert_eq!(update.symbol, "BTC/USD");
    assert_eq!(update.book.bids.len(), 2);
    assert_eq!(update.book.asks.len(), 1);
    assert_eq!(update.book.bids[0].price, dec!(50000));
    assert_eq!(update.book.bids[0].qty, dec!(1.5));
    assert_eq!(update.book.asks[0].price, dec!(50004));
    assert_eq!(update.book.asks[0].qty, dec!(2.0));
}

#[test]
fn count_zero_deletes_then_positive_amount_restores() {
    let mut adapter = adapter_with_book();
    process(&mut adapter, json!([266343, [[50000.0, 2, 1.5]]]));

    // count = 0 removes the level
    let events = process(&mut adapter, json!([266343, [50000.0, 0, 1.0]]));
    let [VenueEvent::Book(update)] = events.as_slice() else {
        panic!("expected book event, got {events:?}");
    };
    assert!(update.book.bids.is_empty());

    // a later positive-amount row restores it on the bid side
    let events = process(&mut adapter, json!([266343, [50000.0, 1, 0.7]]));
    let [VenueEvent::Book(update)] = events.as_slice() else {
        panic!("expected book event, got {events:?}");
    };
    assert_eq!(update.book.bids[0].price, dec!(50000));
    assert_eq!(update.book.bids[0].qty, dec!(0.7));
}

#[test]
fn heartbeat_frame() {
    let mut adapter = adapter_with_book();
    let events = process(&mut adapter, json!([266343, "hb"]));
    assert!(matches!(events.as_slice(), [VenueEvent::Heartbeat]));
}

#[test]
fn ticker_array_normalizes() {
    let mut adapter = BitfinexAdapter::new();
    process(
        &mut adapter,
        json!({"event": "subscribed", "channel": "ticker", "chanId": 7, "symbol": "tBTCUSD"}),
    );
    let events = process(
        &mut adapter,
        json!([7, [50000.1, 12.5, 50001.2, 9.3, 120.5, 0.0024, 50000.9, 4321.0, 51000.0, 49000.0]]),
    );
    let [VenueEvent::Ticker(ticker)] = events.as_slice() else {
        panic!("expected ticker, got {events:?}");
    };
    assert_eq!(ticker.venue, "bitfinex");
    assert_eq!(ticker.symbol, "BTC/USD");
    assert_eq!(ticker.bid, Some(dec!(50000.1)));
    assert_eq!(ticker.ask, Some(dec!(50001.2)));
    assert_eq!(ticker.last, Some(dec!(50000.9)));
    assert_eq!(ticker.high_24h, Some(dec!(51000)));
    assert_eq!(ticker.low_24h, Some(dec!(49000)));
}

#[test]
fn trade_executions_follow_amount_sign() {
    let mut adapter = BitfinexAdapter::new();
    process(
        &mut adapter,
        json!({"event": "subscribed", "channel": "trades", "chanId": 18, "symbol": "tBTCUSD"}),
    );

    let events = process(
        &mut adapter,
        json!([18, "te", [401597395u64, 1_714_521_600_000i64, 0.21, 50000.0]]),
    );
    let [VenueEvent::Trades(batch)] = events.as_slice() else {
        panic!("expected trades, got {events:?}");
    };
    assert_eq!(batch.trades.len(), 1);
    assert_eq!(batch.trades[0].side, Side::Bid);
    assert_eq!(batch.trades[0].qty, dec!(0.21));

    let events = process(
        &mut adapter,
        json!([18, "te", [401597396u64, 1_714_521_601_000i64, -0.05, 50001.0]]),
    );
    let [VenueEvent::Trades(batch)] = events.as_slice() else {
        panic!("expected trades, got {events:?}");
    };
    assert_eq!(batch.trades[0].side, Side::Ask);
    assert_eq!(batch.trades[0].qty, dec!(0.05));

    // "tu" duplicates the execution and is dropped
    let events = process(
        &mut adapter,
        json!([18, "tu", [401597396u64, 1_714_521_601_000i64, -0.05, 50001.0]]),
    );
    assert!(events.is_empty());
}

#[test]
fn candle_update_reorders_ochl() {
    let mut adapter = BitfinexAdapter::new();
    process(
        &mut adapter,
        json!({"event": "subscribed", "channel": "candles", "chanId": 343351,
               "key": "trade:1m:tBTCUSD"}),
    );
    let events = process(
        &mut adapter,
        json!([343351, [1_714_521_600_000i64, 50000.0, 50050.0, 50100.0, 49950.0, 12.5]]),
    );
    let [VenueEvent::Candle(candle)] = events.as_slice() else {
        panic!("expected candle, got {events:?}");
    };
    assert_eq!(candle.interval, "1m");
    assert_eq!(candle.open, dec!(50000));
    assert_eq!(candle.close, dec!(50050));
    assert_eq!(candle.high, dec!(50100));
    assert_eq!(candle.low, dec!(49950));
    assert_eq!(candle.volume, dec!(12.5));
}

/// Two candle intervals on one symbol are distinct subscriptions: each
/// ack carries its own interval and channel id, frames route by id, and
/// unsubscribing one interval leaves the other's channel live.
#[test]
fn concurrent_candle_intervals_stay_independent() {
    let mut adapter = BitfinexAdapter::new();

    let events = process(
        &mut adapter,
        json!({"event": "subscribed", "channel": "candles", "chanId": 100,
               "key": "trade:1m:tBTCUSD"}),
    );
    let [VenueEvent::SubscriptionAck {
        extra,
        subscription_id,
        ..
    }] = events.as_slice()
    else {
        panic!("expected ack, got {events:?}");
    };
    assert_eq!(extra.as_deref(), Some("1m"));
    assert_eq!(subscription_id.as_deref(), Some("100"));

    let events = process(
        &mut adapter,
        json!({"event": "subscribed", "channel": "candles", "chanId": 200,
               "key": "trade:5m:tBTCUSD"}),
    );
    let [VenueEvent::SubscriptionAck {
        extra,
        subscription_id,
        ..
    }] = events.as_slice()
    else {
        panic!("expected ack, got {events:?}");
    };
    assert_eq!(extra.as_deref(), Some("5m"));
    assert_eq!(subscription_id.as_deref(), Some("200"));

    // Frames route by channel id, not by symbol
    let events = process(
        &mut adapter,
        json!([100, [1_714_521_600_000i64, 1.0, 2.0, 3.0, 0.5, 10.0]]),
    );
    let [VenueEvent::Candle(candle)] = events.as_slice() else {
        panic!("expected candle, got {events:?}");
    };
    assert_eq!(candle.interval, "1m");

    let events = process(
        &mut adapter,
        json!([200, [1_714_521_600_000i64, 1.0, 2.0, 3.0, 0.5, 10.0]]),
    );
    let [VenueEvent::Candle(candle)] = events.as_slice() else {
        panic!("expected candle, got {events:?}");
    };
    assert_eq!(candle.interval, "5m");

    // Each unsubscribe frame targets its own interval's channel id
    let one_m =
        SubscriptionDescriptor::new(Channel::Candles, "BTC/USD", Some("1m".to_string()));
    let five_m =
        SubscriptionDescriptor::new(Channel::Candles, "BTC/USD", Some("5m".to_string()));
    let frame: Value =
        serde_json::from_str(&adapter.unsubscribe_frame(&one_m).unwrap()).unwrap();
    assert_eq!(frame["chanId"], 100);
    let frame: Value =
        serde_json::from_str(&adapter.unsubscribe_frame(&five_m).unwrap()).unwrap();
    assert_eq!(frame["chanId"], 200);

    // Tearing down the 1m channel leaves the 5m channel addressable
    process(
        &mut adapter,
        json!({"event": "unsubscribed", "chanId": 100, "status": "OK"}),
    );
    assert!(adapter.unsubscribe_frame(&one_m).is_err());
    let frame: Value =
        serde_json::from_str(&adapter.unsubscribe_frame(&five_m).unwrap()).unwrap();
    assert_eq!(frame["chanId"], 200);
}

#[test]
fn info_code_20051_requests_reconnect() {
    let mut adapter = BitfinexAdapter::new();
    let events = process(&mut adapter, json!({"event": "info", "code": 20051}));
    assert!(matches!(events.as_slice(), [VenueEvent::ReconnectRequest]));
}

#[test]
fn data_for_unknown_channel_is_a_parse_error() {
    let mut adapter = BitfinexAdapter::new();
    let result = adapter.process_message(&text(json!([999, [1, 2, 3]]).to_string()), false);
    assert!(matches!(result, Err(services_common::FeedError::Parse(_))));
}
