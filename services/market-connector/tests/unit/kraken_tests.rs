//! Kraken adapter wire-format and parser tests

use market_connector::exchanges::KrakenAdapter;
use market_connector::{VenueAdapter, VenueEvent, WireMessage};
use rust_decimal_macros::dec;
use serde_json::{json, Value};
use services_common::{Channel, Market, Side, SubscriptionDescriptor};

fn adapter() -> KrakenAdapter {
    KrakenAdapter::new()
}

fn sub(channel: Channel, symbol: &str) -> SubscriptionDescriptor {
    SubscriptionDescriptor::new(channel, symbol, None)
}

fn text(raw: impl Into<String>) -> WireMessage {
    WireMessage::Text(raw.into())
}

fn process(adapter: &mut KrakenAdapter, frame: Value) -> Vec<VenueEvent> {
    adapter
        .process_message(&text(frame.to_string()), false)
        .expect("frame should parse")
}

#[test]
fn ticker_subscribe_frame_matches_wire_shape() {
    let frame = adapter()
        .subscribe_frame(&sub(Channel::Ticker, "BTC/USD"))
        .unwrap();
    let value: Value = serde_json::from_str(&frame).unwrap();
    assert_eq!(
        value,
        json!({
            "method": "subscribe",
            "params": {"channel": "ticker", "symbol": ["BTC/USD"]}
        })
    );
}

#[test]
fn book_subscribe_frame_requests_depth_and_snapshot() {
    let frame = adapter()
        .subscribe_frame(&sub(Channel::Orderbook, "BTC/USD"))
        .unwrap();
    let value: Value = serde_json::from_str(&frame).unwrap();
    assert_eq!(
        value,
        json!({
            "method": "subscribe",
            "params": {
                "channel": "book",
                "symbol": ["BTC/USD"],
                "depth": 25,
                "snapshot": true
            }
        })
    );
}

#[test]
fn candles_are_a_contract_error() {
    let result = adapter().subscribe_frame(&sub(Channel::Candles, "BTC/USD"));
    assert!(matches!(
        result,
        Err(services_common::FeedError::Contract(_))
    ));
}

#[test]
fn batch_groups_symbols_by_channel() {
    let subs = vec![
        sub(Channel::Ticker, "BTC/USD"),
        sub(Channel::Ticker, "ETH/USD"),
        sub(Channel::Trades, "BTC/USD"),
    ];
    let frames = adapter().batch_subscribe_frames(&subs).unwrap();
    assert_eq!(frames.len(), 2);

    let first: Value = serde_json::from_str(&frames[0]).unwrap();
    assert_eq!(first["params"]["channel"], "ticker");
    assert_eq!(first["params"]["symbol"], json!(["BTC/USD", "ETH/USD"]));

    let second: Value = serde_json::from_str(&frames[1]).unwrap();
    assert_eq!(second["params"]["channel"], "trade");
    assert_eq!(second["params"]["symbol"], json!(["BTC/USD"]));
}

#[test]
fn symbol_format_is_canonical() {
    let market = Market::parse("BTC/USD").unwrap();
    assert_eq!(adapter().format_symbol(&market), "BTC/USD");
}

#[test]
fn book_snapshot_then_updates_keep_sort_order() {
    let mut adapter = adapter();
    let events = process(
        &mut adapter,
        json!({
            "channel": "book",
            "type": "snapshot",
            "data": [{
                "symbol": "BTC/USD",
                "bids": [{"price": 50001.0, "qty": 2.0}, {"price": 50003.0, "qty": 1.0}],
                "asks": [{"price": 50007.0, "qty": 3.0}, {"price": 50005.0, "qty": 1.0}],
                "checksum": 123456u32
            }]
        }),
    );
    let [VenueEvent::Book(update)] = events.as_slice() else {
        panic!("expected one book event, got {events:?}");
    };
    assert_eq!(update.venue, "kraken");
    assert_eq!(update.symbol, "BTC/USD");
    assert_eq!(update.book.bids[0].price, dec!(50003));
    assert_eq!(update.book.asks[0].price, dec!(50005));

    // Delete the best bid, insert a level between the remaining two
    let events = process(
        &mut adapter,
        json!({
            "channel": "book",
            "type": "update",
            "data": [{
                "symbol": "BTC/USD",
                "bids": [{"price": 50003.0, "qty": 0.0}, {"price": 50002.0, "qty": 5.0}],
                "asks": [],
                "timestamp": "2024-05-01T00:00:00.123Z"
            }]
        }),
    );
    let [VenueEvent::Book(update)] = events.as_slice() else {
        panic!("expected one book event, got {events:?}");
    };
    let bid_prices: Vec<_> = update.book.bids.iter().map(|l| l.price).collect();
    assert_eq!(bid_prices, vec![dec!(50002), dec!(50001)]);
    assert_eq!(update.book.ts, 1_714_521_600_123);
}

#[test]
fn ticker_frame_normalizes() {
    let mut adapter = adapter();
    let events = process(
        &mut adapter,
        json!({
            "channel": "ticker",
            "type": "snapshot",
            "data": [{
                "symbol": "BTC/USD",
                "bid": 50000.1, "bid_qty": 0.5,
                "ask": 50001.2, "ask_qty": 1.0,
                "last": 50000.5, "volume": 123.4,
                "low": 49000.0, "high": 51000.0, "change": 250.5
            }]
        }),
    );
    let [VenueEvent::Ticker(ticker)] = events.as_slice() else {
        panic!("expected one ticker, got {events:?}");
    };
    assert_eq!(ticker.venue, "kraken");
    assert_eq!(ticker.bid, Some(dec!(50000.1)));
    assert_eq!(ticker.ask, Some(dec!(50001.2)));
    assert_eq!(ticker.volume_24h, Some(dec!(123.4)));
}

#[test]
fn trade_frame_normalizes_sides_and_types() {
    let mut adapter = adapter();
    let events = process(
        &mut adapter,
        json!({
            "channel": "trade",
            "type": "update",
            "data": [
                {"symbol": "BTC/USD", "side": "buy", "price": 50000.0, "qty": 0.1,
                 "ord_type": "limit", "trade_id": 771, "timestamp": "2024-05-01T00:00:00.000Z"},
                {"symbol": "BTC/USD", "side": "sell", "price": 50001.0, "qty": 0.2,
                 "ord_type": "market", "trade_id": 772, "timestamp": "2024-05-01T00:00:01.000Z"}
            ]
        }),
    );
    let [VenueEvent::Trades(batch)] = events.as_slice() else {
        panic!("expected one batch, got {events:?}");
    };
    assert_eq!(batch.trades.len(), 2);
    assert_eq!(batch.trades[0].side, Side::Bid);
    assert_eq!(batch.trades[1].side, Side::Ask);
    assert_eq!(batch.trades[0].id.as_deref(), Some("771"));
    assert_eq!(batch.ts, 1_714_521_601_000);
}

#[test]
fn heartbeat_and_pong_frames() {
    let mut adapter = adapter();
    let events = process(&mut adapter, json!({"channel": "heartbeat"}));
    assert!(matches!(events.as_slice(), [VenueEvent::Heartbeat]));

    let events = process(&mut adapter, json!({"method": "pong", "time_in": "x"}));
    assert!(matches!(events.as_slice(), [VenueEvent::Pong]));
}

#[test]
fn subscribe_ack_and_rejection() {
    let mut adapter = adapter();
    let events = process(
        &mut adapter,
        json!({
            "method": "subscribe",
            "success": true,
            "result": {"channel": "ticker", "symbol": "BTC/USD"}
        }),
    );
    let [VenueEvent::SubscriptionAck {
        channel, symbol, ..
    }] = events.as_slice()
    else {
        panic!("expected an ack, got {events:?}");
    };
    assert_eq!(*channel, Channel::Ticker);
    assert_eq!(symbol.as_deref(), Some("BTC/USD"));

    let events = process(
        &mut adapter,
        json!({"method": "subscribe", "success": false, "error": "Currency pair not supported"}),
    );
    assert!(matches!(
        events.as_slice(),
        [VenueEvent::VenueError { fatal: false, .. }]
    ));
}

/// A snapshot followed by 1 000 synthetic increments never breaks the
/// sort invariant of either side.
#[test]
fn thousand_increments_maintain_sort_invariant() {
    let mut adapter = adapter();
    process(
        &mut adapter,
        json!({
            "channel": "book",
            "type": "snapshot",
            "data": [{
                "symbol": "BTC/USD",
                "bids": [{"price": 50000.0, "qty": 1.0}],
                "asks": [{"price": 50010.0, "qty": 1.0}],
                "checksum": 1u32
            }]
        }),
    );

    let mut seed = 7u64;
    for _ in 0..1_000 {
        seed = seed.wrapping_mul(1664525).wrapping_add(1013904223);
        let offset = (seed % 200) as f64 / 10.0;
        let qty = if seed % 4 == 0 {
            0.0
        } else {
            ((seed >> 8) % 50) as f64 / 10.0 + 0.1
        };
        let (bids, asks) = if seed % 2 == 0 {
            (json!([{"price": 50000.0 - offset, "qty": qty}]), json!([]))
        } else {
            (json!([]), json!([{"price": 50010.0 + offset, "qty": qty}]))
        };
        let events = process(
            &mut adapter,
            json!({
                "channel": "book",
                "type": "update",
                "data": [{"symbol": "BTC/USD", "bids": bids, "asks": asks}]
            }),
        );
        let [VenueEvent::Book(update)] = events.as_slice() else {
            panic!("expected one book event");
        };
        for window in update.book.bids.windows(2) {
            assert!(window[0].price > window[1].price, "bids out of order");
        }
        for window in update.book.asks.windows(2) {
            assert!(window[0].price < window[1].price, "asks out of order");
        }
    }
}

#[test]
fn malformed_frames_are_parse_errors() {
    let mut adapter = adapter();
    for raw in ["not json", "{\"channel\":\"wat\"}", "{}"] {
        let result = adapter.process_message(&text(raw), false);
        assert!(
            matches!(result, Err(services_common::FeedError::Parse(_))),
            "frame {raw:?} should fail"
        );
    }
}
