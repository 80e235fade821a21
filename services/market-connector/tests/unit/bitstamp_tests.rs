//! Bitstamp adapter wire-format and diff-merging tests

use market_connector::exchanges::BitstampAdapter;
use market_connector::{VenueAdapter, VenueEvent, WireMessage};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::{json, Value};
use services_common::{Channel, FeedError, Market, Side, SubscriptionDescriptor};
use std::collections::BTreeMap;

fn text(raw: impl Into<String>) -> WireMessage {
    WireMessage::Text(raw.into())
}

fn process(adapter: &mut BitstampAdapter, frame: Value) -> Vec<VenueEvent> {
    adapter
        .process_message(&text(frame.to_string()), false)
        .expect("frame should parse")
}

fn diff_sub() -> SubscriptionDescriptor {
    SubscriptionDescriptor::new(Channel::Orderbook, "BTC/USD", Some("diff".to_string()))
}

#[test]
fn subscribe_frames_match_wire_shapes() {
    let adapter = BitstampAdapter::new();

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
        json!({"event": "bts:subscribe", "data": {"channel": "order_book_btcusd"}})
    );

    let frame = adapter.subscribe_frame(&diff_sub()).unwrap();
    let value: Value = serde_json::from_str(&frame).unwrap();
    assert_eq!(
        value,
        json!({"event": "bts:subscribe", "data": {"channel": "diff_order_book_btcusd"}})
    );

    let frame = adapter
        .subscribe_frame(&SubscriptionDescriptor::new(
            Channel::Trades,
            "BTC/USD",
            None,
        ))
        .unwrap();
    let value: Value = serde_json::from_str(&frame).unwrap();
    assert_eq!(
        value,
        json!({"event": "bts:subscribe", "data": {"channel": "live_trades_btcusd"}})
    );
}

#[test]
fn ticker_and_candles_are_contract_errors() {
    let adapter = BitstampAdapter::new();
    for channel in [Channel::Ticker, Channel::Candles] {
        let result =
            adapter.subscribe_frame(&SubscriptionDescriptor::new(channel, "BTC/USD", None));
        assert!(matches!(result, Err(FeedError::Contract(_))));
    }
}

#[test]
fn symbol_format_is_lowercase_joined() {
    let adapter = BitstampAdapter::new();
    let market = Market::parse("BTC/USD").unwrap();
    assert_eq!(adapter.format_symbol(&market), "btcusd");
}

#[test]
fn no_application_ping() {
    assert!(BitstampAdapter::new().create_ping_message().is_none());
    assert!(!BitstampAdapter::new().supports_batch_subscription());
}

#[test]
fn reconnect_request_and_heartbeat() {
    let mut adapter = BitstampAdapter::new();
    let events = process(&mut adapter, json!({"event": "bts:request_reconnect"}));
    assert!(matches!(events.as_slice(), [VenueEvent::ReconnectRequest]));

    let events = process(&mut adapter, json!({"event": "bts:heartbeat"}));
    assert!(matches!(events.as_slice(), [VenueEvent::Heartbeat]));
}

#[test]
fn trade_frame_normalizes_taker_side() {
    let mut adapter = BitstampAdapter::new();
    let events = process(
        &mut adapter,
        json!({
            "event": "trade",
            "channel": "live_trades_btcusd",
            "data": {
                "id": 287_654_321u64,
                "timestamp": "1714521600",
                "microtimestamp": "1714521600123456",
                "amount": 0.25, "amount_str": "0.25",
                "price": 50000.5, "price_str": "50000.5",
                "type": 1
            }
        }),
    );
    let [VenueEvent::Trades(batch)] = events.as_slice() else {
        panic!("expected trades, got {events:?}");
    };
    assert_eq!(batch.symbol, "BTC/USD");
    assert_eq!(batch.ts, 1_714_521_600_123);
    assert_eq!(batch.trades[0].side, Side::Ask);
    assert_eq!(batch.trades[0].price, dec!(50000.5));
    assert_eq!(batch.trades[0].qty, dec!(0.25));
}

fn book_frame(channel: &str, bids: &[(i64, i64)], asks: &[(i64, i64)], us: i64) -> Value {
    let render = |rows: &[(i64, i64)]| -> Vec<[String; 2]> {
        rows.iter()
            .map(|(p, q)| [format!("{p}.0"), format!("0.{q:03}")])
            .collect()
    };
    json!({
        "event": "data",
        "channel": channel,
        "data": {
            "timestamp": (us / 1_000_000).to_string(),
            "microtimestamp": us.to_string(),
            "bids": render(bids),
            "asks": render(asks)
        }
    })
}

#[test]
fn full_book_frames_replace_state() {
    let mut adapter = BitstampAdapter::new();
    let events = process(
        &mut adapter,
        book_frame(
            "order_book_btcusd",
            &[(50001, 2), (50003, 1)],
            &[(50007, 3), (50005, 1)],
            1_714_521_600_000_000,
        ),
    );
    let [VenueEvent::Book(update)] = events.as_slice() else {
        panic!("expected book, got {events:?}");
    };
    assert_eq!(update.book.bids[0].price, dec!(50003));
    assert_eq!(update.book.asks[0].price, dec!(50005));
    assert_eq!(update.book.ts, 1_714_521_600_000);
}

/// One order-book snapshot followed by 100 diff frames; the final best
/// bid/ask must match a reference ladder maintained independently.
#[test]
fn diff_merging_matches_reference() {
    let mut adapter = BitstampAdapter::new();
    let mut reference_bids: BTreeMap<Decimal, Decimal> = BTreeMap::new();
    let mut reference_asks: BTreeMap<Decimal, Decimal> = BTreeMap::new();

    // Seed snapshot
    let seed_bids = [(49995, 10), (49996, 20), (49997, 30), (49998, 40), (49999, 50)];
    let seed_asks = [(50001, 50), (50002, 40), (50003, 30), (50004, 20), (50005, 10)];
    process(
        &mut adapter,
        book_frame(
            "order_book_btcusd",
            &seed_bids,
            &seed_asks,
            1_714_521_600_000_000,
        ),
    );
    for (p, q) in seed_bids {
        reference_bids.insert(Decimal::from(p), Decimal::new(q, 3));
    }
    for (p, q) in seed_asks {
        reference_asks.insert(Decimal::from(p), Decimal::new(q, 3));
    }

    // 100 deterministic diffs: a pseudo-random walk of inserts, updates
    // and deletes on both sides
    let mut seed = 2024u64;
    let mut last_book = None;
    for i in 0..100 {
        seed = seed.wrapping_mul(1664525).wrapping_add(1013904223);
        let bid_price = 49990 + (seed % 10) as i64;
        let ask_price = 50001 + (seed % 10) as i64;
        let bid_qty = ((seed >> 8) % 100) as i64; // 0 deletes
        let ask_qty = ((seed >> 16) % 100) as i64;

        let frame = book_frame(
            "diff_order_book_btcusd",
            &[(bid_price, bid_qty)],
            &[(ask_price, ask_qty)],
            1_714_521_600_000_000 + (i + 1) * 1_000_000,
        );
        let events = process(&mut adapter, frame);
        let [VenueEvent::Book(update)] = events.as_slice() else {
            panic!("expected book, got {events:?}");
        };
        last_book = Some(update.book.clone());

        let bid_key = Decimal::from(bid_price);
        if bid_qty == 0 {
            reference_bids.remove(&bid_key);
        } else {
            reference_bids.insert(bid_key, Decimal::new(bid_qty, 3));
        }
        let ask_key = Decimal::from(ask_price);
        if ask_qty == 0 {
            reference_asks.remove(&ask_key);
        } else {
            reference_asks.insert(ask_key, Decimal::new(ask_qty, 3));
        }
    }

    let book = last_book.expect("no book emitted");
    let expected_best_bid = reference_bids.iter().next_back().expect("bids empty");
    let expected_best_ask = reference_asks.iter().next().expect("asks empty");

    assert_eq!(book.bids[0].price, *expected_best_bid.0);
    assert_eq!(book.bids[0].qty, *expected_best_bid.1);
    assert_eq!(book.asks[0].price, *expected_best_ask.0);
    assert_eq!(book.asks[0].qty, *expected_best_ask.1);
    assert_eq!(book.bids.len(), reference_bids.len());
    assert_eq!(book.asks.len(), reference_asks.len());
}
