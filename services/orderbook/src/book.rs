//! Core ladder implementation

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use services_common::{BookLevel, OrderBookData, Side};

/// A signed Bitfinex-style book row: (price, count, amount).
///
/// count = 0 deletes the level at `price`; amount > 0 places the row on the
/// bid side, amount < 0 on the ask side, with |amount| as the quantity.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct SignedRow {
    /// Price level
    pub price: Decimal,
    /// Orders at this level; zero is the delete sentinel
    pub count: u32,
    /// Signed quantity; the sign selects the side
    pub amount: Decimal,
}

impl SignedRow {
    /// Create a row from its wire triple
    #[must_use]
    pub const fn new(price: Decimal, count: u32, amount: Decimal) -> Self {
        Self {
            price,
            count,
            amount,
        }
    }

    /// Side implied by the amount sign
    #[must_use]
    pub fn side(&self) -> Side {
        if self.amount.is_sign_negative() {
            Side::Ask
        } else {
            Side::Bid
        }
    }
}

/// Sorted two-sided ladder for one symbol.
///
/// Bids are kept strictly descending by price, asks strictly ascending; a
/// price appears at most once per side. The event timestamp is monotonically
/// non-decreasing across applied updates within a session.
#[derive(Clone, Debug, Default)]
pub struct OrderBook {
    bids: Vec<BookLevel>,
    asks: Vec<BookLevel>,
    ts: i64,
    crossed_events: u64,
}

impl OrderBook {
    /// Create an empty book
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the full state from a snapshot frame.
    ///
    /// Zero-quantity rows are dropped; both sides are re-sorted.
    pub fn apply_snapshot(&mut self, bids: Vec<BookLevel>, asks: Vec<BookLevel>, ts: i64) {
        self.bids = bids.into_iter().filter(|l| l.qty > Decimal::ZERO).collect();
        self.asks = asks.into_iter().filter(|l| l.qty > Decimal::ZERO).collect();
        self.bids.sort_by(|a, b| b.price.cmp(&a.price));
        self.asks.sort_by(|a, b| a.price.cmp(&b.price));
        self.bump_ts(ts);
        self.note_cross();
    }

    /// Apply incremental (price, qty) rows to one side.
    ///
    /// qty = 0 removes the level at that exact price (no-op when absent);
    /// otherwise an existing level is overwritten in place and a new price
    /// is inserted keeping the side sorted.
    pub fn apply_deltas(&mut self, side: Side, levels: Vec<BookLevel>, ts: i64) {
        for level in levels {
            Self::apply_level(Self::side_mut_inner(&mut self.bids, &mut self.asks, side), side, level);
        }
        self.bump_ts(ts);
        self.note_cross();
    }

    /// Apply one signed-amount row (Bitfinex book encoding).
    pub fn apply_signed(&mut self, row: SignedRow, ts: i64) {
        let side = row.side();
        let levels = Self::side_mut_inner(&mut self.bids, &mut self.asks, side);
        if row.count == 0 {
            levels.retain(|l| l.price != row.price);
        } else {
            let level = BookLevel::new(row.price, row.amount.abs()).with_count(row.count);
            Self::apply_level(levels, side, level);
        }
        self.bump_ts(ts);
        self.note_cross();
    }

    /// Apply a full signed snapshot (array-of-rows frame).
    pub fn apply_signed_snapshot(&mut self, rows: Vec<SignedRow>, ts: i64) {
        self.bids.clear();
        self.asks.clear();
        for row in rows {
            if row.count == 0 {
                continue;
            }
            let side = row.side();
            let level = BookLevel::new(row.price, row.amount.abs()).with_count(row.count);
            Self::side_mut_inner(&mut self.bids, &mut self.asks, side).push(level);
        }
        self.bids.sort_by(|a, b| b.price.cmp(&a.price));
        self.asks.sort_by(|a, b| a.price.cmp(&b.price));
        self.bump_ts(ts);
        self.note_cross();
    }

    fn apply_level(levels: &mut Vec<BookLevel>, side: Side, level: BookLevel) {
        if level.qty.is_zero() {
            levels.retain(|l| l.price != level.price);
            return;
        }
        if let Some(existing) = levels.iter_mut().find(|l| l.price == level.price) {
            *existing = level;
            return;
        }
        levels.push(level);
        match side {
            Side::Bid => levels.sort_by(|a, b| b.price.cmp(&a.price)),
            Side::Ask => levels.sort_by(|a, b| a.price.cmp(&b.price)),
        }
    }

    fn side_mut_inner<'a>(
        bids: &'a mut Vec<BookLevel>,
        asks: &'a mut Vec<BookLevel>,
        side: Side,
    ) -> &'a mut Vec<BookLevel> {
        match side {
            Side::Bid => bids,
            Side::Ask => asks,
        }
    }

    fn bump_ts(&mut self, ts: i64) {
        if ts > self.ts {
            self.ts = ts;
        }
    }

    fn note_cross(&mut self) {
        if self.is_crossed() {
            self.crossed_events += 1;
        }
    }

    /// Best bid level
    #[must_use]
    pub fn best_bid(&self) -> Option<&BookLevel> {
        self.bids.first()
    }

    /// Best ask level
    #[must_use]
    pub fn best_ask(&self) -> Option<&BookLevel> {
        self.asks.first()
    }

    /// Ask minus bid, when both sides are populated
    #[must_use]
    pub fn spread(&self) -> Option<Decimal> {
        match (self.best_bid(), self.best_ask()) {
            (Some(bid), Some(ask)) => Some(ask.price - bid.price),
            _ => None,
        }
    }

    /// Midpoint of best bid and ask
    #[must_use]
    pub fn mid(&self) -> Option<Decimal> {
        match (self.best_bid(), self.best_ask()) {
            (Some(bid), Some(ask)) => Some((bid.price + ask.price) / Decimal::TWO),
            _ => None,
        }
    }

    /// True when best bid >= best ask
    #[must_use]
    pub fn is_crossed(&self) -> bool {
        match (self.best_bid(), self.best_ask()) {
            (Some(bid), Some(ask)) => bid.price >= ask.price,
            _ => false,
        }
    }

    /// Times a mutation left the book crossed this session
    #[must_use]
    pub const fn crossed_events(&self) -> u64 {
        self.crossed_events
    }

    /// Levels per side
    #[must_use]
    pub fn depth(&self) -> (usize, usize) {
        (self.bids.len(), self.asks.len())
    }

    /// Last event timestamp, Unix milliseconds
    #[must_use]
    pub const fn ts(&self) -> i64 {
        self.ts
    }

    /// True when neither side holds a level
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bids.is_empty() && self.asks.is_empty()
    }

    /// Drop all levels, keeping the crossed-event counter.
    ///
    /// Called on reconnect so the next snapshot arrives into a known state.
    pub fn clear(&mut self) {
        self.bids.clear();
        self.asks.clear();
        self.ts = 0;
    }

    /// Snapshot the current ladder into a normalized record
    #[must_use]
    pub fn to_data(&self) -> OrderBookData {
        OrderBookData {
            bids: self.bids.clone(),
            asks: self.asks.clone(),
            ts: self.ts,
        }
    }
}
