//! Venue adapter implementations

pub mod bitfinex;
pub mod bitstamp;
pub mod kraken;
pub mod mexc;

pub use bitfinex::BitfinexAdapter;
pub use bitstamp::BitstampAdapter;
pub use kraken::KrakenAdapter;
pub use mexc::MexcAdapter;

use rust_decimal::Decimal;
use serde_json::Value;
use services_common::{FeedError, FeedResult};
use std::str::FromStr;

/// Exact decimal from a JSON number or string.
///
/// serde_json renders numbers with their shortest round-trip form, so
/// parsing that text keeps venue prices exact without a float detour.
pub(crate) fn decimal_from(value: &Value) -> FeedResult<Decimal> {
    match value {
        Value::String(s) => {
            Decimal::from_str(s).map_err(|e| FeedError::Parse(format!("bad decimal {s:?}: {e}")))
        }
        Value::Number(n) => Decimal::from_str(&n.to_string())
            .map_err(|e| FeedError::Parse(format!("bad decimal {n}: {e}"))),
        other => Err(FeedError::Parse(format!("expected number, got {other}"))),
    }
}

/// Unix milliseconds from an RFC 3339 timestamp
pub(crate) fn millis_from_rfc3339(raw: &str) -> FeedResult<i64> {
    chrono::DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.timestamp_millis())
        .map_err(|e| FeedError::Parse(format!("bad timestamp {raw:?}: {e}")))
}
