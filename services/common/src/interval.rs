//! Candle-interval helpers
//!
//! Canonical form is lowercase number+unit with unit in {m, h, d, w}, plus
//! `1M` for the calendar month. Venue renderings are derived from the
//! canonical form.

/// Milliseconds per minute
pub const MINUTE_MS: u64 = 60_000;
/// Milliseconds per hour
pub const HOUR_MS: u64 = 3_600_000;
/// Milliseconds per day
pub const DAY_MS: u64 = 86_400_000;
/// Milliseconds per week
pub const WEEK_MS: u64 = 604_800_000;
/// Milliseconds per month (30-day approximation)
pub const MONTH_MS: u64 = 2_592_000_000;

/// Convert a canonical interval to milliseconds.
///
/// Unknown or malformed inputs default to one hour.
#[must_use]
pub fn interval_to_ms(interval: &str) -> u64 {
    let Some((count, unit)) = split_interval(interval) else {
        return HOUR_MS;
    };
    let unit_ms = match unit {
        'm' => MINUTE_MS,
        'h' => HOUR_MS,
        'd' => DAY_MS,
        'w' => WEEK_MS,
        'M' => MONTH_MS,
        _ => return HOUR_MS,
    };
    count * unit_ms
}

/// Split `"15m"` into `(15, 'm')`; None when the shape does not match
#[must_use]
pub fn split_interval(interval: &str) -> Option<(u64, char)> {
    let unit = interval.chars().last()?;
    if !matches!(unit, 'm' | 'h' | 'd' | 'w' | 'M') {
        return None;
    }
    let count: u64 = interval[..interval.len() - 1].parse().ok()?;
    if count == 0 {
        return None;
    }
    Some((count, unit))
}

/// Total minutes for an interval, used by minute-granular venues
fn interval_minutes(interval: &str) -> Option<u64> {
    let (count, unit) = split_interval(interval)?;
    match unit {
        'm' => Some(count),
        'h' => Some(count * 60),
        _ => None,
    }
}

/// Upbit rendering: minute count for intraday, `D`/`W`/`M` otherwise
#[must_use]
pub fn to_upbit(interval: &str) -> String {
    if let Some(minutes) = interval_minutes(interval) {
        return minutes.to_string();
    }
    match split_interval(interval) {
        Some((_, 'd')) => "D".to_string(),
        Some((_, 'w')) => "W".to_string(),
        Some((_, 'M')) => "M".to_string(),
        _ => "60".to_string(),
    }
}

/// Bybit rendering: identical to Upbit's
#[must_use]
pub fn to_bybit(interval: &str) -> String {
    to_upbit(interval)
}

/// Huobi rendering: `1min`, `60min`, `4hour`, `1day`, `1week`, `1mon`
#[must_use]
pub fn to_huobi(interval: &str) -> String {
    match split_interval(interval) {
        Some((n, 'm')) => format!("{n}min"),
        Some((1, 'h')) => "60min".to_string(),
        Some((n, 'h')) => format!("{n}hour"),
        Some((n, 'd')) => format!("{n}day"),
        Some((n, 'w')) => format!("{n}week"),
        Some((n, 'M')) => format!("{n}mon"),
        _ => "60min".to_string(),
    }
}

/// Bittrex rendering: `MINUTE_1`, `HOUR_1`, `DAY_1`
#[must_use]
pub fn to_bittrex(interval: &str) -> String {
    match split_interval(interval) {
        Some((n, 'm')) => format!("MINUTE_{n}"),
        Some((n, 'h')) => format!("HOUR_{n}"),
        Some((n, 'd')) => format!("DAY_{n}"),
        _ => "HOUR_1".to_string(),
    }
}

/// Crypto.com rendering: uppercase unit, weeks as day multiples (`7D`)
#[must_use]
pub fn to_cryptocom(interval: &str) -> String {
    match split_interval(interval) {
        Some((n, 'm')) => format!("{n}M"),
        Some((n, 'h')) => format!("{n}H"),
        Some((n, 'd')) => format!("{n}D"),
        Some((n, 'w')) => format!("{}D", n * 7),
        _ => interval.to_uppercase(),
    }
}

/// MEXC kline rendering: `Min1`, `Min60`, `Hour4`, `Day1`, `Week1`, `Month1`
#[must_use]
pub fn to_mexc(interval: &str) -> String {
    match split_interval(interval) {
        Some((n, 'm')) => format!("Min{n}"),
        Some((1, 'h')) => "Min60".to_string(),
        Some((n, 'h')) => format!("Hour{n}"),
        Some((n, 'd')) => format!("Day{n}"),
        Some((n, 'w')) => format!("Week{n}"),
        Some((n, 'M')) => format!("Month{n}"),
        _ => "Min60".to_string(),
    }
}

/// Bitfinex candle key timeframe: the canonical form itself (`1m`, `1h`)
#[must_use]
pub fn to_bitfinex(interval: &str) -> String {
    interval.to_string()
}
