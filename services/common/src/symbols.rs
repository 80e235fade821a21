//! Symbol normalization and venue renderings
//!
//! Pure string helpers. The stream clients store only the canonical
//! `BASE/QUOTE` form; each venue's wire rendering is derived here on demand.

use crate::market::Market;

/// Quote codes recognized when splitting joined symbols like `BTCUSDT`.
///
/// Longest codes first so `BTCBUSD` splits as BTC/BUSD rather than BTCB/USD.
pub const RECOGNIZED_QUOTES: [&str; 10] = [
    "USDT", "USDC", "BUSD", "BTC", "ETH", "KRW", "USD", "EUR", "GBP", "MX",
];

/// Normalize any supported symbol rendering to uppercase `BASE/QUOTE`.
///
/// Handled forms: `btc/usdt`, `BTC-USDT`, `BTCUSDT`, and Upbit's
/// quote-first `KRW-BTC`. A joined form whose quote is not recognized is
/// returned uppercase unmodified; empty or whitespace input is returned
/// unchanged.
#[must_use]
pub fn normalize(input: &str) -> String {
    if input.trim().is_empty() {
        return input.to_string();
    }
    let upper = input.trim().to_uppercase();

    if upper.contains('/') {
        let parts: Vec<&str> = upper.split('/').collect();
        if parts.len() == 2 && !parts[0].is_empty() && !parts[1].is_empty() {
            return format!("{}/{}", parts[0], parts[1]);
        }
        return upper;
    }

    if upper.contains('-') {
        let parts: Vec<&str> = upper.split('-').collect();
        if parts.len() == 2 && !parts[0].is_empty() && !parts[1].is_empty() {
            // Upbit codes are quote-first; KRW never appears as a base in
            // the dashed renderings we accept.
            if parts[0] == "KRW" {
                return format!("{}/{}", parts[1], parts[0]);
            }
            return format!("{}/{}", parts[0], parts[1]);
        }
        return upper;
    }

    match split_joined(&upper) {
        Some((base, quote)) => format!("{base}/{quote}"),
        None => upper,
    }
}

/// Split a joined symbol (`BTCUSDT`) on the longest recognized quote suffix.
#[must_use]
pub fn split_joined(joined: &str) -> Option<(String, String)> {
    for quote in RECOGNIZED_QUOTES {
        if joined.len() > quote.len() {
            if let Some(base) = joined.strip_suffix(quote) {
                return Some((base.to_string(), quote.to_string()));
            }
        }
    }
    None
}

/// Kraken v2 wire symbol: the canonical form itself (`BTC/USD`)
#[must_use]
pub fn to_kraken(market: &Market) -> String {
    market.canonical()
}

/// Parse a Kraken v2 wire symbol back to a market
#[must_use]
pub fn from_kraken(symbol: &str) -> Option<Market> {
    Market::parse(symbol).ok()
}

/// Bitfinex wire symbol: `t` prefix plus joined pair (`tBTCUSD`)
#[must_use]
pub fn to_bitfinex(market: &Market) -> String {
    format!("t{}{}", market.base(), market.quote())
}

/// Parse a Bitfinex wire symbol (`tBTCUSD`) back to a market
#[must_use]
pub fn from_bitfinex(symbol: &str) -> Option<Market> {
    let joined = symbol.strip_prefix('t').unwrap_or(symbol);
    let (base, quote) = split_joined(&joined.to_uppercase())?;
    Market::new(&base, &quote).ok()
}

/// Bitstamp wire symbol: lowercase joined pair (`btcusd`)
#[must_use]
pub fn to_bitstamp(market: &Market) -> String {
    format!("{}{}", market.base(), market.quote()).to_lowercase()
}

/// Parse a Bitstamp wire symbol (`btcusd`) back to a market
#[must_use]
pub fn from_bitstamp(symbol: &str) -> Option<Market> {
    let (base, quote) = split_joined(&symbol.to_uppercase())?;
    Market::new(&base, &quote).ok()
}

/// MEXC wire symbol: uppercase joined pair (`BTCUSDT`)
#[must_use]
pub fn to_mexc(market: &Market) -> String {
    format!("{}{}", market.base(), market.quote())
}

/// Parse a MEXC wire symbol (`BTCUSDT`) back to a market
#[must_use]
pub fn from_mexc(symbol: &str) -> Option<Market> {
    let (base, quote) = split_joined(&symbol.to_uppercase())?;
    Market::new(&base, &quote).ok()
}

/// Upbit wire code: quote-first dashed pair (`KRW-BTC`)
#[must_use]
pub fn to_upbit(market: &Market) -> String {
    format!("{}-{}", market.quote(), market.base())
}

/// Parse an Upbit wire code (`KRW-BTC`) back to a market
#[must_use]
pub fn from_upbit(code: &str) -> Option<Market> {
    let parts: Vec<&str> = code.split('-').collect();
    if parts.len() != 2 {
        return None;
    }
    Market::new(parts[1], parts[0]).ok()
}
