//! Canonical market identifier

use crate::error::{FeedError, FeedResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// An immutable (base, quote) currency pair.
///
/// Codes are stored uppercase; equality and hashing are structural. The
/// canonical textual form is `BASE/QUOTE`. Venue-specific renderings
/// (`tBTCUSD`, `btcusd`, `KRW-BTC`, …) are derived on demand by the symbol
/// helpers and never stored in normalized records.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Market {
    base: String,
    quote: String,
}

impl Market {
    /// Create a market from base and quote codes.
    ///
    /// # Errors
    ///
    /// Returns `FeedError::Argument` when either code is empty or contains
    /// a separator.
    pub fn new(base: &str, quote: &str) -> FeedResult<Self> {
        let base = base.trim().to_uppercase();
        let quote = quote.trim().to_uppercase();
        if base.is_empty() || quote.is_empty() {
            return Err(FeedError::Argument(
                "market codes must be non-empty".to_string(),
            ));
        }
        if base.contains('/') || quote.contains('/') {
            return Err(FeedError::Argument(format!(
                "market codes must not contain '/': {base}/{quote}"
            )));
        }
        Ok(Self { base, quote })
    }

    /// Parse the canonical `BASE/QUOTE` form.
    ///
    /// Exactly one `/` with non-empty sides is required; any other shape is
    /// an argument error.
    ///
    /// # Errors
    ///
    /// Returns `FeedError::Argument` for malformed input.
    pub fn parse(s: &str) -> FeedResult<Self> {
        let mut parts = s.split('/');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(base), Some(quote), None) => Self::new(base, quote),
            _ => Err(FeedError::Argument(format!(
                "expected BASE/QUOTE, got {s:?}"
            ))),
        }
    }

    /// Base currency code
    #[must_use]
    pub fn base(&self) -> &str {
        &self.base
    }

    /// Quote currency code
    #[must_use]
    pub fn quote(&self) -> &str {
        &self.quote
    }

    /// Canonical `BASE/QUOTE` rendering
    #[must_use]
    pub fn canonical(&self) -> String {
        format!("{}/{}", self.base, self.quote)
    }
}

impl fmt::Display for Market {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.base, self.quote)
    }
}

impl FromStr for Market {
    type Err = FeedError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
