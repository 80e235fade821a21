//! Shared types for the tickstream market-data platform
//!
//! Everything venue-independent lives here: the normalized record shapes
//! every adapter decodes into, the market/interval/symbol helpers, and the
//! error taxonomy the stream clients surface.

pub mod error;
pub mod interval;
pub mod market;
pub mod subscription;
pub mod symbols;
pub mod types;

pub use error::{FeedError, FeedResult};
pub use market::Market;
pub use subscription::{SubscriptionDescriptor, SubscriptionKey};
pub use types::{
    now_millis, BookLevel, BookUpdate, Candle, Channel, LevelAction, OrderBookData, OrderType,
    Side, Ticker, Trade, TradeBatch,
};
