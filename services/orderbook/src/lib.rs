//! Order-book maintenance engine
//!
//! Takes venue payloads that are either full snapshots or incremental
//! deltas and produces a coherent sorted ladder per symbol. The engine is
//! trust-the-venue: it verifies no sequence numbers and never auto-corrects
//! a crossed book, it only counts the event and publishes the ladder as-is.

pub mod book;

pub use book::{OrderBook, SignedRow};
