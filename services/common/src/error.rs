//! Error taxonomy shared by the stream clients and venue adapters

use thiserror::Error;

/// Errors surfaced by feed components.
///
/// Only `Argument` is returned synchronously to callers; everything else
/// travels through the client's error events and the observer.
#[derive(Debug, Error)]
pub enum FeedError {
    /// Transport-level failure (connect, send, receive, close)
    #[error("transport error: {0}")]
    Transport(String),

    /// Venue returned an explicit error frame
    #[error("venue error: {message}")]
    Protocol {
        /// Venue-supplied error text
        message: String,
        /// True when the venue marks the condition terminal
        fatal: bool,
    },

    /// Payload shape did not match the venue schema
    #[error("parse error: {0}")]
    Parse(String),

    /// The venue does not offer the requested capability
    #[error("not supported by venue: {0}")]
    Contract(String),

    /// Malformed caller input
    #[error("invalid argument: {0}")]
    Argument(String),
}

impl FeedError {
    /// True when the condition should tear the connection down
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Protocol { fatal: true, .. })
    }
}

/// Result alias used across the feed crates
pub type FeedResult<T> = Result<T, FeedError>;
