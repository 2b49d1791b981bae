//! Error types for peer-gossip core.

use thiserror::Error;

/// Errors raised while converting core types to and from CBOR.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("encoding error: {0}")]
    EncodingError(String),

    #[error("decoding error: {0}")]
    DecodingError(String),

    #[error("malformed clock: {0}")]
    MalformedClock(String),

    #[error("malformed delta: {0}")]
    MalformedDelta(String),

    #[error("malformed snapshot: {0}")]
    MalformedSnapshot(String),

    #[error("counter overflow for actor {0}")]
    CounterOverflow(String),
}
