//! Main Crate Error

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
/// prefix-dht crate error enum.
pub enum Error {
    /// Two identities that were expected to share the network's id length don't.
    #[error("Identity length mismatch: expected {expected} bytes, got {actual}")]
    IdLengthMismatch { expected: usize, actual: usize },

    /// Identities must be at least one byte long.
    #[error("Invalid identity size: {0}")]
    InvalidIdSize(usize),

    /// Failed to parse message bytes.
    #[error("Failed to decode message: {0}")]
    Decode(&'static str),

    /// A field is too large for its length prefix on the wire.
    #[error("Failed to encode message: {0}")]
    Encode(&'static str),

    /// Identities packed in one response must all have the same length.
    #[error("Identities in one response must share a length")]
    MixedIdLengths,
}

/// Alias for results returned by this crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;
