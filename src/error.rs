use thiserror::Error as ThisError;

/// Error taxonomy for the transport core. These are kinds, not layers of
/// wrapping: every fallible operation in the core returns one of these.
#[derive(Debug, ThisError)]
pub enum Error {
    /// Producer exhausted its attempts: the cursor pool is saturated or
    /// there isn't enough free range ahead of the read head.
    #[error("ring is full")]
    Full,

    /// Consumer exhausted its attempts: no complete record is available.
    #[error("ring is empty")]
    Empty,

    /// Window queue push with a timestamp below the current lower bound.
    #[error("record timestamp {timestamp_ns} is below the window's lower bound {lower_ns}")]
    OutOfOrder { timestamp_ns: i64, lower_ns: i64 },

    /// Window queue operation attempted after `close()`.
    #[error("window queue is closed")]
    Closed,

    /// Record decode asked for a type different from the stored tag.
    #[error("expected argument type {expected:?}, found {found:?}")]
    TypeMismatch { expected: &'static str, found: &'static str },

    /// OS-level failure: shared-memory open, map, truncate, or unlink.
    #[error("system error: {0}")]
    SystemError(#[from] std::io::Error),
}

/// Result alias used at the public API boundary.
pub type Status<T> = Result<T, Error>;
