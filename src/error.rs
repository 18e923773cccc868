//! Error taxonomy shared by the workers and the control plane.

use thiserror::Error;

/// All failure modes the engine distinguishes. Control-plane callers map
/// these onto HTTP statuses; workers decide retry/abort behavior by variant.
#[derive(Debug, Error)]
pub enum IndexerError {
    /// Malformed input (bad address, out-of-range knob, invalid URL).
    /// Never retried.
    #[error("validation error: {0}")]
    Validation(String),

    /// Unknown chain id.
    #[error("chain {0} not found")]
    NotFound(u64),

    /// Attempt to add a chain id that already exists.
    #[error("chain {0} already exists")]
    Conflict(u64),

    /// Transient RPC connectivity failure that survived the retry budget.
    /// Fails the current tick; the next tick starts fresh.
    #[error("rpc unavailable: {0}")]
    RpcUnavailable(String),

    /// A log did not match the expected FeesCollected shape.
    #[error("log decode failed: {0}")]
    Decode(String),

    /// Persistence failure. Unique-key collisions on insert are absorbed
    /// before this is ever constructed.
    #[error("store error: {0}")]
    Store(#[from] sqlx::Error),

    /// A programming invariant was violated.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Shorthand for results carrying [`IndexerError`].
pub type Result<T> = std::result::Result<T, IndexerError>;
