//! # Error Types
//!
//! Error taxonomy for the shared object framework. Replication decode
//! failures are deliberately absent from most public signatures: malformed
//! inbound state is recovered by resetting to the empty object, never
//! propagated (see the codec module).

use thiserror::Error;

/// Errors surfaced by the shared object framework.
#[derive(Debug, Error)]
pub enum RoomError {
    /// Local state could not be rendered to the wire format.
    #[error("failed to encode shared state: {0}")]
    Encode(serde_json::Error),

    /// A replicated string could not be decoded. Callers treat this as
    /// "state reset", not as a fatal condition.
    #[error("malformed replicated state: {0}")]
    Decode(String),

    /// The component's async data load failed. Fatal for that one object
    /// only; siblings are unaffected.
    #[error("data load failed: {0}")]
    Load(String),

    /// An operation that requires a live connection was attempted while
    /// disconnected.
    #[error("not connected to the room")]
    NotConnected,

    /// The host scene node was removed while an operation was in flight.
    #[error("scene node no longer exists")]
    NodeGone,
}

/// Result type used throughout the crate.
pub type RoomResult<T> = Result<T, RoomError>;
