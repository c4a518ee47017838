//! Error types for the synchronization engine.

use thiserror::Error;

/// Result type alias for engine operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur inside the synchronization engine.
///
/// Only user-actionable failures cross the engine boundary; infrastructure
/// failures such as a single cache write are absorbed at the component
/// that observed them and reported through boolean returns.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SyncError {
    /// A network call failed and will be retried or backed off.
    #[error("Transient network failure: {0}")]
    Transient(String),

    /// A local storage read or write failed.
    #[error("Local persistence failure: {0}")]
    Persistence(String),

    /// The server rejected the request; retrying cannot help.
    #[error("Server rejected the request with status {status}")]
    Rejected { status: u16 },

    /// Serialization or deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// An operation targeted a task that is not in the canonical collection.
    #[error("Unknown task: {0}")]
    UnknownTask(String),
}
