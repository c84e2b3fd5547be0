//! Store error types.

/// All errors a store implementation can return.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A conditional update's predicate matched zero rows — another worker
    /// changed the row first. The caller decides what the conflict means
    /// (lock already held, raced lifecycle transition, stale status).
    #[error("conditional update failed for {entity} '{id}': {detail}")]
    ConditionFailed {
        entity: &'static str,
        id: String,
        detail: String,
    },

    /// No row with the given id.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// An insert collided with an existing row.
    #[error("{entity} already exists: {id}")]
    Duplicate { entity: &'static str, id: String },

    /// Backend-specific failure (connection, serialization).
    #[error("storage backend error: {0}")]
    Backend(String),
}
