//! Storage traits for the Toolforge execution backends.
//!
//! Implementations provide durable rows for execution records, tool lifecycle
//! state, and snapshots over any relational backend. All correctness-bearing
//! mutations are conditional updates: the predicate is evaluated atomically
//! with the write, and a predicate that matches zero rows surfaces as
//! [`StoreError::ConditionFailed`] rather than silently succeeding.
//!
//! Implementations must be `Send + Sync + 'static` so they can be shared
//! across async task boundaries.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use toolforge_types::{ExecutionRecord, ExecutionStatus, ToolLifecycleState, ToolSnapshot};

use crate::error::StoreError;

/// Durable storage for execution records and their single-flight locks.
#[async_trait]
pub trait ExecutionStore: Send + Sync + 'static {
    /// Insert a new record.
    ///
    /// Fails with [`StoreError::Duplicate`] on an id clash *or* when a
    /// non-failed record already exists for the same `(org_id, tool_id,
    /// prompt_hash)` — the backend equivalent of a partial unique index on
    /// the idempotency key. Two concurrent submitters therefore converge on
    /// one row: the insert loser re-reads by hash and races for its lock.
    async fn insert_execution(&self, record: ExecutionRecord) -> Result<ExecutionRecord, StoreError>;

    /// Read a record by id.
    async fn execution(&self, id: &str) -> Result<Option<ExecutionRecord>, StoreError>;

    /// Find the most recent non-failed record for an idempotency key.
    ///
    /// Failed records do not count: a failed attempt must not block a retry
    /// of the same prompt.
    async fn find_active_by_prompt_hash(
        &self,
        org_id: &str,
        tool_id: &str,
        prompt_hash: &str,
    ) -> Result<Option<ExecutionRecord>, StoreError>;

    /// Atomically acquire the execution lock:
    ///
    /// `SET lock_token, lock_acquired_at, lock_expires_at, status='compiling'
    ///  WHERE (status='created' AND lock_token IS NULL)
    ///     OR (status not terminal AND lock_expires_at < now)`
    ///
    /// The second arm reclaims locks whose holder crashed. Zero rows affected
    /// surfaces as [`StoreError::ConditionFailed`]; the coordinator maps that
    /// to its "already locked" error.
    async fn acquire_execution_lock(
        &self,
        id: &str,
        lock_token: &str,
        now: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Result<ExecutionRecord, StoreError>;

    /// Conditionally advance a record's status:
    /// `SET status=to, error WHERE id AND status=from`.
    async fn update_execution_status(
        &self,
        id: &str,
        from: ExecutionStatus,
        to: ExecutionStatus,
        error: Option<String>,
    ) -> Result<ExecutionRecord, StoreError>;

    /// Release the lock if (and only if) `lock_token` still owns it.
    async fn release_execution_lock(&self, id: &str, lock_token: &str) -> Result<ExecutionRecord, StoreError>;

    /// Record the integrations a compiled spec requires and which of them the
    /// organization is missing. Plain keyed update; carries no guarantee.
    async fn record_integrations(
        &self,
        id: &str,
        required: Vec<String>,
        missing: Vec<String>,
    ) -> Result<ExecutionRecord, StoreError>;
}

/// Durable storage for the lifecycle-bearing tool row.
#[async_trait]
pub trait ToolStore: Send + Sync + 'static {
    /// Register a tool row (or reset an existing one) at the given state.
    async fn upsert_tool(&self, tool_id: &str, org_id: &str, state: ToolLifecycleState) -> Result<(), StoreError>;

    /// Read a tool's current lifecycle state.
    async fn tool_state(&self, tool_id: &str) -> Result<ToolLifecycleState, StoreError>;

    /// Atomically transition the lifecycle state:
    /// `SET status=to WHERE id AND status=from`.
    ///
    /// The prior state is the CAS predicate, so two concurrent transition
    /// attempts cannot both succeed from the same state. Zero rows affected
    /// surfaces as [`StoreError::ConditionFailed`].
    async fn compare_and_swap_state(
        &self,
        tool_id: &str,
        from: ToolLifecycleState,
        to: ToolLifecycleState,
    ) -> Result<ToolLifecycleState, StoreError>;
}

/// Durable, append-only storage for materialization snapshots.
#[async_trait]
pub trait SnapshotStore: Send + Sync + 'static {
    /// Append a new immutable snapshot row. Never updates in place.
    async fn append_snapshot(&self, snapshot: ToolSnapshot) -> Result<ToolSnapshot, StoreError>;

    /// The most recent snapshot for a tool, by `materialized_at`.
    async fn latest_snapshot(&self, tool_id: &str, org_id: &str) -> Result<Option<ToolSnapshot>, StoreError>;

    /// Full snapshot history for a tool, oldest first.
    async fn snapshots(&self, tool_id: &str, org_id: &str) -> Result<Vec<ToolSnapshot>, StoreError>;
}

/// Convenience supertrait for backends implementing the full surface.
pub trait Store: ExecutionStore + ToolStore + SnapshotStore {}

impl<T: ExecutionStore + ToolStore + SnapshotStore> Store for T {}
