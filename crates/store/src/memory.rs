//! In-memory store backend.
//!
//! All rows live behind one mutex, so every conditional update checks its
//! predicate and applies its write atomically — the same observable semantics
//! a relational `UPDATE ... WHERE` with an affected-row count provides. Used
//! by the test suites and by single-process deployments.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use toolforge_types::{ExecutionRecord, ExecutionStatus, ToolLifecycleState, ToolSnapshot};

use crate::error::StoreError;
use crate::traits::{ExecutionStore, SnapshotStore, ToolStore};

#[derive(Default)]
struct Inner {
    executions: HashMap<String, ExecutionRecord>,
    tools: HashMap<String, (String, ToolLifecycleState)>,
    snapshots: Vec<ToolSnapshot>,
}

/// Process-local store with exact conditional-write semantics.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        // Lock poisoning only happens if a writer panicked; the data itself
        // is still consistent because every mutation is applied in one step.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl ExecutionStore for MemoryStore {
    async fn insert_execution(&self, record: ExecutionRecord) -> Result<ExecutionRecord, StoreError> {
        let mut inner = self.lock();
        if inner.executions.contains_key(&record.id) {
            return Err(StoreError::Duplicate {
                entity: "execution",
                id: record.id,
            });
        }
        // Partial unique index on the idempotency key: one active record per
        // (org, tool, prompt_hash); failed records do not block retries.
        let active_clash = inner.executions.values().any(|existing| {
            existing.org_id == record.org_id
                && existing.tool_id == record.tool_id
                && existing.prompt_hash == record.prompt_hash
                && existing.status != ExecutionStatus::Failed
        });
        if active_clash {
            return Err(StoreError::Duplicate {
                entity: "execution",
                id: record.prompt_hash,
            });
        }
        inner.executions.insert(record.id.clone(), record.clone());
        Ok(record)
    }

    async fn execution(&self, id: &str) -> Result<Option<ExecutionRecord>, StoreError> {
        Ok(self.lock().executions.get(id).cloned())
    }

    async fn find_active_by_prompt_hash(
        &self,
        org_id: &str,
        tool_id: &str,
        prompt_hash: &str,
    ) -> Result<Option<ExecutionRecord>, StoreError> {
        let inner = self.lock();
        let mut matches: Vec<&ExecutionRecord> = inner
            .executions
            .values()
            .filter(|record| {
                record.org_id == org_id
                    && record.tool_id == tool_id
                    && record.prompt_hash == prompt_hash
                    && record.status != ExecutionStatus::Failed
            })
            .collect();
        matches.sort_by_key(|record| record.created_at);
        Ok(matches.last().map(|record| (*record).clone()))
    }

    async fn acquire_execution_lock(
        &self,
        id: &str,
        lock_token: &str,
        now: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Result<ExecutionRecord, StoreError> {
        let mut inner = self.lock();
        let record = inner.executions.get_mut(id).ok_or(StoreError::NotFound {
            entity: "execution",
            id: id.to_string(),
        })?;

        let unlocked = record.status == ExecutionStatus::Created && record.lock_token.is_none();
        let expired = !record.status.is_terminal() && !record.is_locked_at(now) && record.lock_token.is_some();
        if !(unlocked || expired) {
            return Err(StoreError::ConditionFailed {
                entity: "execution",
                id: id.to_string(),
                detail: format!("lock held, status {}", record.status.as_str()),
            });
        }

        record.lock_token = Some(lock_token.to_string());
        record.lock_acquired_at = Some(now);
        record.lock_expires_at = Some(expires_at);
        record.status = ExecutionStatus::Compiling;
        record.updated_at = now;
        Ok(record.clone())
    }

    async fn update_execution_status(
        &self,
        id: &str,
        from: ExecutionStatus,
        to: ExecutionStatus,
        error: Option<String>,
    ) -> Result<ExecutionRecord, StoreError> {
        let mut inner = self.lock();
        let record = inner.executions.get_mut(id).ok_or(StoreError::NotFound {
            entity: "execution",
            id: id.to_string(),
        })?;
        if record.status != from {
            return Err(StoreError::ConditionFailed {
                entity: "execution",
                id: id.to_string(),
                detail: format!("expected status {}, found {}", from.as_str(), record.status.as_str()),
            });
        }
        record.status = to;
        record.error = error;
        record.updated_at = Utc::now();
        Ok(record.clone())
    }

    async fn release_execution_lock(&self, id: &str, lock_token: &str) -> Result<ExecutionRecord, StoreError> {
        let mut inner = self.lock();
        let record = inner.executions.get_mut(id).ok_or(StoreError::NotFound {
            entity: "execution",
            id: id.to_string(),
        })?;
        if record.lock_token.as_deref() != Some(lock_token) {
            return Err(StoreError::ConditionFailed {
                entity: "execution",
                id: id.to_string(),
                detail: "lock token does not own this record".to_string(),
            });
        }
        record.lock_token = None;
        record.lock_acquired_at = None;
        record.lock_expires_at = None;
        record.updated_at = Utc::now();
        Ok(record.clone())
    }

    async fn record_integrations(
        &self,
        id: &str,
        required: Vec<String>,
        missing: Vec<String>,
    ) -> Result<ExecutionRecord, StoreError> {
        let mut inner = self.lock();
        let record = inner.executions.get_mut(id).ok_or(StoreError::NotFound {
            entity: "execution",
            id: id.to_string(),
        })?;
        record.required_integrations = required;
        record.missing_integrations = missing;
        record.updated_at = Utc::now();
        Ok(record.clone())
    }
}

#[async_trait]
impl ToolStore for MemoryStore {
    async fn upsert_tool(&self, tool_id: &str, org_id: &str, state: ToolLifecycleState) -> Result<(), StoreError> {
        self.lock().tools.insert(tool_id.to_string(), (org_id.to_string(), state));
        Ok(())
    }

    async fn tool_state(&self, tool_id: &str) -> Result<ToolLifecycleState, StoreError> {
        self.lock()
            .tools
            .get(tool_id)
            .map(|(_, state)| *state)
            .ok_or(StoreError::NotFound {
                entity: "tool",
                id: tool_id.to_string(),
            })
    }

    async fn compare_and_swap_state(
        &self,
        tool_id: &str,
        from: ToolLifecycleState,
        to: ToolLifecycleState,
    ) -> Result<ToolLifecycleState, StoreError> {
        let mut inner = self.lock();
        let (_, state) = inner.tools.get_mut(tool_id).ok_or(StoreError::NotFound {
            entity: "tool",
            id: tool_id.to_string(),
        })?;
        if *state != from {
            return Err(StoreError::ConditionFailed {
                entity: "tool",
                id: tool_id.to_string(),
                detail: format!("expected state {from}, found {state}"),
            });
        }
        *state = to;
        Ok(to)
    }
}

#[async_trait]
impl SnapshotStore for MemoryStore {
    async fn append_snapshot(&self, snapshot: ToolSnapshot) -> Result<ToolSnapshot, StoreError> {
        let mut inner = self.lock();
        if inner.snapshots.iter().any(|existing| existing.id == snapshot.id) {
            return Err(StoreError::Duplicate {
                entity: "snapshot",
                id: snapshot.id,
            });
        }
        inner.snapshots.push(snapshot.clone());
        Ok(snapshot)
    }

    async fn latest_snapshot(&self, tool_id: &str, org_id: &str) -> Result<Option<ToolSnapshot>, StoreError> {
        let inner = self.lock();
        Ok(inner
            .snapshots
            .iter()
            .filter(|snapshot| snapshot.tool_id == tool_id && snapshot.org_id == org_id)
            .max_by_key(|snapshot| snapshot.materialized_at)
            .cloned())
    }

    async fn snapshots(&self, tool_id: &str, org_id: &str) -> Result<Vec<ToolSnapshot>, StoreError> {
        let inner = self.lock();
        let mut rows: Vec<ToolSnapshot> = inner
            .snapshots
            .iter()
            .filter(|snapshot| snapshot.tool_id == tool_id && snapshot.org_id == org_id)
            .cloned()
            .collect();
        rows.sort_by_key(|snapshot| snapshot.materialized_at);
        Ok(rows)
    }
}
