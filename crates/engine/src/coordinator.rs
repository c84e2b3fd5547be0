//! Execution coordination: per-key serialization and single-flight locking.
//!
//! Two independent primitives live here. [`KeyedSerializer`] chains tasks
//! submitted under the same key into a FIFO queue while different keys run in
//! parallel — it protects same-key work *within one process* only.
//! [`ExecutionCoordinator`] is the cross-process half: it deduplicates
//! logically-identical requests by idempotency key and acquires exclusive
//! execution locks through the store's conditional writes, which is the
//! load-bearing correctness property of the whole core.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, info};
use uuid::Uuid;

use toolforge_store::{ExecutionStore, StoreError};
use toolforge_types::{ExecutionRecord, ExecutionStatus, normalize_prompt, prompt_hash};

use crate::error::EngineError;

/// Chains same-key tasks into a FIFO queue; distinct keys run in parallel.
///
/// Backed by a map of per-key async mutexes (tokio's mutex queues waiters
/// fairly, which gives the FIFO ordering).
#[derive(Default)]
pub struct KeyedSerializer {
    lanes: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl KeyedSerializer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `task` once every earlier task under `key` has finished.
    pub async fn run<T>(&self, key: &str, task: impl Future<Output = T>) -> T {
        let lane = {
            let mut lanes = self.lanes.lock().expect("serializer lane map lock");
            Arc::clone(lanes.entry(key.to_string()).or_default())
        };
        let _guard = lane.lock().await;
        task.await
    }
}

/// Coordinator tuning.
#[derive(Debug, Clone, Copy)]
pub struct CoordinatorConfig {
    /// How long an acquired lock is honored before another worker may
    /// reclaim it from a crashed holder.
    pub lock_ttl: Duration,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            lock_ttl: Duration::from_secs(300),
        }
    }
}

/// Deduplicates execution requests and owns the lock acquisition dance.
pub struct ExecutionCoordinator<S> {
    store: Arc<S>,
    config: CoordinatorConfig,
    serializer: KeyedSerializer,
}

impl<S: ExecutionStore> ExecutionCoordinator<S> {
    pub fn new(store: Arc<S>, config: CoordinatorConfig) -> Self {
        Self {
            store,
            config,
            serializer: KeyedSerializer::new(),
        }
    }

    /// Submit one logical execution request.
    ///
    /// Computes the idempotency key for `(tool_id, prompt)` and:
    /// - returns the existing non-failed record for that key, if any —
    ///   no new work is started;
    /// - otherwise inserts a fresh `created` record and atomically acquires
    ///   it (`SET lock_token, status='compiling' WHERE status='created' AND
    ///   lock_token IS NULL`). Losing the conditional update means another
    ///   worker owns the record: this caller fails with
    ///   [`EngineError::AlreadyLocked`].
    ///
    /// At most one worker ever compiles/executes a given (tool, normalized
    /// prompt) pair concurrently.
    pub async fn submit(&self, org_id: &str, tool_id: &str, prompt: &str) -> Result<ExecutionRecord, EngineError> {
        let hash = prompt_hash(tool_id, prompt);
        let lane_key = format!("submit:{hash}");
        self.serializer.run(&lane_key, self.submit_inner(org_id, tool_id, prompt, &hash)).await
    }

    async fn submit_inner(&self, org_id: &str, tool_id: &str, prompt: &str, hash: &str) -> Result<ExecutionRecord, EngineError> {
        if let Some(existing) = self.store.find_active_by_prompt_hash(org_id, tool_id, hash).await? {
            debug!(tool = %tool_id, prompt_hash = %hash, execution = %existing.id, "deduplicated execution request");
            return Ok(existing);
        }

        let now = Utc::now();
        let record = ExecutionRecord {
            id: Uuid::new_v4().to_string(),
            org_id: org_id.to_string(),
            tool_id: tool_id.to_string(),
            prompt_hash: hash.to_string(),
            normalized_prompt: normalize_prompt(prompt),
            status: ExecutionStatus::Created,
            lock_token: None,
            lock_acquired_at: None,
            lock_expires_at: None,
            required_integrations: vec![],
            missing_integrations: vec![],
            error: None,
            created_at: now,
            updated_at: now,
        };

        // Insertion is unique per active idempotency key; losing the insert
        // race funnels this caller onto the winner's record.
        let record = match self.store.insert_execution(record).await {
            Ok(record) => record,
            Err(StoreError::Duplicate { .. }) => self
                .store
                .find_active_by_prompt_hash(org_id, tool_id, hash)
                .await?
                .ok_or_else(|| EngineError::AlreadyLocked {
                    execution_id: hash.to_string(),
                })?,
            Err(error) => return Err(error.into()),
        };

        self.acquire(&record.id).await
    }

    /// Acquire the execution lock for a record, reclaiming expired locks.
    pub async fn acquire(&self, execution_id: &str) -> Result<ExecutionRecord, EngineError> {
        let token = Uuid::new_v4().to_string();
        let now = Utc::now();
        let expires_at = now + chrono::Duration::from_std(self.config.lock_ttl).expect("lock ttl fits chrono range");

        match self.store.acquire_execution_lock(execution_id, &token, now, expires_at).await {
            Ok(record) => {
                info!(execution = %execution_id, lock_token = %token, "execution lock acquired");
                Ok(record)
            }
            Err(StoreError::ConditionFailed { .. }) => Err(EngineError::AlreadyLocked {
                execution_id: execution_id.to_string(),
            }),
            Err(error) => Err(error.into()),
        }
    }

    /// Conditionally advance a record's status.
    pub async fn advance(&self, execution_id: &str, from: ExecutionStatus, to: ExecutionStatus) -> Result<ExecutionRecord, EngineError> {
        Ok(self.store.update_execution_status(execution_id, from, to, None).await?)
    }

    /// Record the integrations the compiled spec requires and which of them
    /// are not connected for the organization.
    pub async fn record_integrations(
        &self,
        execution_id: &str,
        required: Vec<String>,
        connected: &[String],
    ) -> Result<ExecutionRecord, EngineError> {
        let missing: Vec<String> = required
            .iter()
            .filter(|integration| !connected.iter().any(|connected| connected == *integration))
            .cloned()
            .collect();
        Ok(self.store.record_integrations(execution_id, required, missing).await?)
    }

    /// Complete a record: `executing → completed`, lock released.
    pub async fn complete(&self, execution_id: &str, lock_token: &str) -> Result<ExecutionRecord, EngineError> {
        self.store
            .update_execution_status(execution_id, ExecutionStatus::Executing, ExecutionStatus::Completed, None)
            .await?;
        Ok(self.store.release_execution_lock(execution_id, lock_token).await?)
    }

    /// Fail a record from whatever non-terminal status it is in, releasing
    /// the lock if this worker holds it.
    pub async fn fail(&self, execution_id: &str, lock_token: Option<&str>, error: &str) -> Result<ExecutionRecord, EngineError> {
        let current = self
            .store
            .execution(execution_id)
            .await?
            .ok_or(StoreError::NotFound {
                entity: "execution",
                id: execution_id.to_string(),
            })?;
        if current.status.is_terminal() {
            return Ok(current);
        }
        let record = self
            .store
            .update_execution_status(execution_id, current.status, ExecutionStatus::Failed, Some(error.to_string()))
            .await?;
        if let Some(token) = lock_token {
            return Ok(self.store.release_execution_lock(execution_id, token).await?);
        }
        Ok(record)
    }

    /// Serialize arbitrary work under a caller-chosen key (per-integration
    /// bookkeeping, per-tool build serialization).
    pub async fn serialized<T>(&self, key: &str, task: impl Future<Output = T>) -> T {
        self.serializer.run(key, task).await
    }
}
