//! Conditional-write conformance suite for store backends.
//!
//! Any backend claiming the `Store` traits must pass these; they pin the
//! zero-rows-affected semantics the engine's correctness rests on.

use chrono::{Duration, Utc};
use serde_json::json;

use toolforge_store::{ExecutionStore, MemoryStore, SnapshotStore, StoreError, ToolStore};
use toolforge_types::{
    ExecutionRecord, ExecutionStatus, MaterializationStatus, SnapshotRecords, ToolLifecycleState, ToolSnapshot, prompt_hash,
};

fn new_record(id: &str, tool_id: &str, prompt: &str) -> ExecutionRecord {
    let now = Utc::now();
    ExecutionRecord {
        id: id.to_string(),
        org_id: "org-1".to_string(),
        tool_id: tool_id.to_string(),
        prompt_hash: prompt_hash(tool_id, prompt),
        normalized_prompt: prompt.to_string(),
        status: ExecutionStatus::Created,
        lock_token: None,
        lock_acquired_at: None,
        lock_expires_at: None,
        required_integrations: vec![],
        missing_integrations: vec![],
        error: None,
        created_at: now,
        updated_at: now,
    }
}

fn new_snapshot(id: &str, tool_id: &str, at_offset_secs: i64) -> ToolSnapshot {
    ToolSnapshot {
        id: id.to_string(),
        tool_id: tool_id.to_string(),
        org_id: "org-1".to_string(),
        schema: json!({}),
        records: SnapshotRecords::empty(),
        record_count: 0,
        status: MaterializationStatus::Materialized,
        error_log: vec![],
        materialized_at: Utc::now() + Duration::seconds(at_offset_secs),
    }
}

#[tokio::test]
async fn lock_acquisition_is_exclusive() {
    let store = MemoryStore::new();
    store.insert_execution(new_record("exec-1", "tool-1", "list open issues")).await.unwrap();

    let now = Utc::now();
    let expires = now + Duration::minutes(5);
    let locked = store.acquire_execution_lock("exec-1", "worker-a", now, expires).await.unwrap();
    assert_eq!(locked.status, ExecutionStatus::Compiling);
    assert_eq!(locked.lock_token.as_deref(), Some("worker-a"));

    let second = store.acquire_execution_lock("exec-1", "worker-b", now, expires).await;
    assert!(matches!(second, Err(StoreError::ConditionFailed { .. })));
}

#[tokio::test]
async fn expired_lock_is_reclaimable() {
    let store = MemoryStore::new();
    store.insert_execution(new_record("exec-1", "tool-1", "list open issues")).await.unwrap();

    let t0 = Utc::now();
    store
        .acquire_execution_lock("exec-1", "worker-a", t0, t0 + Duration::seconds(30))
        .await
        .unwrap();

    // Holder crashed; after expiry another worker takes over.
    let later = t0 + Duration::seconds(31);
    let reclaimed = store
        .acquire_execution_lock("exec-1", "worker-b", later, later + Duration::seconds(30))
        .await
        .unwrap();
    assert_eq!(reclaimed.lock_token.as_deref(), Some("worker-b"));
}

#[tokio::test]
async fn status_update_requires_expected_prior_status() {
    let store = MemoryStore::new();
    store.insert_execution(new_record("exec-1", "tool-1", "p")).await.unwrap();

    let advanced = store
        .update_execution_status("exec-1", ExecutionStatus::Created, ExecutionStatus::Failed, Some("boom".into()))
        .await
        .unwrap();
    assert_eq!(advanced.status, ExecutionStatus::Failed);

    let stale = store
        .update_execution_status("exec-1", ExecutionStatus::Created, ExecutionStatus::Compiling, None)
        .await;
    assert!(matches!(stale, Err(StoreError::ConditionFailed { .. })));
}

#[tokio::test]
async fn release_requires_owning_token() {
    let store = MemoryStore::new();
    store.insert_execution(new_record("exec-1", "tool-1", "p")).await.unwrap();
    let now = Utc::now();
    store
        .acquire_execution_lock("exec-1", "worker-a", now, now + Duration::minutes(5))
        .await
        .unwrap();

    let foreign = store.release_execution_lock("exec-1", "worker-b").await;
    assert!(matches!(foreign, Err(StoreError::ConditionFailed { .. })));

    let released = store.release_execution_lock("exec-1", "worker-a").await.unwrap();
    assert!(released.lock_token.is_none());
}

#[tokio::test]
async fn failed_records_do_not_satisfy_dedup_lookup() {
    let store = MemoryStore::new();
    let record = new_record("exec-1", "tool-1", "list open issues");
    let hash = record.prompt_hash.clone();
    store.insert_execution(record).await.unwrap();
    store
        .update_execution_status("exec-1", ExecutionStatus::Created, ExecutionStatus::Failed, Some("boom".into()))
        .await
        .unwrap();

    let found = store.find_active_by_prompt_hash("org-1", "tool-1", &hash).await.unwrap();
    assert!(found.is_none(), "failed record must not block a retry");
}

#[tokio::test]
async fn one_active_record_per_idempotency_key() {
    let store = MemoryStore::new();
    store.insert_execution(new_record("exec-1", "tool-1", "list open issues")).await.unwrap();

    let clash = store.insert_execution(new_record("exec-2", "tool-1", "list open issues")).await;
    assert!(matches!(clash, Err(StoreError::Duplicate { .. })));

    // A failed record stops blocking the key.
    store
        .update_execution_status("exec-1", ExecutionStatus::Created, ExecutionStatus::Failed, Some("boom".into()))
        .await
        .unwrap();
    store.insert_execution(new_record("exec-2", "tool-1", "list open issues")).await.unwrap();
}

#[tokio::test]
async fn lifecycle_cas_rejects_stale_prior_state() {
    let store = MemoryStore::new();
    store.upsert_tool("tool-1", "org-1", ToolLifecycleState::Created).await.unwrap();

    store
        .compare_and_swap_state("tool-1", ToolLifecycleState::Created, ToolLifecycleState::Executing)
        .await
        .unwrap();

    // A second worker still believing the tool is CREATED loses the race.
    let stale = store
        .compare_and_swap_state("tool-1", ToolLifecycleState::Created, ToolLifecycleState::Executing)
        .await;
    assert!(matches!(stale, Err(StoreError::ConditionFailed { .. })));
    assert_eq!(store.tool_state("tool-1").await.unwrap(), ToolLifecycleState::Executing);
}

#[tokio::test]
async fn snapshots_are_append_only_with_latest_by_time() {
    let store = MemoryStore::new();
    store.append_snapshot(new_snapshot("snap-1", "tool-1", 0)).await.unwrap();
    store.append_snapshot(new_snapshot("snap-2", "tool-1", 10)).await.unwrap();

    let clash = store.append_snapshot(new_snapshot("snap-2", "tool-1", 20)).await;
    assert!(matches!(clash, Err(StoreError::Duplicate { .. })));

    let latest = store.latest_snapshot("tool-1", "org-1").await.unwrap().unwrap();
    assert_eq!(latest.id, "snap-2");

    let history = store.snapshots("tool-1", "org-1").await.unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].id, "snap-1");
}
