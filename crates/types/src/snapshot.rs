//! Materialization snapshots.
//!
//! A snapshot is the immutable result of one materialization pass: the merged
//! nested `state` object plus per-action and per-integration output maps.
//! Rows are append-only; "latest" is the most recent `materialized_at`.

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Overall status of a materialization pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MaterializationStatus {
    Materialized,
    Failed,
}

/// One action's failure, recorded without aborting sibling actions.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionFailure {
    pub action_id: String,
    pub integration_id: String,
    pub message: String,
}

/// The merged records of a snapshot.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SnapshotRecords {
    /// Nested state object, keyed by dot-separated paths at write time.
    #[serde(default)]
    pub state: Value,
    /// Last output per action id.
    #[serde(default)]
    pub actions: IndexMap<String, Value>,
    /// Last output per integration id.
    #[serde(default)]
    pub integrations: IndexMap<String, Value>,
}

impl SnapshotRecords {
    /// An empty snapshot with an object-typed state root.
    pub fn empty() -> Self {
        Self {
            state: Value::Object(Default::default()),
            actions: IndexMap::new(),
            integrations: IndexMap::new(),
        }
    }

    /// Count of materialized records: array outputs contribute their length,
    /// any other truthy output contributes one.
    pub fn record_count(&self) -> u64 {
        self.actions
            .values()
            .map(|output| match output {
                Value::Array(items) => items.len() as u64,
                Value::Null => 0,
                Value::Bool(false) => 0,
                _ => 1,
            })
            .sum()
    }
}

/// One immutable snapshot row as persisted by the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolSnapshot {
    pub id: String,
    pub tool_id: String,
    pub org_id: String,
    /// Spec-derived schema the snapshot was materialized against.
    pub schema: Value,
    pub records: SnapshotRecords,
    pub record_count: u64,
    pub status: MaterializationStatus,
    /// Per-action failures from the pass that produced this snapshot.
    #[serde(default)]
    pub error_log: Vec<ActionFailure>,
    pub materialized_at: DateTime<Utc>,
}
