//! The materialization engine.
//!
//! One pass folds an action plan's outputs into the next snapshot: successes
//! are written at their spec-derived state paths and recorded per action and
//! per integration, failures land in the error log without aborting their
//! siblings, and the resulting status drives the tool's lifecycle. Snapshots
//! are append-only; the previous snapshot is the starting point and none of
//! its paths are removed on a partial run.

use std::sync::Arc;

use chrono::Utc;
use serde_json::{Value, json};
use tracing::{debug, info};
use uuid::Uuid;

use toolforge_store::{SnapshotStore, ToolStore};
use toolforge_types::{
    ActionFailure, MaterializationStatus, SnapshotRecords, ToolLifecycleState, ToolSnapshot, ToolSpec,
};

use crate::error::EngineError;
use crate::lifecycle::LifecycleDriver;
use crate::paths::write_at_path;

/// One action's outcome from plan execution.
#[derive(Debug, Clone)]
pub struct ActionOutput {
    pub action_id: String,
    pub integration_id: String,
    /// Normalized payload; present only on success.
    pub output: Option<Value>,
    pub error: Option<String>,
}

impl ActionOutput {
    pub fn succeeded(&self) -> bool {
        self.error.is_none() && self.output.is_some()
    }
}

/// Result of one materialization pass.
#[derive(Debug, Clone)]
pub struct MaterializeOutcome {
    pub status: MaterializationStatus,
    pub record_count: u64,
    pub snapshot_id: String,
}

/// Folds action outputs into snapshots and drives the lifecycle machine.
pub struct Materializer<S> {
    store: Arc<S>,
    lifecycle: LifecycleDriver<S>,
}

impl<S: SnapshotStore + ToolStore> Materializer<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self {
            lifecycle: LifecycleDriver::new(Arc::clone(&store)),
            store,
        }
    }

    /// Run one materialization pass and persist the resulting snapshot.
    ///
    /// Outputs are folded in the order given, which is completion order at
    /// the call site; spec validation guarantees disjoint state paths, so
    /// ordering is unobservable in `state`. The `actions`/`integrations`
    /// maps are last-write-wins per key.
    pub async fn materialize(
        &self,
        tool_id: &str,
        org_id: &str,
        spec: &ToolSpec,
        action_outputs: &[ActionOutput],
        previous: Option<&SnapshotRecords>,
    ) -> Result<MaterializeOutcome, EngineError> {
        let mut records = previous.cloned().unwrap_or_else(SnapshotRecords::empty);
        let mut error_log: Vec<ActionFailure> = Vec::new();

        for outcome in action_outputs {
            if let (true, Some(output)) = (outcome.succeeded(), outcome.output.as_ref()) {
                let paths = match spec.action(&outcome.action_id) {
                    Some(action) => spec.state_paths_for_action(action),
                    None => vec![format!("{}.data", outcome.integration_id)],
                };
                for path in &paths {
                    debug!(action = %outcome.action_id, path = %path, "writing action output");
                    write_at_path(&mut records.state, path, output.clone());
                }
                records.actions.insert(outcome.action_id.clone(), output.clone());
                records.integrations.insert(outcome.integration_id.clone(), output.clone());
            } else {
                error_log.push(ActionFailure {
                    action_id: outcome.action_id.clone(),
                    integration_id: outcome.integration_id.clone(),
                    message: outcome.error.clone().unwrap_or_else(|| "no output produced".to_string()),
                });
            }
        }

        // All-failed is the only failure shape; zero records from successful
        // calls is valid data, not failure.
        let all_failed = !action_outputs.is_empty() && action_outputs.iter().all(|outcome| !outcome.succeeded());
        let status = if all_failed {
            MaterializationStatus::Failed
        } else {
            MaterializationStatus::Materialized
        };
        let record_count = records.record_count();

        let snapshot = ToolSnapshot {
            id: Uuid::new_v4().to_string(),
            tool_id: tool_id.to_string(),
            org_id: org_id.to_string(),
            schema: schema_of(spec),
            records,
            record_count,
            status,
            error_log,
            materialized_at: Utc::now(),
        };
        let snapshot = self.store.append_snapshot(snapshot).await?;

        info!(
            tool = %tool_id,
            snapshot = %snapshot.id,
            status = ?status,
            record_count,
            failed_actions = snapshot.error_log.len(),
            "materialization pass finished"
        );

        let target = match status {
            MaterializationStatus::Materialized => ToolLifecycleState::Materialized,
            MaterializationStatus::Failed => ToolLifecycleState::Failed,
        };
        if self.lifecycle.state(tool_id).await? != target {
            self.lifecycle.transition(tool_id, target).await?;
        }

        Ok(MaterializeOutcome {
            status,
            record_count,
            snapshot_id: snapshot.id,
        })
    }
}

/// The spec-derived shape stored alongside each snapshot.
fn schema_of(spec: &ToolSpec) -> Value {
    json!({
        "entities": spec.entities,
        "views": spec.views,
    })
}
