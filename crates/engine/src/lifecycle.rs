//! CAS-guarded lifecycle transitions.
//!
//! The transition table lives in `toolforge_types::lifecycle`; this driver
//! performs the actual conditional writes. A transition that loses its CAS
//! raises [`LifecycleError::Conflict`] — the caller re-reads and decides,
//! never blindly retries the same edge.

use std::sync::Arc;

use tracing::info;

use toolforge_store::{StoreError, ToolStore};
use toolforge_types::{LifecycleError, ToolLifecycleState, lifecycle::assert_legal_transition};

use crate::error::EngineError;

/// Drives a tool's lifecycle state through the store's conditional writes.
pub struct LifecycleDriver<S> {
    store: Arc<S>,
}

impl<S: ToolStore> LifecycleDriver<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Current state of a tool.
    pub async fn state(&self, tool_id: &str) -> Result<ToolLifecycleState, EngineError> {
        Ok(self.store.tool_state(tool_id).await?)
    }

    /// Transition from the tool's current state to `to`.
    ///
    /// Reads the current state, guards the edge against the table, then
    /// issues the CAS with the read state as predicate.
    pub async fn transition(&self, tool_id: &str, to: ToolLifecycleState) -> Result<ToolLifecycleState, EngineError> {
        let from = self.store.tool_state(tool_id).await?;
        self.transition_from(tool_id, from, to).await
    }

    /// Transition with an explicit expected prior state.
    pub async fn transition_from(
        &self,
        tool_id: &str,
        from: ToolLifecycleState,
        to: ToolLifecycleState,
    ) -> Result<ToolLifecycleState, EngineError> {
        assert_legal_transition(from, to)?;
        match self.store.compare_and_swap_state(tool_id, from, to).await {
            Ok(state) => {
                info!(tool = %tool_id, from = %from, to = %to, "lifecycle transition");
                Ok(state)
            }
            Err(StoreError::ConditionFailed { .. }) => Err(LifecycleError::Conflict {
                tool_id: tool_id.to_string(),
                expected: from,
            }
            .into()),
            Err(error) => Err(error.into()),
        }
    }
}
