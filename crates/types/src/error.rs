//! Typed errors for spec validation and lifecycle guarding.

use thiserror::Error;

use crate::lifecycle::ToolLifecycleState;

/// Structural invariant violations in a tool spec.
#[derive(Debug, Clone, Error)]
pub enum SpecError {
    #[error("duplicate action id '{action_id}'")]
    DuplicateActionId { action_id: String },

    #[error("duplicate entity '{name}'")]
    DuplicateEntity { name: String },

    #[error("view '{view_id}' binds unknown action '{action_id}'")]
    UnknownViewAction { view_id: String, action_id: String },

    #[error("view '{view_id}' references unknown entity '{entity}'")]
    UnknownViewEntity { view_id: String, entity: String },

    /// Two state-writing actions derived the same state path; outputs merge
    /// in completion order, so this would race silently at runtime.
    #[error("state path '{path}' is claimed by both '{first_action}' and '{second_action}'")]
    StatePathCollision {
        path: String,
        first_action: String,
        second_action: String,
    },

    #[error("action '{action_id}' references capability '{capability_id}' not registered for integration '{integration_id}'")]
    UnknownActionCapability {
        action_id: String,
        integration_id: String,
        capability_id: String,
    },
}

/// Lifecycle guard violations and transition races.
#[derive(Debug, Clone, Error)]
pub enum LifecycleError {
    /// The requested edge does not exist in the transition table. Always a
    /// programming or race bug in the caller.
    #[error("illegal lifecycle transition {from} -> {to}")]
    IllegalTransition {
        from: ToolLifecycleState,
        to: ToolLifecycleState,
    },

    /// The conditional write's predicate failed: another process moved the
    /// tool first. Callers must re-read and decide, never blindly retry.
    #[error("lifecycle transition conflict on tool '{tool_id}': expected {expected}")]
    Conflict {
        tool_id: String,
        expected: ToolLifecycleState,
    },

    #[error("unknown lifecycle state '{value}'")]
    UnknownState { value: String },
}
