//! The caller-facing engine error taxonomy.

use thiserror::Error;

use toolforge_registry::RegistryError;
use toolforge_store::StoreError;
use toolforge_types::{LifecycleError, SpecError};

use crate::adapter::ProviderError;
use crate::budget::BudgetScope;

/// Everything a caller of the engine can observe going wrong.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Capability not authorized for the subject. Fatal, never retried.
    #[error(transparent)]
    Permission(#[from] RegistryError),

    /// Advisory backpressure: retry after the reported delay, do not abort.
    #[error("rate limited on integration '{integration_id}', retry after {retry_after_seconds}s")]
    RateLimited {
        integration_id: String,
        retry_after_seconds: u64,
    },

    /// Upstream provider failure; retryable only for 429/5xx.
    #[error(transparent)]
    Provider(#[from] ProviderError),

    /// Another worker owns the execution record. Fatal for this caller,
    /// informational for the system.
    #[error("execution '{execution_id}' is already locked by another worker")]
    AlreadyLocked { execution_id: String },

    /// Lifecycle guard violated or transition raced.
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),

    /// Monthly or per-run quota exhausted; surfaced before any provider call.
    #[error("budget exceeded for {scope}: {used}/{limit} calls")]
    BudgetExceeded { scope: BudgetScope, used: u64, limit: u64 },

    /// The spec violated a structural invariant.
    #[error(transparent)]
    Spec(#[from] SpecError),

    /// The action requires approval and the invocation is not approved.
    #[error("action '{action_id}' requires approval before dispatch")]
    ApprovalRequired { action_id: String },

    /// The spec references an action id the invocation plan does not declare.
    #[error("unknown action '{action_id}' in plan")]
    UnknownAction { action_id: String },

    /// No runtime adapter registered for the integration.
    #[error("no adapter registered for integration '{integration_id}'")]
    MissingAdapter { integration_id: String },

    /// The organization has no stored credentials for the integration.
    #[error("no credentials connected for integration '{integration_id}'")]
    MissingCredentials { integration_id: String },

    /// Durable-store failure.
    #[error(transparent)]
    Store(#[from] StoreError),
}
