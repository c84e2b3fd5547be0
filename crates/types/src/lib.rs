//! Shared type definitions for the Toolforge execution core.
//!
//! This crate holds the data model exchanged between the compiler stage, the
//! capability registry, the execution engine, and the durable store:
//!
//! - **`spec`**: the declarative tool spec (entities, actions, views)
//! - **`capability`**: permission-gated operations an integration exposes
//! - **`execution`**: execution records and the idempotency key
//! - **`snapshot`**: merged, append-only materialization snapshots
//! - **`lifecycle`**: the guarded tool lifecycle state machine table

pub mod capability;
pub mod error;
pub mod execution;
pub mod lifecycle;
pub mod snapshot;
pub mod spec;

pub use capability::{AccessMode, AllowedOperation, Capability, CapabilityConstraints, OperationKind};
pub use error::{LifecycleError, SpecError};
pub use execution::{ExecutionRecord, ExecutionStatus, normalize_prompt, prompt_hash};
pub use lifecycle::ToolLifecycleState;
pub use snapshot::{ActionFailure, MaterializationStatus, SnapshotRecords, ToolSnapshot};
pub use spec::{ActionKind, ActionSpec, EntitySpec, ToolSpec, ViewSpec};
