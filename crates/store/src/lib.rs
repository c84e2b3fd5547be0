//! Durable-store boundary for the Toolforge engine.
//!
//! The engine is a stateless worker: execution records, tool lifecycle rows,
//! and snapshots live in a relational store, and every mutation that carries a
//! correctness guarantee is an atomic conditional write. The one primitive the
//! core cannot do without is the conditional update returning success or
//! zero-rows; the traits here express that as
//! [`StoreError::ConditionFailed`].
//!
//! [`MemoryStore`] implements the exact CAS semantics in process memory for
//! tests and single-process deployments.

mod error;
mod memory;
mod traits;

pub use error::StoreError;
pub use memory::MemoryStore;
pub use traits::{ExecutionStore, SnapshotStore, Store, ToolStore};
