//! # Toolforge Engine
//!
//! The execution core for compiled internal tools. Given a declarative
//! [`ToolSpec`](toolforge_types::ToolSpec), the engine runs the spec's
//! capability-backed actions against third-party providers, merges the
//! results into a durable versioned snapshot, and drives the tool through a
//! guarded lifecycle — under concurrency and partial provider failure.
//!
//! ## Architecture
//!
//! - **`adapter`**: the uniform contract each integration implements to
//!   execute one named capability with a resolved auth context
//! - **`rate_limit`**: advisory fixed-window backpressure per integration
//! - **`retry`**: bounded exponential backoff with jitter around any call
//! - **`coordinator`**: per-key serialization plus idempotent execution
//!   dedup and CAS-guarded lock acquisition
//! - **`materialize`**: folds action outputs into snapshots and computes
//!   the overall status
//! - **`lifecycle`**: CAS-guarded transitions over the tool state machine
//! - **`budget`**: per-run and monthly quota gates, checked before any
//!   provider call
//! - **`engine`**: the caller-facing facade wiring all of the above
//!
//! Correctness rests on two properties: lock acquisition and lifecycle
//! transitions are single atomic conditional writes in the store, and the
//! per-key queues serialize same-key work within one process. Everything
//! else is tolerant of partial failure by construction.

pub mod adapter;
pub mod budget;
pub mod coordinator;
pub mod engine;
pub mod error;
pub mod lifecycle;
pub mod materialize;
pub mod paths;
pub mod rate_limit;
pub mod retry;

pub use adapter::{AuthContext, ProviderError, RuntimeAdapter, StaticAdapter, apply_param_defaults, unwrap_envelope};
pub use budget::{BudgetConfig, BudgetScope, BudgetTracker};
pub use coordinator::{CoordinatorConfig, ExecutionCoordinator, KeyedSerializer};
pub use engine::{ActionInvocation, EngineConfig, ExecutionEngine, ExecutionOutcome};
pub use error::EngineError;
pub use lifecycle::LifecycleDriver;
pub use materialize::{ActionOutput, MaterializeOutcome, Materializer};
pub use rate_limit::{RateDecision, RateLimitConfig, RateLimiter, WindowRule};
pub use retry::{RetryOptions, backoff_delay, with_retry};
