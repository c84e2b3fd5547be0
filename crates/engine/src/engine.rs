//! The caller-facing execution engine.
//!
//! Wires the registry, budget gate, rate limiter, retry policy, and runtime
//! adapters behind the operations a caller sees: submit an execution request,
//! run an action plan, materialize its outputs, transition lifecycle state.
//!
//! Dispatch happens in two phases. Every invocation is checked up front —
//! action resolution, approval, permission, budget, rate limit, credentials —
//! so all pre-dispatch failures surface before a single provider call is
//! made. The surviving calls then run concurrently, each wrapped in the
//! retry policy, and their outputs are collected in completion order.

use std::collections::HashMap;
use std::sync::Arc;

use futures_util::stream::{FuturesUnordered, StreamExt};
use serde_json::Value;
use tokio::time::Instant;
use tracing::{debug, info};

use toolforge_registry::{CapabilityRegistry, SubjectPermissions};
use toolforge_store::Store;
use toolforge_types::{
    ExecutionRecord, ExecutionStatus, MaterializationStatus, SnapshotRecords, ToolLifecycleState, ToolSpec,
};

use crate::adapter::{AuthContext, RuntimeAdapter};
use crate::budget::{BudgetConfig, BudgetTracker};
use crate::coordinator::{CoordinatorConfig, ExecutionCoordinator};
use crate::error::EngineError;
use crate::lifecycle::LifecycleDriver;
use crate::materialize::{ActionOutput, MaterializeOutcome, Materializer};
use crate::rate_limit::{RateDecision, RateLimitConfig, RateLimiter};
use crate::retry::{RetryOptions, with_retry};

/// One action call in a plan.
#[derive(Debug, Clone)]
pub struct ActionInvocation {
    pub action_id: String,
    pub params: Value,
    /// Set when a human approved this invocation; required for actions
    /// declared with `requires_approval`.
    pub approved: bool,
}

impl ActionInvocation {
    pub fn new(action_id: &str, params: Value) -> Self {
        Self {
            action_id: action_id.to_string(),
            params,
            approved: false,
        }
    }

    pub fn approved(mut self) -> Self {
        self.approved = true;
        self
    }
}

/// How an owned execution request ended.
#[derive(Debug)]
pub enum ExecutionOutcome {
    /// The plan ran and a snapshot was persisted.
    Completed {
        record: ExecutionRecord,
        outcome: MaterializeOutcome,
    },
    /// The spec needs integrations the organization has not connected; the
    /// record is parked in `compiled` until they are.
    MissingIntegrations { record: ExecutionRecord },
}

/// Engine tuning, one knob per subsystem.
#[derive(Debug, Clone, Default)]
pub struct EngineConfig {
    pub rate_limit: RateLimitConfig,
    pub retry: RetryOptions,
    pub coordinator: CoordinatorConfig,
    pub budget: BudgetConfig,
}

/// The execution core: stateless over the durable store, safe to share.
pub struct ExecutionEngine<S> {
    store: Arc<S>,
    registry: Arc<CapabilityRegistry>,
    adapters: HashMap<String, Arc<dyn RuntimeAdapter>>,
    rate_limiter: RateLimiter,
    retry: RetryOptions,
    coordinator: ExecutionCoordinator<S>,
    materializer: Materializer<S>,
    lifecycle: LifecycleDriver<S>,
    budget: BudgetTracker,
}

impl<S: Store> ExecutionEngine<S> {
    pub fn new(store: Arc<S>, registry: Arc<CapabilityRegistry>, config: EngineConfig) -> Self {
        Self {
            rate_limiter: RateLimiter::new(config.rate_limit),
            retry: config.retry,
            coordinator: ExecutionCoordinator::new(Arc::clone(&store), config.coordinator),
            materializer: Materializer::new(Arc::clone(&store)),
            lifecycle: LifecycleDriver::new(Arc::clone(&store)),
            budget: BudgetTracker::new(config.budget),
            adapters: HashMap::new(),
            registry,
            store,
        }
    }

    /// Register the runtime adapter for one integration.
    pub fn register_adapter(&mut self, adapter: Arc<dyn RuntimeAdapter>) {
        self.adapters.insert(adapter.integration_id().to_string(), adapter);
    }

    /// Submit one logical execution request (idempotent per tool+prompt).
    pub async fn submit_execution(&self, org_id: &str, tool_id: &str, prompt: &str) -> Result<ExecutionRecord, EngineError> {
        self.coordinator.submit(org_id, tool_id, prompt).await
    }

    /// Read a tool's lifecycle state.
    pub async fn tool_state(&self, tool_id: &str) -> Result<ToolLifecycleState, EngineError> {
        self.lifecycle.state(tool_id).await
    }

    /// Transition a tool's lifecycle state (CAS-guarded).
    pub async fn transition_state(&self, tool_id: &str, to: ToolLifecycleState) -> Result<ToolLifecycleState, EngineError> {
        self.lifecycle.transition(tool_id, to).await
    }

    /// Run a compiled spec's action plan.
    ///
    /// Phase one validates everything without touching a provider; phase two
    /// dispatches the calls concurrently with retry. Provider failures are
    /// captured per action — the returned vector, in completion order, feeds
    /// [`materialize`](Self::materialize).
    pub async fn run_actions(
        &self,
        org_id: &str,
        spec: &ToolSpec,
        invocations: &[ActionInvocation],
        subject: &SubjectPermissions,
        tokens: &HashMap<String, String>,
    ) -> Result<Vec<ActionOutput>, EngineError> {
        spec.validate()?;
        self.registry.verify_spec(spec)?;

        let prepared = self.prepare_calls(org_id, spec, invocations, subject, tokens).await?;

        let mut in_flight: FuturesUnordered<_> = prepared
            .into_iter()
            .map(|call| self.dispatch(call))
            .collect();
        let mut outputs = Vec::with_capacity(in_flight.len());
        while let Some(output) = in_flight.next().await {
            outputs.push(output);
        }
        Ok(outputs)
    }

    /// Materialize action outputs on top of the tool's latest snapshot.
    pub async fn materialize(
        &self,
        tool_id: &str,
        org_id: &str,
        spec: &ToolSpec,
        action_outputs: &[ActionOutput],
    ) -> Result<MaterializeOutcome, EngineError> {
        let previous = self.store.latest_snapshot(tool_id, org_id).await?;
        self.materializer
            .materialize(tool_id, org_id, spec, action_outputs, previous.as_ref().map(|s| &s.records))
            .await
    }

    /// Materialize with an explicit previous snapshot.
    pub async fn materialize_over(
        &self,
        tool_id: &str,
        org_id: &str,
        spec: &ToolSpec,
        action_outputs: &[ActionOutput],
        previous: Option<&SnapshotRecords>,
    ) -> Result<MaterializeOutcome, EngineError> {
        self.materializer.materialize(tool_id, org_id, spec, action_outputs, previous).await
    }

    /// Drive an owned execution record through its whole flow: record the
    /// spec's integrations, execute the plan, materialize, complete.
    ///
    /// `record` must be the locked record returned by
    /// [`submit_execution`](Self::submit_execution). Any engine-level failure
    /// fails the record and releases its lock before propagating.
    pub async fn execute_submission(
        &self,
        record: &ExecutionRecord,
        spec: &ToolSpec,
        invocations: &[ActionInvocation],
        subject: &SubjectPermissions,
        tokens: &HashMap<String, String>,
    ) -> Result<ExecutionOutcome, EngineError> {
        let lock_token = record.lock_token.as_deref();
        // Builds for the same tool are serialized within this process; the
        // store's lock acquisition is what serializes them across processes.
        let lane = format!("tool:{}", record.tool_id);
        let result = self
            .coordinator
            .serialized(&lane, self.execute_submission_inner(record, spec, invocations, subject, tokens))
            .await;
        match result {
            Ok(outcome) => Ok(outcome),
            Err(error) => {
                self.coordinator.fail(&record.id, lock_token, &error.to_string()).await?;
                Err(error)
            }
        }
    }

    async fn execute_submission_inner(
        &self,
        record: &ExecutionRecord,
        spec: &ToolSpec,
        invocations: &[ActionInvocation],
        subject: &SubjectPermissions,
        tokens: &HashMap<String, String>,
    ) -> Result<ExecutionOutcome, EngineError> {
        spec.validate()?;
        self.registry.verify_spec(spec)?;

        let connected: Vec<String> = tokens.keys().cloned().collect();
        let record = self
            .coordinator
            .record_integrations(&record.id, spec.required_integrations(), &connected)
            .await?;
        let record = self
            .coordinator
            .advance(&record.id, ExecutionStatus::Compiling, ExecutionStatus::Compiled)
            .await?;

        if !record.missing_integrations.is_empty() {
            info!(
                execution = %record.id,
                missing = ?record.missing_integrations,
                "parking execution until integrations are connected"
            );
            return Ok(ExecutionOutcome::MissingIntegrations { record });
        }

        let record = self
            .coordinator
            .advance(&record.id, ExecutionStatus::Compiled, ExecutionStatus::Executing)
            .await?;

        let current = self.lifecycle.state(&record.tool_id).await?;
        if current != ToolLifecycleState::Executing {
            self.lifecycle.transition(&record.tool_id, ToolLifecycleState::Executing).await?;
        }

        let outputs = self.run_actions(&record.org_id, spec, invocations, subject, tokens).await?;
        let outcome = self.materialize(&record.tool_id, &record.org_id, spec, &outputs).await?;

        let token = record.lock_token.as_deref().unwrap_or_default();
        let record = match outcome.status {
            MaterializationStatus::Materialized => self.coordinator.complete(&record.id, token).await?,
            MaterializationStatus::Failed => self.coordinator.fail(&record.id, Some(token), "all actions failed").await?,
        };

        Ok(ExecutionOutcome::Completed { record, outcome })
    }

    /// Phase one: resolve, authorize, budget, and rate-check every
    /// invocation before any provider call.
    async fn prepare_calls(
        &self,
        org_id: &str,
        spec: &ToolSpec,
        invocations: &[ActionInvocation],
        subject: &SubjectPermissions,
        tokens: &HashMap<String, String>,
    ) -> Result<Vec<PreparedCall>, EngineError> {
        let run_budget = self.budget.start_run();
        let mut auth_contexts: HashMap<String, AuthContext> = HashMap::new();
        let mut prepared = Vec::with_capacity(invocations.len());

        for invocation in invocations {
            let action = spec.action(&invocation.action_id).ok_or_else(|| EngineError::UnknownAction {
                action_id: invocation.action_id.clone(),
            })?;
            if action.requires_approval && !invocation.approved {
                return Err(EngineError::ApprovalRequired {
                    action_id: action.id.clone(),
                });
            }

            let capability = self.registry.capability(&action.integration_id, &action.capability_id)?;
            self.registry.check_permission(&capability, subject)?;
            self.budget.check_and_consume(org_id, &run_budget)?;

            let decision = self
                .coordinator
                .serialized(&format!("ratelimit:{}", action.integration_id), async {
                    self.rate_limiter.check(&action.integration_id)
                })
                .await;
            if let RateDecision::Limited { retry_after_seconds } = decision {
                return Err(EngineError::RateLimited {
                    integration_id: action.integration_id.clone(),
                    retry_after_seconds,
                });
            }

            let adapter = self
                .adapters
                .get(&action.integration_id)
                .cloned()
                .ok_or_else(|| EngineError::MissingAdapter {
                    integration_id: action.integration_id.clone(),
                })?;

            if !auth_contexts.contains_key(&action.integration_id) {
                let token = tokens.get(&action.integration_id).ok_or_else(|| EngineError::MissingCredentials {
                    integration_id: action.integration_id.clone(),
                })?;
                let auth = adapter.resolve_context(token).await?;
                auth_contexts.insert(action.integration_id.clone(), auth);
            }

            prepared.push(PreparedCall {
                action_id: action.id.clone(),
                integration_id: action.integration_id.clone(),
                capability_id: action.capability_id.clone(),
                params: invocation.params.clone(),
                auth: auth_contexts[&action.integration_id].clone(),
                adapter,
            });
        }

        Ok(prepared)
    }

    /// Phase two: one provider call with retry, logged, failure captured.
    async fn dispatch(&self, call: PreparedCall) -> ActionOutput {
        let started = Instant::now();
        let result = with_retry(
            |attempt| {
                debug!(
                    integration = %call.integration_id,
                    capability = %call.capability_id,
                    attempt,
                    "dispatching capability"
                );
                call.adapter.execute(&call.capability_id, &call.params, &call.auth)
            },
            &self.retry,
            |error| error.is_retryable(),
        )
        .await;

        let latency_ms = started.elapsed().as_millis() as u64;
        match result {
            Ok(output) => {
                info!(
                    integration = %call.integration_id,
                    capability = %call.capability_id,
                    params = %call.params,
                    status = "ok",
                    latency_ms,
                    "capability executed"
                );
                ActionOutput {
                    action_id: call.action_id,
                    integration_id: call.integration_id,
                    output: Some(output),
                    error: None,
                }
            }
            Err(error) => {
                info!(
                    integration = %call.integration_id,
                    capability = %call.capability_id,
                    params = %call.params,
                    status = "error",
                    latency_ms,
                    error = %error,
                    "capability failed"
                );
                ActionOutput {
                    action_id: call.action_id,
                    integration_id: call.integration_id,
                    output: None,
                    error: Some(error.to_string()),
                }
            }
        }
    }
}

struct PreparedCall {
    action_id: String,
    integration_id: String,
    capability_id: String,
    params: Value,
    auth: AuthContext,
    adapter: Arc<dyn RuntimeAdapter>,
}
