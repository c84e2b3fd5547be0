//! Provider-call budgets.
//!
//! Quotas are checked and consumed before any provider call is made, so an
//! exhausted budget surfaces to the caller without burning an external
//! request. Two scopes: a per-run ceiling for one action plan, and a monthly
//! ceiling per organization. Monthly usage here is process-local bookkeeping;
//! a multi-process deployment would back it with a store row.

use std::collections::HashMap;
use std::fmt;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::error::EngineError;

/// Which quota was exhausted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BudgetScope {
    Run,
    Monthly,
}

impl fmt::Display for BudgetScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            BudgetScope::Run => "run",
            BudgetScope::Monthly => "month",
        })
    }
}

/// Quota limits.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BudgetConfig {
    /// Provider calls allowed within one action plan.
    pub per_run_calls: u64,
    /// Provider calls allowed per organization per calendar month.
    pub monthly_calls: u64,
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            per_run_calls: 100,
            monthly_calls: 10_000,
        }
    }
}

/// Counter for one action plan's run.
pub struct RunBudget {
    limit: u64,
    used: AtomicU64,
}

impl RunBudget {
    fn check_and_consume(&self) -> Result<(), u64> {
        let used = self.used.fetch_add(1, Ordering::SeqCst) + 1;
        if used > self.limit { Err(used) } else { Ok(()) }
    }
}

/// Tracks monthly usage per organization and hands out run budgets.
pub struct BudgetTracker {
    config: BudgetConfig,
    monthly_used: Mutex<HashMap<(String, String), u64>>,
}

impl BudgetTracker {
    pub fn new(config: BudgetConfig) -> Self {
        Self {
            config,
            monthly_used: Mutex::new(HashMap::new()),
        }
    }

    /// Fresh counter for one action plan.
    pub fn start_run(&self) -> RunBudget {
        RunBudget {
            limit: self.config.per_run_calls,
            used: AtomicU64::new(0),
        }
    }

    /// Consume one provider call against both scopes.
    pub fn check_and_consume(&self, org_id: &str, run: &RunBudget) -> Result<(), EngineError> {
        self.check_and_consume_in_month(org_id, run, &Utc::now().format("%Y-%m").to_string())
    }

    /// Month-injected variant used by tests.
    pub fn check_and_consume_in_month(&self, org_id: &str, run: &RunBudget, month: &str) -> Result<(), EngineError> {
        {
            let mut monthly = self.monthly_used.lock().expect("budget lock");
            let used = monthly.entry((org_id.to_string(), month.to_string())).or_insert(0);
            *used += 1;
            if *used > self.config.monthly_calls {
                return Err(EngineError::BudgetExceeded {
                    scope: BudgetScope::Monthly,
                    used: *used,
                    limit: self.config.monthly_calls,
                });
            }
        }

        run.check_and_consume().map_err(|used| EngineError::BudgetExceeded {
            scope: BudgetScope::Run,
            used,
            limit: run.limit,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_budget_denies_past_the_limit() {
        let tracker = BudgetTracker::new(BudgetConfig {
            per_run_calls: 2,
            monthly_calls: 100,
        });
        let run = tracker.start_run();
        assert!(tracker.check_and_consume_in_month("org-1", &run, "2026-08").is_ok());
        assert!(tracker.check_and_consume_in_month("org-1", &run, "2026-08").is_ok());
        let denied = tracker.check_and_consume_in_month("org-1", &run, "2026-08").unwrap_err();
        assert!(matches!(denied, EngineError::BudgetExceeded { scope: BudgetScope::Run, .. }));
    }

    #[test]
    fn monthly_budget_spans_runs_and_resets_by_month() {
        let tracker = BudgetTracker::new(BudgetConfig {
            per_run_calls: 10,
            monthly_calls: 3,
        });
        for _ in 0..3 {
            let run = tracker.start_run();
            assert!(tracker.check_and_consume_in_month("org-1", &run, "2026-08").is_ok());
        }
        let run = tracker.start_run();
        let denied = tracker.check_and_consume_in_month("org-1", &run, "2026-08").unwrap_err();
        assert!(matches!(denied, EngineError::BudgetExceeded { scope: BudgetScope::Monthly, .. }));

        // New month, new ceiling; other orgs unaffected throughout.
        assert!(tracker.check_and_consume_in_month("org-1", &run, "2026-09").is_ok());
        assert!(tracker.check_and_consume_in_month("org-2", &run, "2026-08").is_ok());
    }
}
