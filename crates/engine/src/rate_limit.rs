//! Advisory fixed-window rate limiting per integration.
//!
//! This is backpressure, not a circuit breaker: a denial means "retry after
//! the reported delay", never "abort". Counters are process-local: in a
//! multi-process deployment each process limits independently, and only the
//! store's conditional writes are globally consistent.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// One integration's window rule.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WindowRule {
    pub window_ms: i64,
    pub max: u32,
}

/// Per-integration window rules plus a conservative default for integrations
/// without an explicit entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitConfig {
    #[serde(default)]
    pub per_integration: HashMap<String, WindowRule>,
    pub default: WindowRule,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            per_integration: HashMap::new(),
            // Conservative: unknown providers get a minute window of 30 calls.
            default: WindowRule {
                window_ms: 60_000,
                max: 30,
            },
        }
    }
}

impl RateLimitConfig {
    fn rule_for(&self, integration_id: &str) -> WindowRule {
        self.per_integration.get(integration_id).copied().unwrap_or(self.default)
    }
}

/// Outcome of a limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    Allowed,
    /// Denied; the window resets after this many seconds (at least 1).
    Limited { retry_after_seconds: u64 },
}

impl RateDecision {
    pub fn is_allowed(self) -> bool {
        matches!(self, RateDecision::Allowed)
    }
}

#[derive(Debug, Clone, Copy)]
struct Window {
    started_at_ms: i64,
    count: u32,
}

/// Fixed-window counter keyed by integration.
pub struct RateLimiter {
    config: RateLimitConfig,
    windows: Mutex<HashMap<String, Window>>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            windows: Mutex::new(HashMap::new()),
        }
    }

    /// Check and count one call for the integration.
    pub fn check(&self, integration_id: &str) -> RateDecision {
        self.check_at(integration_id, Utc::now().timestamp_millis())
    }

    /// Clock-injected variant used by tests and the facade.
    pub fn check_at(&self, integration_id: &str, now_ms: i64) -> RateDecision {
        let rule = self.config.rule_for(integration_id);
        let mut windows = self.windows.lock().expect("rate limiter lock");
        let window = windows.entry(integration_id.to_string()).or_insert(Window {
            started_at_ms: now_ms,
            count: 0,
        });

        if now_ms - window.started_at_ms >= rule.window_ms {
            window.started_at_ms = now_ms;
            window.count = 0;
        }

        if window.count >= rule.max {
            let remaining_ms = rule.window_ms - (now_ms - window.started_at_ms);
            let retry_after_seconds = (remaining_ms.max(0) as u64).div_ceil(1000).max(1);
            warn!(
                integration = %integration_id,
                max = rule.max,
                retry_after_seconds,
                "rate limit window exhausted"
            );
            return RateDecision::Limited { retry_after_seconds };
        }

        window.count += 1;
        RateDecision::Allowed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter(window_ms: i64, max: u32) -> RateLimiter {
        let mut config = RateLimitConfig::default();
        config.per_integration.insert("github".into(), WindowRule { window_ms, max });
        RateLimiter::new(config)
    }

    #[test]
    fn denies_once_window_is_exhausted() {
        let limiter = limiter(1000, 3);
        let t0 = 1_000_000;
        assert!(limiter.check_at("github", t0).is_allowed());
        assert!(limiter.check_at("github", t0 + 10).is_allowed());
        assert!(limiter.check_at("github", t0 + 20).is_allowed());

        match limiter.check_at("github", t0 + 30) {
            RateDecision::Limited { retry_after_seconds } => assert!(retry_after_seconds > 0),
            RateDecision::Allowed => panic!("fourth call must be limited"),
        }
    }

    #[test]
    fn window_resets_after_elapse() {
        let limiter = limiter(1000, 1);
        let t0 = 1_000_000;
        assert!(limiter.check_at("github", t0).is_allowed());
        assert!(!limiter.check_at("github", t0 + 999).is_allowed());
        assert!(limiter.check_at("github", t0 + 1000).is_allowed());
    }

    #[test]
    fn integrations_count_independently() {
        let limiter = limiter(1000, 1);
        let t0 = 1_000_000;
        assert!(limiter.check_at("github", t0).is_allowed());
        assert!(limiter.check_at("slack", t0).is_allowed());
        assert!(!limiter.check_at("github", t0 + 1).is_allowed());
    }

    #[test]
    fn unknown_integration_gets_the_conservative_default() {
        let limiter = RateLimiter::new(RateLimitConfig::default());
        let t0 = 0;
        for i in 0..30 {
            assert!(limiter.check_at("unheard-of", t0 + i).is_allowed());
        }
        assert!(!limiter.check_at("unheard-of", t0 + 31).is_allowed());
    }
}
