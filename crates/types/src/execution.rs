//! Execution records and the idempotency key.
//!
//! An [`ExecutionRecord`] tracks one logical build/execute request for a tool.
//! Records are deduplicated by [`prompt_hash`], and ownership of an in-flight
//! record is expressed by its `lock_token`; both are enforced by conditional
//! writes in the store, not by this crate.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Status of an execution record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    Created,
    Compiling,
    Compiled,
    Executing,
    Completed,
    Failed,
}

impl ExecutionStatus {
    /// Whether no further work will happen on a record in this status.
    pub const fn is_terminal(self) -> bool {
        matches!(self, ExecutionStatus::Completed | ExecutionStatus::Failed)
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            ExecutionStatus::Created => "created",
            ExecutionStatus::Compiling => "compiling",
            ExecutionStatus::Compiled => "compiled",
            ExecutionStatus::Executing => "executing",
            ExecutionStatus::Completed => "completed",
            ExecutionStatus::Failed => "failed",
        }
    }
}

/// One logical request to compile and execute a tool from a prompt.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionRecord {
    pub id: String,
    pub org_id: String,
    pub tool_id: String,
    /// Idempotency key over `(tool_id, normalized prompt)`.
    pub prompt_hash: String,
    pub normalized_prompt: String,
    pub status: ExecutionStatus,
    /// Set while exactly one worker owns this record.
    #[serde(default)]
    pub lock_token: Option<String>,
    #[serde(default)]
    pub lock_acquired_at: Option<DateTime<Utc>>,
    /// After this instant the lock may be reclaimed by another worker.
    #[serde(default)]
    pub lock_expires_at: Option<DateTime<Utc>>,
    /// Integrations the compiled spec needs.
    #[serde(default)]
    pub required_integrations: Vec<String>,
    /// Required integrations the organization has not connected.
    #[serde(default)]
    pub missing_integrations: Vec<String>,
    #[serde(default)]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ExecutionRecord {
    /// Whether the record currently holds an unexpired lock.
    pub fn is_locked_at(&self, now: DateTime<Utc>) -> bool {
        if self.lock_token.is_none() {
            return false;
        }
        match self.lock_expires_at {
            Some(expires_at) => expires_at > now,
            None => true,
        }
    }
}

/// Normalize a prompt for idempotent comparison: trim, lowercase, collapse
/// internal whitespace runs to single spaces.
pub fn normalize_prompt(prompt: &str) -> String {
    prompt.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase()
}

/// Idempotency key for a `(tool, prompt)` pair: hex SHA-256 over the tool id
/// and the normalized prompt.
pub fn prompt_hash(tool_id: &str, prompt: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(tool_id.as_bytes());
    hasher.update(b":");
    hasher.update(normalize_prompt(prompt).as_bytes());
    let digest = hasher.finalize();
    digest.iter().map(|byte| format!("{byte:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalization_collapses_case_and_whitespace() {
        assert_eq!(normalize_prompt("  List   Open\tIssues \n"), "list open issues");
    }

    #[test]
    fn equivalent_prompts_share_a_hash() {
        let a = prompt_hash("tool-1", "List open issues");
        let b = prompt_hash("tool-1", "  list   OPEN issues");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn hash_is_scoped_to_the_tool() {
        assert_ne!(prompt_hash("tool-1", "list open issues"), prompt_hash("tool-2", "list open issues"));
    }

    #[test]
    fn terminal_statuses() {
        assert!(ExecutionStatus::Completed.is_terminal());
        assert!(ExecutionStatus::Failed.is_terminal());
        assert!(!ExecutionStatus::Executing.is_terminal());
    }
}
