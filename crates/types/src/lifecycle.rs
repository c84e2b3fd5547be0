//! The tool lifecycle state machine table.
//!
//! The current state is persisted alongside the tool and doubles as the CAS
//! predicate for transitions, so two concurrent attempts cannot both succeed
//! from the same prior state. This module owns the table; the engine's
//! lifecycle driver performs the conditional writes.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::LifecycleError;

/// Build/run status of a tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ToolLifecycleState {
    Created,
    Planned,
    ReadyToExecute,
    Executing,
    Materialized,
    Failed,
}

impl ToolLifecycleState {
    /// The only legal transitions out of this state. No other edge exists.
    pub const fn legal_transitions(self) -> &'static [ToolLifecycleState] {
        use ToolLifecycleState::*;
        match self {
            Created => &[Planned, Executing, Materialized, Failed],
            Planned => &[ReadyToExecute, Executing, Failed],
            ReadyToExecute => &[Executing, Failed],
            Executing => &[Materialized, Failed],
            // Re-execution of a materialized tool is allowed.
            Materialized => &[Executing, Failed],
            // A failed tool may be rebuilt from scratch or re-executed.
            Failed => &[Created, Executing],
        }
    }

    /// Whether the edge `self -> to` exists in the table.
    pub fn can_transition_to(self, to: ToolLifecycleState) -> bool {
        self.legal_transitions().contains(&to)
    }

    /// States from which no further work is required.
    pub const fn is_terminal(self) -> bool {
        matches!(self, ToolLifecycleState::Materialized | ToolLifecycleState::Failed)
    }

    /// States in which the tool's actions may be executed.
    pub const fn is_executable(self) -> bool {
        matches!(
            self,
            ToolLifecycleState::ReadyToExecute | ToolLifecycleState::Executing | ToolLifecycleState::Materialized
        )
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            ToolLifecycleState::Created => "CREATED",
            ToolLifecycleState::Planned => "PLANNED",
            ToolLifecycleState::ReadyToExecute => "READY_TO_EXECUTE",
            ToolLifecycleState::Executing => "EXECUTING",
            ToolLifecycleState::Materialized => "MATERIALIZED",
            ToolLifecycleState::Failed => "FAILED",
        }
    }

    /// All states, for exhaustive table checks.
    pub const fn all() -> [ToolLifecycleState; 6] {
        use ToolLifecycleState::*;
        [Created, Planned, ReadyToExecute, Executing, Materialized, Failed]
    }
}

impl fmt::Display for ToolLifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ToolLifecycleState {
    type Err = LifecycleError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "CREATED" => Ok(ToolLifecycleState::Created),
            "PLANNED" => Ok(ToolLifecycleState::Planned),
            "READY_TO_EXECUTE" => Ok(ToolLifecycleState::ReadyToExecute),
            "EXECUTING" => Ok(ToolLifecycleState::Executing),
            "MATERIALIZED" => Ok(ToolLifecycleState::Materialized),
            "FAILED" => Ok(ToolLifecycleState::Failed),
            other => Err(LifecycleError::UnknownState { value: other.to_string() }),
        }
    }
}

/// Guard a transition against the table.
///
/// Returns `Err(LifecycleError::IllegalTransition)` for every edge not in the
/// table; callers perform the actual conditional write only after this check
/// passes.
pub fn assert_legal_transition(from: ToolLifecycleState, to: ToolLifecycleState) -> Result<(), LifecycleError> {
    if from.can_transition_to(to) {
        Ok(())
    } else {
        Err(LifecycleError::IllegalTransition { from, to })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ToolLifecycleState::*;

    #[test]
    fn every_pair_matches_the_table() {
        let table: &[(ToolLifecycleState, &[ToolLifecycleState])] = &[
            (Created, &[Planned, Executing, Materialized, Failed]),
            (Planned, &[ReadyToExecute, Executing, Failed]),
            (ReadyToExecute, &[Executing, Failed]),
            (Executing, &[Materialized, Failed]),
            (Materialized, &[Executing, Failed]),
            (Failed, &[Created, Executing]),
        ];
        for from in ToolLifecycleState::all() {
            let allowed = table.iter().find(|(state, _)| *state == from).map(|(_, edges)| *edges).unwrap();
            for to in ToolLifecycleState::all() {
                let legal = allowed.contains(&to);
                assert_eq!(
                    assert_legal_transition(from, to).is_ok(),
                    legal,
                    "transition {from} -> {to} legality mismatch"
                );
            }
        }
    }

    #[test]
    fn materialized_cannot_return_to_created() {
        assert!(assert_legal_transition(Materialized, Created).is_err());
    }

    #[test]
    fn failed_may_retry_execution() {
        assert!(assert_legal_transition(Failed, Executing).is_ok());
    }

    #[test]
    fn terminal_and_executable_sets() {
        assert!(Materialized.is_terminal());
        assert!(Failed.is_terminal());
        assert!(!Executing.is_terminal());
        assert!(ReadyToExecute.is_executable());
        assert!(Executing.is_executable());
        assert!(Materialized.is_executable());
        assert!(!Created.is_executable());
    }

    #[test]
    fn round_trips_through_strings() {
        for state in ToolLifecycleState::all() {
            assert_eq!(state.as_str().parse::<ToolLifecycleState>().unwrap(), state);
        }
        assert!("BUILDING".parse::<ToolLifecycleState>().is_err());
    }
}
