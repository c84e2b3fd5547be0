//! Declarative tool specifications produced by the compiler stage.
//!
//! A [`ToolSpec`] describes what an internal tool is made of: the entities it
//! reads, the capability-backed actions it may invoke, and the views that bind
//! actions to state paths. The engine treats the spec as opaque caller input
//! and validates only structural invariants here; capability existence is
//! checked against the registry by the engine.

use serde::{Deserialize, Serialize};

use crate::error::SpecError;

/// Classification of an action from the tool spec's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionKind {
    /// Fetches data without side effects.
    Read,
    /// Persists data into the tool's state snapshot.
    Write,
    /// Mutates provider-side resources.
    Mutate,
    /// Sends a notification (chat message, email) without touching state.
    Notify,
}

/// An entity a tool reads from a source integration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntitySpec {
    /// Entity name, unique within the spec (e.g. "issues").
    pub name: String,
    /// Integration the entity is sourced from.
    pub integration_id: String,
    /// Field names the tool consumes from this entity.
    #[serde(default)]
    pub fields: Vec<String>,
}

/// A single capability-backed action declared by the spec.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionSpec {
    /// Action identifier, unique within the spec.
    pub id: String,
    /// Integration whose capability this action invokes.
    pub integration_id: String,
    /// Capability identifier within that integration.
    pub capability_id: String,
    /// Action classification.
    pub kind: ActionKind,
    /// Whether this action's output is written into the state snapshot.
    #[serde(default)]
    pub writes_state: bool,
    /// Whether a human approval is required before dispatch.
    #[serde(default)]
    pub requires_approval: bool,
}

/// A view binding an entity's state path to the actions that populate it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewSpec {
    /// View identifier, unique within the spec.
    pub id: String,
    /// Source entity name, when the view renders a declared entity.
    #[serde(default)]
    pub entity: Option<String>,
    /// Dot-separated path into the snapshot state this view reads.
    #[serde(default)]
    pub state_path: Option<String>,
    /// Actions bound to this view (refresh, row actions).
    #[serde(default)]
    pub action_ids: Vec<String>,
}

/// A complete declarative tool spec.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolSpec {
    /// Human-readable tool name.
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub entities: Vec<EntitySpec>,
    #[serde(default)]
    pub actions: Vec<ActionSpec>,
    #[serde(default)]
    pub views: Vec<ViewSpec>,
}

impl ToolSpec {
    /// Look up an action by id.
    pub fn action(&self, action_id: &str) -> Option<&ActionSpec> {
        self.actions.iter().find(|a| a.id == action_id)
    }

    /// Look up an entity by name.
    pub fn entity(&self, name: &str) -> Option<&EntitySpec> {
        self.entities.iter().find(|e| e.name == name)
    }

    /// Every distinct integration referenced by the spec's actions, in
    /// declaration order.
    pub fn required_integrations(&self) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        for action in &self.actions {
            if !out.iter().any(|i| i == &action.integration_id) {
                out.push(action.integration_id.clone());
            }
        }
        out
    }

    /// Derive the state paths an action's output is written at.
    ///
    /// Resolution order: state paths of views bound to the action, then an
    /// entity-derived path for the action's integration, then the fallback
    /// `<integration_id>.data`.
    pub fn state_paths_for_action(&self, action: &ActionSpec) -> Vec<String> {
        let mut paths: Vec<String> = Vec::new();
        for view in self.views.iter().filter(|view| view.action_ids.iter().any(|id| id == &action.id)) {
            if let Some(path) = &view.state_path
                && !paths.contains(path)
            {
                paths.push(path.clone());
            }
        }
        if !paths.is_empty() {
            return paths;
        }

        if let Some(entity) = self.entities.iter().find(|e| e.integration_id == action.integration_id) {
            return vec![format!("entities.{}", entity.name)];
        }

        vec![format!("{}.data", action.integration_id)]
    }

    /// Validate the spec's structural invariants.
    ///
    /// - every view's bound action ids resolve to declared actions
    /// - every view's `entity` resolves to a declared entity
    /// - action ids and entity names are unique
    /// - state paths derived for distinct state-writing actions are disjoint
    ///
    /// Capability existence (action → registry) is intentionally not checked
    /// here; the registry owns that lookup.
    pub fn validate(&self) -> Result<(), SpecError> {
        let mut seen_actions: Vec<&str> = Vec::new();
        for action in &self.actions {
            if seen_actions.contains(&action.id.as_str()) {
                return Err(SpecError::DuplicateActionId { action_id: action.id.clone() });
            }
            seen_actions.push(&action.id);
        }

        let mut seen_entities: Vec<&str> = Vec::new();
        for entity in &self.entities {
            if seen_entities.contains(&entity.name.as_str()) {
                return Err(SpecError::DuplicateEntity { name: entity.name.clone() });
            }
            seen_entities.push(&entity.name);
        }

        for view in &self.views {
            for action_id in &view.action_ids {
                if self.action(action_id).is_none() {
                    return Err(SpecError::UnknownViewAction {
                        view_id: view.id.clone(),
                        action_id: action_id.clone(),
                    });
                }
            }
            if let Some(entity) = &view.entity
                && self.entity(entity).is_none()
            {
                return Err(SpecError::UnknownViewEntity {
                    view_id: view.id.clone(),
                    entity: entity.clone(),
                });
            }
        }

        self.validate_disjoint_paths()
    }

    /// Reject specs where two state-writing actions target the same state
    /// path. Outputs merge in completion order at runtime, so a shared path
    /// would be a silent race.
    fn validate_disjoint_paths(&self) -> Result<(), SpecError> {
        let mut claimed: Vec<(String, &str)> = Vec::new();
        for action in self.actions.iter().filter(|a| a.writes_state) {
            for path in self.state_paths_for_action(action) {
                if let Some((_, other)) = claimed.iter().find(|(p, _)| *p == path) {
                    return Err(SpecError::StatePathCollision {
                        path,
                        first_action: (*other).to_string(),
                        second_action: action.id.clone(),
                    });
                }
                claimed.push((path, &action.id));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec_with(actions: Vec<ActionSpec>, views: Vec<ViewSpec>) -> ToolSpec {
        ToolSpec {
            name: Some("issue-triage".into()),
            entities: vec![EntitySpec {
                name: "issues".into(),
                integration_id: "github".into(),
                fields: vec!["title".into(), "state".into()],
            }],
            actions,
            views,
        }
    }

    fn read_action(id: &str, integration: &str) -> ActionSpec {
        ActionSpec {
            id: id.into(),
            integration_id: integration.into(),
            capability_id: format!("{integration}.issues.list"),
            kind: ActionKind::Read,
            writes_state: true,
            requires_approval: false,
        }
    }

    #[test]
    fn view_path_takes_precedence_over_entity_path() {
        let spec = spec_with(
            vec![read_action("list-issues", "github")],
            vec![ViewSpec {
                id: "board".into(),
                entity: Some("issues".into()),
                state_path: Some("board.issues".into()),
                action_ids: vec!["list-issues".into()],
            }],
        );
        let action = spec.action("list-issues").unwrap();
        assert_eq!(spec.state_paths_for_action(action), vec!["board.issues".to_string()]);
    }

    #[test]
    fn entity_path_then_integration_fallback() {
        let spec = spec_with(vec![read_action("list-issues", "github"), read_action("list-chats", "slack")], vec![]);
        let github = spec.action("list-issues").unwrap();
        let slack = spec.action("list-chats").unwrap();
        assert_eq!(spec.state_paths_for_action(github), vec!["entities.issues".to_string()]);
        assert_eq!(spec.state_paths_for_action(slack), vec!["slack.data".to_string()]);
    }

    #[test]
    fn validate_rejects_dangling_view_action() {
        let spec = spec_with(
            vec![read_action("list-issues", "github")],
            vec![ViewSpec {
                id: "board".into(),
                entity: None,
                state_path: None,
                action_ids: vec!["missing".into()],
            }],
        );
        assert!(matches!(spec.validate(), Err(SpecError::UnknownViewAction { .. })));
    }

    #[test]
    fn validate_rejects_state_path_collision() {
        let mut second = read_action("list-issues-again", "github");
        second.capability_id = "github.issues.search".into();
        let spec = spec_with(vec![read_action("list-issues", "github"), second], vec![]);
        let err = spec.validate().unwrap_err();
        assert!(matches!(err, SpecError::StatePathCollision { .. }));
    }

    #[test]
    fn validate_accepts_disjoint_paths() {
        let spec = spec_with(
            vec![read_action("list-issues", "github"), read_action("list-chats", "slack")],
            vec![],
        );
        assert!(spec.validate().is_ok());
    }
}
