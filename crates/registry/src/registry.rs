//! The capability registry: synthesis, caching, lookup, permission checks.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tracing::{debug, info};

use toolforge_types::{Capability, CapabilityConstraints, SpecError, ToolSpec};

use crate::classify::{classify_operation, infer_resource};
use crate::error::RegistryError;
use crate::models::{CatalogSource, SubjectPermissions};

/// Indexes available capabilities per integration and gates dispatch behind
/// permission checks.
///
/// Synthesis is lazy: the first lookup for an integration pulls its published
/// catalog from the [`CatalogSource`], classifies every operation, and caches
/// the result. Capabilities are immutable once synthesized for an integration
/// version.
pub struct CapabilityRegistry {
    source: Arc<dyn CatalogSource>,
    cache: Mutex<HashMap<String, Arc<Vec<Capability>>>>,
}

impl CapabilityRegistry {
    pub fn new(source: Arc<dyn CatalogSource>) -> Self {
        Self {
            source,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// All capabilities of an integration, synthesizing on first access.
    pub fn list_for_integration(&self, integration_id: &str) -> Result<Arc<Vec<Capability>>, RegistryError> {
        if let Some(cached) = self.cache.lock().expect("registry cache lock").get(integration_id) {
            return Ok(Arc::clone(cached));
        }

        let catalog = self
            .source
            .catalog(integration_id)
            .ok_or_else(|| RegistryError::UnknownIntegration {
                integration_id: integration_id.to_string(),
            })?;

        let capabilities: Vec<Capability> = catalog
            .operations
            .iter()
            .map(|operation| {
                let kind = classify_operation(operation);
                let resource = infer_resource(operation);
                debug!(
                    integration = %integration_id,
                    operation = %operation.name,
                    kind = ?kind,
                    resource = %resource,
                    "synthesized capability"
                );
                Capability {
                    id: format!("{integration_id}.{resource}.{}", kind.as_str()),
                    integration_id: integration_id.to_string(),
                    resource,
                    kind,
                    allowed_operations: kind.allowed_operations(),
                    supported_fields: operation.fields.clone(),
                    constraints: CapabilityConstraints {
                        required_filters: operation.required_filters.clone(),
                    },
                }
            })
            .collect();

        info!(
            integration = %integration_id,
            capability_count = capabilities.len(),
            "capability catalog synthesized"
        );

        let capabilities = Arc::new(capabilities);
        self.cache
            .lock()
            .expect("registry cache lock")
            .insert(integration_id.to_string(), Arc::clone(&capabilities));
        Ok(capabilities)
    }

    /// Look up one capability by integration and id.
    pub fn capability(&self, integration_id: &str, capability_id: &str) -> Result<Capability, RegistryError> {
        let capabilities = self.list_for_integration(integration_id)?;
        capabilities
            .iter()
            .find(|capability| capability.id == capability_id)
            .cloned()
            .ok_or_else(|| RegistryError::UnknownCapability {
                integration_id: integration_id.to_string(),
                capability_id: capability_id.to_string(),
            })
    }

    /// Deny unless the subject holds the capability's access mode for the
    /// integration+capability pair.
    pub fn check_permission(&self, capability: &Capability, subject: &SubjectPermissions) -> Result<(), RegistryError> {
        let mode = capability.access_mode();
        if subject.allows(&capability.integration_id, &capability.id, mode) {
            Ok(())
        } else {
            Err(RegistryError::PermissionDenied {
                integration_id: capability.integration_id.clone(),
                capability_id: capability.id.clone(),
                mode,
            })
        }
    }

    /// Check the spec invariant that every action's capability exists in this
    /// registry for the action's integration.
    pub fn verify_spec(&self, spec: &ToolSpec) -> Result<(), SpecError> {
        for action in &spec.actions {
            let known = self
                .list_for_integration(&action.integration_id)
                .map(|capabilities| capabilities.iter().any(|capability| capability.id == action.capability_id))
                .unwrap_or(false);
            if !known {
                return Err(SpecError::UnknownActionCapability {
                    action_id: action.id.clone(),
                    integration_id: action.integration_id.clone(),
                    capability_id: action.capability_id.clone(),
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{IntegrationCatalog, OperationDescriptor, StaticCatalogSource};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use toolforge_types::AccessMode;

    fn github_catalog() -> IntegrationCatalog {
        IntegrationCatalog {
            integration_id: "github".into(),
            version: Some("2022-11-28".into()),
            operations: vec![
                OperationDescriptor {
                    name: "list_issues".into(),
                    method: Some("GET".into()),
                    path: Some("/repos/{repo}/issues".into()),
                    description: None,
                    fields: vec!["title".into(), "state".into()],
                    required_filters: vec!["repo".into()],
                },
                OperationDescriptor {
                    name: "create_issue".into(),
                    method: Some("POST".into()),
                    path: Some("/repos/{repo}/issues".into()),
                    description: None,
                    fields: vec![],
                    required_filters: vec![],
                },
            ],
        }
    }

    fn registry() -> CapabilityRegistry {
        CapabilityRegistry::new(Arc::new(StaticCatalogSource::new([github_catalog()])))
    }

    #[test]
    fn synthesizes_capabilities_with_ids_and_constraints() {
        let registry = registry();
        let capabilities = registry.list_for_integration("github").unwrap();
        assert_eq!(capabilities.len(), 2);

        let list = registry.capability("github", "github.issues.list").unwrap();
        assert_eq!(list.resource, "issues");
        assert_eq!(list.constraints.required_filters, vec!["repo".to_string()]);
        assert_eq!(list.access_mode(), AccessMode::Read);

        let create = registry.capability("github", "github.issues.create").unwrap();
        assert_eq!(create.access_mode(), AccessMode::Write);
    }

    #[test]
    fn unknown_lookups_are_typed_errors() {
        let registry = registry();
        assert!(matches!(
            registry.list_for_integration("linear"),
            Err(RegistryError::UnknownIntegration { .. })
        ));
        assert!(matches!(
            registry.capability("github", "github.pulls.list"),
            Err(RegistryError::UnknownCapability { .. })
        ));
    }

    #[test]
    fn permission_check_maps_kind_to_access_mode() {
        let registry = registry();
        let list = registry.capability("github", "github.issues.list").unwrap();
        let create = registry.capability("github", "github.issues.create").unwrap();

        let reader = SubjectPermissions::new().grant("github", "github.issues.list", AccessMode::Read);
        assert!(registry.check_permission(&list, &reader).is_ok());
        let denied = registry.check_permission(&create, &reader).unwrap_err();
        assert!(matches!(denied, RegistryError::PermissionDenied { mode: AccessMode::Write, .. }));
    }

    #[test]
    fn catalog_source_is_consulted_once_per_integration() {
        struct CountingSource {
            calls: AtomicUsize,
        }
        impl CatalogSource for CountingSource {
            fn catalog(&self, integration_id: &str) -> Option<IntegrationCatalog> {
                self.calls.fetch_add(1, Ordering::SeqCst);
                (integration_id == "github").then(github_catalog)
            }
        }

        let source = Arc::new(CountingSource { calls: AtomicUsize::new(0) });
        let registry = CapabilityRegistry::new(Arc::clone(&source) as Arc<dyn CatalogSource>);
        registry.list_for_integration("github").unwrap();
        registry.list_for_integration("github").unwrap();
        registry.capability("github", "github.issues.list").unwrap();
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn verify_spec_requires_registered_capabilities() {
        use toolforge_types::{ActionKind, ActionSpec};
        let registry = registry();
        let mut spec = ToolSpec {
            name: None,
            entities: vec![],
            actions: vec![ActionSpec {
                id: "list".into(),
                integration_id: "github".into(),
                capability_id: "github.issues.list".into(),
                kind: ActionKind::Read,
                writes_state: true,
                requires_approval: false,
            }],
            views: vec![],
        };
        assert!(registry.verify_spec(&spec).is_ok());

        spec.actions[0].capability_id = "github.issues.close".into();
        assert!(matches!(registry.verify_spec(&spec), Err(SpecError::UnknownActionCapability { .. })));
    }
}
