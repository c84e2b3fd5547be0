//! Catalog inputs and permission subjects.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use toolforge_types::AccessMode;

/// One operation from a provider's published catalog.
///
/// Catalogs arrive in provider-specific shapes (OpenAPI operations, RPC
/// listings, tool manifests); this is the least common denominator the
/// classifier works from. `method` and `path` are present for HTTP-backed
/// providers and absent otherwise.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationDescriptor {
    /// Operation name as published (e.g. "list_issues", "issues.search").
    pub name: String,
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    /// Fields the provider documents for the operation's resource.
    #[serde(default)]
    pub fields: Vec<String>,
    /// Filters the provider requires on every call.
    #[serde(default)]
    pub required_filters: Vec<String>,
}

/// A provider's published operation catalog for one integration version.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntegrationCatalog {
    pub integration_id: String,
    #[serde(default)]
    pub version: Option<String>,
    pub operations: Vec<OperationDescriptor>,
}

/// Supplies published operation catalogs by integration id.
///
/// The registry consults a source at most once per integration and caches the
/// synthesized capabilities.
pub trait CatalogSource: Send + Sync {
    fn catalog(&self, integration_id: &str) -> Option<IntegrationCatalog>;
}

/// Fixed set of catalogs, for tests and bundled integrations.
#[derive(Default)]
pub struct StaticCatalogSource {
    catalogs: HashMap<String, IntegrationCatalog>,
}

impl StaticCatalogSource {
    pub fn new(catalogs: impl IntoIterator<Item = IntegrationCatalog>) -> Self {
        Self {
            catalogs: catalogs.into_iter().map(|catalog| (catalog.integration_id.clone(), catalog)).collect(),
        }
    }
}

impl CatalogSource for StaticCatalogSource {
    fn catalog(&self, integration_id: &str) -> Option<IntegrationCatalog> {
        self.catalogs.get(integration_id).cloned()
    }
}

/// The access a subject (org member or service principal) holds.
///
/// A grant names an integration, a capability id or the wildcard `*`, and an
/// access mode. Permission checks require an exact integration match and
/// either an exact capability match or a wildcard grant.
#[derive(Debug, Clone, Default)]
pub struct SubjectPermissions {
    grants: HashSet<(String, String, AccessMode)>,
}

impl SubjectPermissions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a grant for one capability.
    pub fn grant(mut self, integration_id: &str, capability_id: &str, mode: AccessMode) -> Self {
        self.grants.insert((integration_id.to_string(), capability_id.to_string(), mode));
        self
    }

    /// Add a wildcard grant covering every capability of an integration.
    pub fn grant_all(mut self, integration_id: &str, mode: AccessMode) -> Self {
        self.grants.insert((integration_id.to_string(), "*".to_string(), mode));
        self
    }

    /// Whether the subject holds `mode` access for the capability pair.
    pub fn allows(&self, integration_id: &str, capability_id: &str, mode: AccessMode) -> bool {
        self.grants.contains(&(integration_id.to_string(), capability_id.to_string(), mode))
            || self.grants.contains(&(integration_id.to_string(), "*".to_string(), mode))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_and_wildcard_grants() {
        let subject = SubjectPermissions::new()
            .grant("github", "github.issues.list", AccessMode::Read)
            .grant_all("slack", AccessMode::Write);

        assert!(subject.allows("github", "github.issues.list", AccessMode::Read));
        assert!(!subject.allows("github", "github.issues.list", AccessMode::Write));
        assert!(!subject.allows("github", "github.issues.create", AccessMode::Read));
        assert!(subject.allows("slack", "slack.messages.create", AccessMode::Write));
        assert!(!subject.allows("slack", "slack.messages.create", AccessMode::Read));
    }
}
