//! Capability descriptors synthesized from provider operation catalogs.

use serde::{Deserialize, Serialize};

/// The access mode a permission check requires for a capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessMode {
    Read,
    Write,
}

impl AccessMode {
    pub const fn as_str(self) -> &'static str {
        match self {
            AccessMode::Read => "read",
            AccessMode::Write => "write",
        }
    }
}

impl std::fmt::Display for AccessMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of provider operation a capability wraps, classified by name and
/// HTTP method heuristics when the catalog carries them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    List,
    Get,
    Create,
    Update,
    Delete,
    Search,
    Other,
}

impl OperationKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            OperationKind::List => "list",
            OperationKind::Get => "get",
            OperationKind::Create => "create",
            OperationKind::Update => "update",
            OperationKind::Delete => "delete",
            OperationKind::Search => "search",
            OperationKind::Other => "other",
        }
    }

    /// Access mode the permission check demands for this operation kind.
    pub const fn access_mode(self) -> AccessMode {
        match self {
            OperationKind::List | OperationKind::Get | OperationKind::Search | OperationKind::Other => AccessMode::Read,
            OperationKind::Create | OperationKind::Update | OperationKind::Delete => AccessMode::Write,
        }
    }

    /// Allowed snapshot-level operations for this kind: list/search grants
    /// `read+filter`, get grants `read`, mutations grant `write`.
    pub fn allowed_operations(self) -> Vec<AllowedOperation> {
        match self {
            OperationKind::List | OperationKind::Search => vec![AllowedOperation::Read, AllowedOperation::Filter],
            OperationKind::Get | OperationKind::Other => vec![AllowedOperation::Read],
            OperationKind::Create | OperationKind::Update | OperationKind::Delete => vec![AllowedOperation::Write],
        }
    }
}

/// Operations a capability's output supports inside the tool runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AllowedOperation {
    Read,
    Write,
    Aggregate,
    Filter,
    Group,
}

/// Provider-imposed constraints on how a capability may be invoked.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CapabilityConstraints {
    /// Filters the provider requires on every call (e.g. a mandatory
    /// `repository` filter on an issue listing).
    #[serde(default)]
    pub required_filters: Vec<String>,
}

/// A named, permission-gated operation an integration exposes.
///
/// Immutable once synthesized for a given integration version.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Capability {
    /// Capability identifier, unique within the integration
    /// (e.g. "github.issues.list").
    pub id: String,
    /// Owning integration.
    pub integration_id: String,
    /// Resource the capability operates on (e.g. "issues").
    pub resource: String,
    /// Operation classification the capability was synthesized from.
    pub kind: OperationKind,
    /// Operations the tool runtime may apply to this capability's output.
    pub allowed_operations: Vec<AllowedOperation>,
    /// Fields the provider documents for this resource.
    #[serde(default)]
    pub supported_fields: Vec<String>,
    #[serde(default)]
    pub constraints: CapabilityConstraints,
}

impl Capability {
    /// Access mode a subject must hold to invoke this capability.
    pub fn access_mode(&self) -> AccessMode {
        self.kind.access_mode()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mutating_kinds_require_write_access() {
        assert_eq!(OperationKind::Create.access_mode(), AccessMode::Write);
        assert_eq!(OperationKind::Update.access_mode(), AccessMode::Write);
        assert_eq!(OperationKind::Delete.access_mode(), AccessMode::Write);
        assert_eq!(OperationKind::List.access_mode(), AccessMode::Read);
        assert_eq!(OperationKind::Search.access_mode(), AccessMode::Read);
        assert_eq!(OperationKind::Get.access_mode(), AccessMode::Read);
    }

    #[test]
    fn list_grants_read_and_filter() {
        let ops = OperationKind::List.allowed_operations();
        assert!(ops.contains(&AllowedOperation::Read));
        assert!(ops.contains(&AllowedOperation::Filter));
        assert_eq!(OperationKind::Get.allowed_operations(), vec![AllowedOperation::Read]);
    }
}
