//! Registry error types.

use thiserror::Error;

use toolforge_types::AccessMode;

/// Errors raised by registry lookups and permission checks.
#[derive(Debug, Clone, Error)]
pub enum RegistryError {
    /// The subject does not hold the required access mode for the capability.
    /// Denial is always this named error, never a silent no-op.
    #[error("permission denied: {mode} access to '{capability_id}' on integration '{integration_id}'")]
    PermissionDenied {
        integration_id: String,
        capability_id: String,
        mode: AccessMode,
    },

    #[error("integration '{integration_id}' has no published catalog")]
    UnknownIntegration { integration_id: String },

    #[error("capability '{capability_id}' is not registered for integration '{integration_id}'")]
    UnknownCapability {
        integration_id: String,
        capability_id: String,
    },
}
