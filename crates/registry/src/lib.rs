//! Capability registry for the Toolforge engine.
//!
//! The registry indexes the capabilities each integration exposes and gates
//! every dispatch behind a permission check. Capabilities are not hand-written:
//! they are synthesized lazily, once per integration, from the provider's
//! published operation catalog — operation name and HTTP method/path
//! heuristics classify each operation, and the classification determines both
//! the allowed snapshot operations and the access mode the permission check
//! demands.

pub mod classify;
pub mod error;
pub mod models;
pub mod registry;

pub use classify::{classify_operation, infer_resource};
pub use error::RegistryError;
pub use models::{CatalogSource, IntegrationCatalog, OperationDescriptor, StaticCatalogSource, SubjectPermissions};
pub use registry::CapabilityRegistry;
