//! Domain services
//!
//! Business logic that doesn't naturally fit within a single entity.

mod acquisition;
pub mod carver;
pub mod catalog;
pub mod run_context;
mod signature_registry;

pub use acquisition::verify_acquisition;
pub use carver::{CarvingEngine, PartitionScan, ScanStop};
pub use catalog::{CatalogError, CatalogSnapshot, EvidenceCatalog, content_hash};
pub use run_context::{CancellationToken, RunContext};
pub use signature_registry::{PatternHit, PatternRole, SignatureRegistry};
