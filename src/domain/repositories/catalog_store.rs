//! Catalog store trait
//!
//! Defines the interface for persisting a finalized evidence catalog so a
//! separate reporting process can reopen it.

use crate::domain::services::CatalogSnapshot;
use std::path::Path;
use thiserror::Error;

/// Errors that can occur when persisting or reopening a catalog
#[derive(Error, Debug)]
pub enum CatalogStoreError {
    #[error("Catalog not found: {0}")]
    NotFound(String),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Unsupported catalog version {found}, expected {expected}")]
    UnsupportedVersion { found: u32, expected: u32 },

    /// Stored content no longer matches its recorded hash
    #[error("Integrity error in record {hash}: {message}")]
    Integrity { hash: String, message: String },
}

/// Trait for writing and reading finalized catalogs
///
/// Implementations must round-trip every record field losslessly.
pub trait CatalogStore: Send + Sync {
    /// Writes a snapshot, replacing any catalog already at `path`
    fn save(&self, snapshot: &CatalogSnapshot, path: &Path) -> Result<u64, CatalogStoreError>;

    /// Reads a snapshot back and re-verifies every content hash
    fn load(&self, path: &Path) -> Result<CatalogSnapshot, CatalogStoreError>;
}
