//! JSON catalog store
//!
//! Writes a finalized catalog as one versioned JSON document. Writes go to a
//! sibling temporary file first and are renamed into place, so a crash never
//! leaves a half-written catalog at the target path.

use crate::domain::repositories::{CatalogStore, CatalogStoreError};
use crate::domain::services::{CatalogSnapshot, content_hash};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Version written into every stored catalog
pub const CATALOG_FORMAT_VERSION: u32 = 1;

#[derive(Serialize)]
struct StoredCatalogRef<'a> {
    version: u32,
    snapshot: &'a CatalogSnapshot,
}

#[derive(Deserialize)]
struct StoredCatalog {
    version: u32,
    snapshot: CatalogSnapshot,
}

#[derive(Deserialize)]
struct VersionHeader {
    version: u32,
}

/// Catalog store backed by JSON files
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCatalogStore {
    pretty: bool,
}

impl JsonCatalogStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Indents the written JSON for human inspection
    pub fn pretty(mut self) -> Self {
        self.pretty = true;
        self
    }

    fn temporary_path(path: &Path) -> PathBuf {
        let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
        name.push(".partial");
        path.with_file_name(name)
    }
}

impl CatalogStore for JsonCatalogStore {
    fn save(&self, snapshot: &CatalogSnapshot, path: &Path) -> Result<u64, CatalogStoreError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let temporary = Self::temporary_path(path);
        let document = StoredCatalogRef {
            version: CATALOG_FORMAT_VERSION,
            snapshot,
        };

        let mut writer = BufWriter::new(File::create(&temporary)?);
        let written = if self.pretty {
            serde_json::to_writer_pretty(&mut writer, &document)
        } else {
            serde_json::to_writer(&mut writer, &document)
        };
        written.map_err(|e| CatalogStoreError::Serialization(e.to_string()))?;
        writer.flush()?;
        writer
            .into_inner()
            .map_err(|e| CatalogStoreError::IoError(e.into_error()))?
            .sync_all()?;

        fs::rename(&temporary, path)?;
        let size = fs::metadata(path)?.len();

        info!(
            path = %path.display(),
            records = snapshot.len(),
            bytes = size,
            "catalog saved"
        );
        Ok(size)
    }

    fn load(&self, path: &Path) -> Result<CatalogSnapshot, CatalogStoreError> {
        if !path.exists() {
            return Err(CatalogStoreError::NotFound(path.display().to_string()));
        }

        let raw = fs::read(path)?;
        let header: VersionHeader = serde_json::from_slice(&raw)
            .map_err(|e| CatalogStoreError::Serialization(e.to_string()))?;
        if header.version != CATALOG_FORMAT_VERSION {
            return Err(CatalogStoreError::UnsupportedVersion {
                found: header.version,
                expected: CATALOG_FORMAT_VERSION,
            });
        }

        let stored: StoredCatalog = serde_json::from_slice(&raw)
            .map_err(|e| CatalogStoreError::Serialization(e.to_string()))?;
        debug!(version = stored.version, "catalog document parsed");

        for record in stored.snapshot.iter() {
            let recomputed = content_hash(record.content());
            if recomputed != record.content_hash() {
                return Err(CatalogStoreError::Integrity {
                    hash: record.content_hash().to_string(),
                    message: format!("content hashes to {recomputed}"),
                });
            }
        }

        info!(
            path = %path.display(),
            records = stored.snapshot.len(),
            "catalog loaded"
        );
        Ok(stored.snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::{
        Artifact, ByteRange, CarveCandidate, CloseReason, Component, FileType,
    };
    use crate::domain::services::EvidenceCatalog;
    use tempfile::TempDir;

    fn snapshot() -> CatalogSnapshot {
        let catalog = EvidenceCatalog::new("disk.img");
        let candidate = CarveCandidate::new(
            FileType::Jpeg,
            ByteRange::new(100, 110).unwrap(),
            CloseReason::Footer,
        );
        catalog
            .ingest(
                Artifact::Carved(candidate),
                vec![0xFF, 0xD8, 0xFF, 1, 2, 3, 4, 5, 0xFF, 0xD9],
                Component::Carver { partition: 0 },
            )
            .unwrap();
        catalog.finalize()
    }

    #[test]
    fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("catalog.json");
        let store = JsonCatalogStore::new().pretty();
        let snapshot = snapshot();

        let size = store.save(&snapshot, &path).unwrap();
        assert!(size > 0);
        assert!(!JsonCatalogStore::temporary_path(&path).exists());

        let loaded = store.load(&path).unwrap();
        assert_eq!(loaded, snapshot);
    }

    #[test]
    fn test_missing_catalog() {
        let dir = TempDir::new().unwrap();
        let result = JsonCatalogStore::new().load(&dir.path().join("absent.json"));
        assert!(matches!(result, Err(CatalogStoreError::NotFound(_))));
    }

    #[test]
    fn test_version_mismatch_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("catalog.json");
        fs::write(&path, r#"{"version": 99, "snapshot": null}"#).unwrap();

        let result = JsonCatalogStore::new().load(&path);
        assert!(matches!(
            result,
            Err(CatalogStoreError::UnsupportedVersion { found: 99, expected: 1 })
        ));
    }
}
