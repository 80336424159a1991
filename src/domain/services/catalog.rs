//! Evidence catalog service
//!
//! The single authoritative store of evidence for one run. Ingestion is the
//! only mutually exclusive section of the engine: hash lookups and merges
//! are serialized behind one lock so duplicate detection sees a consistent
//! view regardless of which worker reports first.

use super::signature_registry::SignatureRegistry;
use crate::domain::entities::{
    AcquisitionCheck, Artifact, Component, EvidenceRecord, FileType, IntegrityFlag, Provenance,
    RunSummary, RunWarning, UnscannedRange, VolumeSummary, WarningKind,
};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

/// Errors raised by the catalog itself
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CatalogError {
    #[error("Catalog already finalized")]
    Finalized,
}

/// Computes the catalog content hash (SHA-256, lowercase hex)
pub fn content_hash(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

#[derive(Debug, Default)]
struct CatalogInner {
    records: Vec<EvidenceRecord>,
    by_hash: HashMap<String, usize>,
    summary: RunSummary,
    snapshot: Option<CatalogSnapshot>,
}

/// Deduplicating, hash-verified evidence store for one run
#[derive(Debug)]
pub struct EvidenceCatalog {
    image_id: String,
    classifier: Arc<SignatureRegistry>,
    inner: Mutex<CatalogInner>,
}

impl EvidenceCatalog {
    /// Creates an empty catalog for one image
    pub fn new(image_id: impl Into<String>) -> Self {
        Self::with_classifier(image_id, Arc::new(SignatureRegistry::default_signatures()))
    }

    /// Creates a catalog that types metadata content with `classifier`
    pub fn with_classifier(
        image_id: impl Into<String>,
        classifier: Arc<SignatureRegistry>,
    ) -> Self {
        let image_id = image_id.into();
        Self {
            inner: Mutex::new(CatalogInner {
                summary: RunSummary::new(image_id.clone()),
                ..Default::default()
            }),
            image_id,
            classifier,
        }
    }

    pub fn image_id(&self) -> &str {
        &self.image_id
    }

    /// Ingests an artifact with the bytes extracted for it
    ///
    /// Returns the record as it stands after the merge. Records with the
    /// same content hash are merged; a provenance entry identical to one
    /// already present is not repeated.
    pub fn ingest(
        &self,
        artifact: Artifact,
        content: Vec<u8>,
        component: Component,
    ) -> Result<EvidenceRecord, CatalogError> {
        let hash = content_hash(&content);
        let file_type = match &artifact {
            Artifact::Carved(candidate) => candidate.file_type(),
            Artifact::Metadata(_) => self.classifier.identify(&content),
        };
        let integrity = IntegrityFlag::assess(artifact.declared_size(), content.len() as u64);
        let provenance = Provenance {
            image_id: self.image_id.clone(),
            range: artifact.origin_range(),
            component,
            artifact,
        };
        self.ingest_hashed(hash, file_type, Bytes::from(content), provenance, integrity, Utc::now())
    }

    fn ingest_hashed(
        &self,
        hash: String,
        file_type: FileType,
        content: Bytes,
        provenance: Provenance,
        integrity: IntegrityFlag,
        extracted_at: DateTime<Utc>,
    ) -> Result<EvidenceRecord, CatalogError> {
        let mut inner = self.inner.lock();
        if inner.snapshot.is_some() {
            return Err(CatalogError::Finalized);
        }

        if let IntegrityFlag::Incomplete { declared, actual } = integrity {
            inner.summary.warnings.push(RunWarning::new(
                WarningKind::Integrity,
                Some(provenance.range),
                format!("declared {declared} bytes, extracted {actual}"),
            ));
        }

        if let Some(&index) = inner.by_hash.get(&hash) {
            let record = &mut inner.records[index];
            if record.merge(provenance, file_type, integrity, extracted_at) {
                debug!(hash = %hash, entries = record.provenance().len(), "merged provenance");
            }
            return Ok(record.clone());
        }

        let record = EvidenceRecord::new(
            hash.clone(),
            file_type,
            content,
            provenance,
            integrity,
            extracted_at,
        );
        let index = inner.records.len();
        inner.records.push(record.clone());
        inner.by_hash.insert(hash, index);
        Ok(record)
    }

    /// Number of distinct records so far
    pub fn len(&self) -> usize {
        self.inner.lock().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, hash: &str) -> bool {
        self.inner.lock().by_hash.contains_key(hash)
    }

    pub fn record_warning(&self, warning: RunWarning) {
        self.inner.lock().summary.warnings.push(warning);
    }

    pub fn record_unscanned(&self, unscanned: UnscannedRange) {
        self.inner.lock().summary.unscanned.push(unscanned);
    }

    pub fn record_volume(&self, volume: VolumeSummary) {
        self.inner.lock().summary.volumes.push(volume);
    }

    pub fn record_acquisition_check(&self, check: AcquisitionCheck) {
        self.inner.lock().summary.acquisition_checks.push(check);
    }

    pub fn add_bytes_scanned(&self, bytes: u64) {
        self.inner.lock().summary.bytes_scanned += bytes;
    }

    pub fn set_partitions(&self, partitions: usize) {
        self.inner.lock().summary.partitions = partitions;
    }

    /// Freezes the catalog into an immutable snapshot
    ///
    /// Later ingestion fails with [`CatalogError::Finalized`]; calling
    /// `finalize` again returns the same snapshot.
    pub fn finalize(&self) -> CatalogSnapshot {
        let mut inner = self.inner.lock();
        if let Some(snapshot) = &inner.snapshot {
            return snapshot.clone();
        }

        let mut records = std::mem::take(&mut inner.records);
        inner.by_hash.clear();
        for record in &mut records {
            record.seal();
        }
        records.sort_by(|a, b| {
            a.first_offset()
                .cmp(&b.first_offset())
                .then_with(|| a.content_hash().cmp(b.content_hash()))
        });

        let mut summary = std::mem::take(&mut inner.summary);
        summary.normalize();

        info!(
            image = %self.image_id,
            records = records.len(),
            warnings = summary.warnings.len(),
            "catalog finalized"
        );

        let snapshot = CatalogSnapshot::new(records, summary, Utc::now());
        inner.snapshot = Some(snapshot.clone());
        snapshot
    }
}

/// Immutable, cheaply cloneable view of a finalized catalog
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogSnapshot {
    records: Arc<[EvidenceRecord]>,
    summary: Arc<RunSummary>,
    finalized_at: DateTime<Utc>,
}

impl CatalogSnapshot {
    pub(crate) fn new(
        records: Vec<EvidenceRecord>,
        summary: RunSummary,
        finalized_at: DateTime<Utc>,
    ) -> Self {
        Self {
            records: records.into(),
            summary: Arc::new(summary),
            finalized_at,
        }
    }

    /// Records ordered by first originating offset, then hash
    pub fn records(&self) -> &[EvidenceRecord] {
        &self.records
    }

    pub fn iter(&self) -> impl Iterator<Item = &EvidenceRecord> {
        self.records.iter()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn summary(&self) -> &RunSummary {
        &self.summary
    }

    pub fn finalized_at(&self) -> DateTime<Utc> {
        self.finalized_at
    }

    /// Looks a record up by content hash
    pub fn get(&self, hash: &str) -> Option<&EvidenceRecord> {
        self.records.iter().find(|r| r.content_hash() == hash)
    }

    /// Content hashes of every record, sorted
    pub fn content_hashes(&self) -> Vec<&str> {
        let mut hashes: Vec<&str> = self.records.iter().map(|r| r.content_hash()).collect();
        hashes.sort_unstable();
        hashes
    }
}
