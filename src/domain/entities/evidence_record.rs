//! Evidence record entity
//!
//! The catalog's unit of output: one distinct byte content, the artifact
//! that describes it, and every place in the image it was found.

use super::byte_range::ByteRange;
use super::carve_candidate::CarveCandidate;
use super::file_signature::FileType;
use super::metadata_record::{FilesystemKind, MetadataRecord};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// What produced an evidence record
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Artifact {
    Carved(CarveCandidate),
    Metadata(MetadataRecord),
}

impl Artifact {
    /// The range the artifact was found at
    ///
    /// Carved artifacts report their content range; metadata records
    /// report the location of the directory entry or inode.
    pub fn origin_range(&self) -> ByteRange {
        match self {
            Artifact::Carved(c) => c.range(),
            Artifact::Metadata(m) => m.entry_location,
        }
    }

    /// Size the producer claims the content has
    pub fn declared_size(&self) -> u64 {
        match self {
            Artifact::Carved(c) => c.range().len(),
            Artifact::Metadata(m) => m.logical_size,
        }
    }

    pub fn as_carved(&self) -> Option<&CarveCandidate> {
        match self {
            Artifact::Carved(c) => Some(c),
            Artifact::Metadata(_) => None,
        }
    }

    pub fn as_metadata(&self) -> Option<&MetadataRecord> {
        match self {
            Artifact::Metadata(m) => Some(m),
            Artifact::Carved(_) => None,
        }
    }

    /// Total order used to pick a record's primary artifact
    fn precedence(&self, other: &Artifact) -> Ordering {
        let rank = |a: &Artifact| match a {
            Artifact::Metadata(_) => 0u8,
            Artifact::Carved(_) => 1u8,
        };
        rank(self)
            .cmp(&rank(other))
            .then_with(|| self.origin_range().cmp(&other.origin_range()))
            .then_with(|| self.tie_break_key().cmp(&other.tie_break_key()))
    }

    fn tie_break_key(&self) -> (u64, String) {
        match self {
            Artifact::Carved(c) => (0, format!("{:?}", c.file_type())),
            Artifact::Metadata(m) => (m.identifier, m.path.clone()),
        }
    }
}

/// The component that produced a provenance entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "component", rename_all = "snake_case")]
pub enum Component {
    /// Signature carving, with the index of the scanned partition
    Carver { partition: usize },
    /// Filesystem metadata extraction
    MetadataExtractor { filesystem: FilesystemKind },
}

/// One link of a record's chain of custody
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Provenance {
    pub image_id: String,
    pub range: ByteRange,
    pub component: Component,
    pub artifact: Artifact,
}

impl Provenance {
    /// Whether two entries describe the same discovery
    ///
    /// Partition bookkeeping is ignored: the same carve found by two
    /// partitions is the same discovery.
    pub fn same_discovery(&self, other: &Provenance) -> bool {
        if self.image_id != other.image_id || self.range != other.range {
            return false;
        }
        match (&self.artifact, &other.artifact) {
            (Artifact::Carved(a), Artifact::Carved(b)) => a.file_type() == b.file_type(),
            (Artifact::Metadata(a), Artifact::Metadata(b)) => {
                a.filesystem == b.filesystem && a.identifier == b.identifier
            }
            _ => false,
        }
    }
}

/// Result of comparing declared and extracted sizes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum IntegrityFlag {
    Complete,
    /// Fewer (or more) bytes were read than the producer declared
    Incomplete { declared: u64, actual: u64 },
}

impl IntegrityFlag {
    pub fn assess(declared: u64, actual: u64) -> Self {
        if declared == actual {
            IntegrityFlag::Complete
        } else {
            IntegrityFlag::Incomplete { declared, actual }
        }
    }

    pub fn is_complete(&self) -> bool {
        matches!(self, IntegrityFlag::Complete)
    }

    /// Combines two assessments of the same content; incompleteness wins
    pub fn merge(self, other: IntegrityFlag) -> IntegrityFlag {
        match (self, other) {
            (IntegrityFlag::Complete, flag) => flag,
            (flag @ IntegrityFlag::Incomplete { .. }, IntegrityFlag::Complete) => flag,
            (
                a @ IntegrityFlag::Incomplete { declared: d1, .. },
                b @ IntegrityFlag::Incomplete { declared: d2, .. },
            ) => {
                if d1 <= d2 {
                    a
                } else {
                    b
                }
            }
        }
    }
}

/// A deduplicated, hash-verified piece of evidence
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvidenceRecord {
    content_hash: String,
    file_type: FileType,
    artifact: Artifact,
    #[serde(with = "hex_bytes")]
    content: Bytes,
    extracted_at: DateTime<Utc>,
    provenance: Vec<Provenance>,
    integrity: IntegrityFlag,
}

impl EvidenceRecord {
    /// Creates a record from its first discovery
    pub(crate) fn new(
        content_hash: String,
        file_type: FileType,
        content: Bytes,
        provenance: Provenance,
        integrity: IntegrityFlag,
        extracted_at: DateTime<Utc>,
    ) -> Self {
        Self {
            content_hash,
            file_type,
            artifact: provenance.artifact.clone(),
            content,
            extracted_at,
            provenance: vec![provenance],
            integrity,
        }
    }

    /// Folds another discovery of the same content into this record
    ///
    /// Returns false when the entry duplicates one already present.
    pub(crate) fn merge(
        &mut self,
        provenance: Provenance,
        file_type: FileType,
        integrity: IntegrityFlag,
        extracted_at: DateTime<Utc>,
    ) -> bool {
        if self.provenance.iter().any(|p| p.same_discovery(&provenance)) {
            return false;
        }
        if provenance.artifact.precedence(&self.artifact) == Ordering::Less {
            self.artifact = provenance.artifact.clone();
            self.file_type = file_type;
        }
        self.integrity = self.integrity.merge(integrity);
        self.extracted_at = self.extracted_at.min(extracted_at);
        self.provenance.push(provenance);
        true
    }

    /// Orders provenance deterministically before the record is frozen
    pub(crate) fn seal(&mut self) {
        self.provenance.sort_by(|a, b| {
            a.artifact
                .precedence(&b.artifact)
                .then_with(|| component_key(&a.component).cmp(&component_key(&b.component)))
        });
    }

    /// SHA-256 of the content, lowercase hex
    pub fn content_hash(&self) -> &str {
        &self.content_hash
    }

    /// Type tag of the primary artifact
    pub fn file_type(&self) -> FileType {
        self.file_type
    }

    /// The primary artifact: metadata wins over carving, then lowest offset
    pub fn artifact(&self) -> &Artifact {
        &self.artifact
    }

    pub fn content(&self) -> &[u8] {
        &self.content
    }

    pub fn size(&self) -> u64 {
        self.content.len() as u64
    }

    pub fn extracted_at(&self) -> DateTime<Utc> {
        self.extracted_at
    }

    pub fn provenance(&self) -> &[Provenance] {
        &self.provenance
    }

    pub fn integrity(&self) -> IntegrityFlag {
        self.integrity
    }

    pub fn is_incomplete(&self) -> bool {
        !self.integrity.is_complete()
    }

    /// Lowest originating offset across all provenance entries
    pub fn first_offset(&self) -> u64 {
        self.provenance
            .iter()
            .map(|p| p.range.start())
            .min()
            .unwrap_or(0)
    }

    /// Metadata records merged into this record, if any
    pub fn metadata(&self) -> impl Iterator<Item = &MetadataRecord> {
        self.provenance.iter().filter_map(|p| p.artifact.as_metadata())
    }

    /// Carve candidates merged into this record, if any
    pub fn carved(&self) -> impl Iterator<Item = &CarveCandidate> {
        self.provenance.iter().filter_map(|p| p.artifact.as_carved())
    }
}

fn component_key(component: &Component) -> (u8, usize, Option<FilesystemKind>) {
    match component {
        Component::MetadataExtractor { filesystem } => (0, 0, Some(*filesystem)),
        Component::Carver { partition } => (1, *partition, None),
    }
}

mod hex_bytes {
    use bytes::Bytes;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &Bytes, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Bytes, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        hex::decode(encoded)
            .map(Bytes::from)
            .map_err(serde::de::Error::custom)
    }
}
