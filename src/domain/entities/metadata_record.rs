//! Metadata record entity
//!
//! Per-entry information recovered from filesystem structures: names,
//! timestamps and deletion markers that carving alone cannot see.

use super::byte_range::ByteRange;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Filesystem layouts the metadata extractor understands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilesystemKind {
    /// Linux ext2, ext3 and ext4
    Ext,
    /// FAT12, FAT16 and FAT32
    Fat,
    /// Windows NTFS
    Ntfs,
}

impl FilesystemKind {
    /// Returns a human-readable name
    pub fn name(&self) -> &'static str {
        match self {
            FilesystemKind::Ext => "ext2/3/4",
            FilesystemKind::Fat => "FAT",
            FilesystemKind::Ntfs => "NTFS",
        }
    }

    /// Returns whether this filesystem records when an entry was deleted
    pub fn records_deletion_time(&self) -> bool {
        matches!(self, FilesystemKind::Ext)
    }

    /// All kinds, in detection order
    pub fn all() -> [FilesystemKind; 3] {
        [FilesystemKind::Ntfs, FilesystemKind::Ext, FilesystemKind::Fat]
    }
}

impl fmt::Display for FilesystemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Whether the filesystem still considers the entry in use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AllocationStatus {
    Allocated,
    /// Marked deleted; structure still present
    Unallocated,
}

/// What a directory entry names
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    File,
    Directory,
    Other,
}

/// Timestamps of an entry; each is optional and filesystem dependent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Timestamps {
    pub created: Option<DateTime<Utc>>,
    pub modified: Option<DateTime<Utc>>,
    pub accessed: Option<DateTime<Utc>>,
    pub deleted: Option<DateTime<Utc>>,
}

/// Metadata for one directory-entry-equivalent structure
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MetadataRecord {
    /// Path within the filesystem namespace, `/` separated
    pub path: String,
    /// Inode number, MFT record number or directory entry index
    pub identifier: u64,
    pub filesystem: FilesystemKind,
    pub entry_kind: EntryKind,
    pub timestamps: Timestamps,
    /// Logical size in bytes as declared by the filesystem
    pub logical_size: u64,
    pub allocation: AllocationStatus,
    /// Where the metadata structure itself lives in the image
    pub entry_location: ByteRange,
    /// Ordered extents holding the entry's data
    pub data_extents: Vec<ByteRange>,
}

impl MetadataRecord {
    /// Returns true when the entry is marked deleted
    pub fn is_deleted(&self) -> bool {
        self.allocation == AllocationStatus::Unallocated
    }

    /// The span covering every data extent, if the entry has data
    pub fn data_range(&self) -> Option<ByteRange> {
        let first = self.data_extents.first()?;
        Some(self.data_extents.iter().fold(*first, |acc, r| acc.span(r)))
    }

    /// Final path component
    pub fn name(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or(&self.path)
    }
}
