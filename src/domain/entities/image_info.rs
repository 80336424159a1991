//! Image information entity
//!
//! Describes an opened disk image: its container format, geometry and the
//! acquisition metadata recorded when the evidence was imaged.

use super::byte_range::ByteRange;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Disk image container formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    /// Plain sector-for-sector copy, possibly split into numbered segments
    Raw,
    /// Expert Witness Format (EnCase E01), possibly multi-segment
    Ewf,
}

impl ImageFormat {
    pub fn name(&self) -> &'static str {
        match self {
            ImageFormat::Raw => "raw",
            ImageFormat::Ewf => "expert-witness",
        }
    }
}

impl fmt::Display for ImageFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Hash algorithms found in acquisition records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgorithm {
    Md5,
    Sha1,
}

/// A hash stored by the acquisition tool
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredHash {
    pub algorithm: HashAlgorithm,
    /// Lowercase hex digest
    pub digest: String,
}

/// One physical file of a (possibly) multi-part container
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentDescriptor {
    /// 1-based segment number
    pub number: u32,
    pub path: PathBuf,
    /// Size of the segment file on disk
    pub file_size: u64,
    /// Logical bytes stored in this segment, if any
    pub logical_range: Option<ByteRange>,
}

/// Acquisition details recorded alongside the image
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcquisitionMetadata {
    pub case_number: Option<String>,
    pub evidence_number: Option<String>,
    pub examiner: Option<String>,
    pub description: Option<String>,
    pub notes: Option<String>,
    pub acquisition_date: Option<String>,
    pub system_date: Option<String>,
    pub acquisition_hashes: Vec<StoredHash>,
}

impl AcquisitionMetadata {
    /// Returns the stored digest for an algorithm, if recorded
    pub fn hash(&self, algorithm: HashAlgorithm) -> Option<&str> {
        self.acquisition_hashes
            .iter()
            .find(|h| h.algorithm == algorithm)
            .map(|h| h.digest.as_str())
    }
}

/// Immutable description of an opened image
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageInfo {
    pub format: ImageFormat,
    /// Stable identifier used in provenance entries
    pub identifier: String,
    /// Sector size in bytes
    pub block_size: u32,
    /// Total addressable logical size in bytes
    pub total_size: u64,
    pub acquisition: AcquisitionMetadata,
    pub segments: Vec<SegmentDescriptor>,
}

impl ImageInfo {
    pub fn block_count(&self) -> u64 {
        self.total_size / self.block_size.max(1) as u64
    }

    /// The whole logical address space, if the image is not empty
    pub fn full_range(&self) -> Option<ByteRange> {
        ByteRange::new(0, self.total_size)
    }
}
