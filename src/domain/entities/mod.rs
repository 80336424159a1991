//! Domain entities
//!
//! Core business objects that represent the fundamental concepts
//! in the evidence extraction domain.

mod byte_range;
mod carve_candidate;
mod evidence_record;
mod file_signature;
mod image_info;
mod metadata_record;
mod run_summary;

pub use byte_range::ByteRange;
pub use carve_candidate::{CarveCandidate, CloseReason, Confidence};
pub use evidence_record::{Artifact, Component, EvidenceRecord, IntegrityFlag, Provenance};
pub use file_signature::{FileSignature, FileType, FooterPolicy};
pub use image_info::{
    AcquisitionMetadata, HashAlgorithm, ImageFormat, ImageInfo, SegmentDescriptor, StoredHash,
};
pub use metadata_record::{
    AllocationStatus, EntryKind, FilesystemKind, MetadataRecord, Timestamps,
};
pub use run_summary::{
    AcquisitionCheck, FailureReason, RunState, RunSummary, RunWarning, UnscannedRange,
    UnscannedReason, VolumeSummary, WarningKind,
};
