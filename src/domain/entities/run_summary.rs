//! Run summary entity
//!
//! What a run did not manage to do: warnings, byte ranges left unscanned
//! and why, plus the volumes and acquisition checks it performed.

use super::byte_range::ByteRange;
use super::image_info::HashAlgorithm;
use super::metadata_record::FilesystemKind;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle of one extraction run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "reason", rename_all = "snake_case")]
pub enum RunState {
    Idle,
    Opening,
    Scanning,
    Finalizing,
    Done,
    Failed(FailureReason),
}

impl RunState {
    /// Whether the coordinator may move from `self` to `next`
    pub fn can_transition_to(&self, next: &RunState) -> bool {
        matches!(
            (self, next),
            (RunState::Idle, RunState::Opening)
                | (RunState::Opening, RunState::Scanning)
                | (RunState::Opening, RunState::Failed(_))
                | (RunState::Scanning, RunState::Finalizing)
                | (RunState::Scanning, RunState::Failed(_))
                | (RunState::Finalizing, RunState::Done)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, RunState::Done | RunState::Failed(_))
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunState::Idle => write!(f, "idle"),
            RunState::Opening => write!(f, "opening"),
            RunState::Scanning => write!(f, "scanning"),
            RunState::Finalizing => write!(f, "finalizing"),
            RunState::Done => write!(f, "done"),
            RunState::Failed(reason) => write!(f, "failed ({reason})"),
        }
    }
}

/// Why a run ended in `Failed`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    /// The image could not be opened
    Open(String),
    /// The run was cancelled by the caller
    Cancelled,
    /// Every partition failed to read
    StorageLost,
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::Open(message) => write!(f, "open failed: {message}"),
            FailureReason::Cancelled => write!(f, "cancelled"),
            FailureReason::StorageLost => write!(f, "all storage access lost"),
        }
    }
}

/// Category of a non-fatal problem
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningKind {
    /// Underlying storage could not be read
    Io,
    /// A filesystem metadata entry could not be parsed
    Parse,
    /// Declared and extracted sizes or hashes disagree
    Integrity,
    /// A partition read exceeded its timeout
    Timeout,
    /// No filesystem metadata is available for the image
    NoFilesystem,
}

/// A problem absorbed by the run and reported instead of aborting
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunWarning {
    pub kind: WarningKind,
    pub range: Option<ByteRange>,
    pub message: String,
}

impl RunWarning {
    pub fn new(kind: WarningKind, range: Option<ByteRange>, message: impl Into<String>) -> Self {
        Self {
            kind,
            range,
            message: message.into(),
        }
    }
}

/// Why a byte range was not scanned
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnscannedReason {
    ReadError,
    Timeout,
    Cancelled,
}

/// A byte range the carver never examined
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UnscannedRange {
    pub range: ByteRange,
    pub reason: UnscannedReason,
}

/// A filesystem volume found in the image
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeSummary {
    pub index: usize,
    pub range: ByteRange,
    pub filesystem: Option<FilesystemKind>,
    /// Partition table description, e.g. "MBR type 0x83"
    pub description: String,
    /// Records the extractor produced for this volume
    pub records: usize,
}

/// Outcome of recomputing a stored acquisition hash
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcquisitionCheck {
    pub algorithm: HashAlgorithm,
    pub expected: String,
    pub computed: String,
}

impl AcquisitionCheck {
    pub fn matches(&self) -> bool {
        self.expected.eq_ignore_ascii_case(&self.computed)
    }
}

/// Everything the run reports besides the evidence itself
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub image_id: String,
    pub partitions: usize,
    pub bytes_scanned: u64,
    pub warnings: Vec<RunWarning>,
    pub unscanned: Vec<UnscannedRange>,
    pub volumes: Vec<VolumeSummary>,
    pub acquisition_checks: Vec<AcquisitionCheck>,
}

impl RunSummary {
    pub fn new(image_id: impl Into<String>) -> Self {
        Self {
            image_id: image_id.into(),
            ..Default::default()
        }
    }

    /// Total bytes left unscanned
    pub fn unscanned_bytes(&self) -> u64 {
        self.unscanned.iter().map(|u| u.range.len()).sum()
    }

    pub fn warnings_of(&self, kind: WarningKind) -> impl Iterator<Item = &RunWarning> {
        self.warnings.iter().filter(move |w| w.kind == kind)
    }

    /// Sorts unscanned ranges and coalesces touching ranges with one reason
    pub(crate) fn normalize(&mut self) {
        self.unscanned
            .sort_by_key(|u| (u.range.start(), u.range.end(), u.reason));
        let mut merged: Vec<UnscannedRange> = Vec::with_capacity(self.unscanned.len());
        for entry in self.unscanned.drain(..) {
            match merged.last_mut() {
                Some(last)
                    if last.reason == entry.reason && last.range.end() >= entry.range.start() =>
                {
                    last.range = last.range.span(&entry.range);
                }
                _ => merged.push(entry),
            }
        }
        self.unscanned = merged;
        self.volumes.sort_by_key(|v| v.index);
    }
}
