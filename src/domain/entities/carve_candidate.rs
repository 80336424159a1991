//! Carve candidate entity
//!
//! A byte range that looks like a file of a known type, produced by the
//! carving engine independently of any filesystem structure.

use super::byte_range::ByteRange;
use super::file_signature::FileType;
use serde::{Deserialize, Serialize};

/// How sure the carver is about a candidate's extent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    /// Header and footer both matched
    High,
    /// Header only, truncated by a bound or by the end of the image
    Low,
}

/// Why the carver closed a candidate where it did
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CloseReason {
    /// A footer for the type was found
    Footer,
    /// The type's maximum plausible size was reached
    MaxSize,
    /// Another header of the same type started before any footer
    NextHeader,
    /// The image ended while still seeking a footer
    EndOfImage,
    /// The image could not be read past this point
    ReadFailure,
}

/// A candidate file extent found by signature carving
///
/// Immutable once created; the catalog consumes it together with the
/// bytes read from its range.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CarveCandidate {
    file_type: FileType,
    range: ByteRange,
    confidence: Confidence,
    fragmented: bool,
    ambiguous: bool,
    close_reason: CloseReason,
}

impl CarveCandidate {
    /// Creates a candidate; the confidence follows from the close reason
    pub fn new(file_type: FileType, range: ByteRange, close_reason: CloseReason) -> Self {
        let confidence = match close_reason {
            CloseReason::Footer => Confidence::High,
            _ => Confidence::Low,
        };
        Self {
            file_type,
            range,
            confidence,
            fragmented: close_reason == CloseReason::NextHeader,
            ambiguous: false,
            close_reason,
        }
    }

    /// Marks the candidate as sharing its start offset with another type
    pub fn with_ambiguity(mut self, ambiguous: bool) -> Self {
        self.ambiguous = ambiguous;
        self
    }

    pub fn file_type(&self) -> FileType {
        self.file_type
    }

    pub fn range(&self) -> ByteRange {
        self.range
    }

    pub fn confidence(&self) -> Confidence {
        self.confidence
    }

    /// Whether the fragmentation heuristic cut this candidate short
    pub fn is_fragmented(&self) -> bool {
        self.fragmented
    }

    /// Whether a candidate of a different type starts at the same offset
    pub fn is_ambiguous(&self) -> bool {
        self.ambiguous
    }

    pub fn close_reason(&self) -> CloseReason {
        self.close_reason
    }

    /// Returns true for truncated (low-confidence) candidates
    pub fn is_truncated(&self) -> bool {
        self.confidence == Confidence::Low
    }
}
