//! Byte range entity
//!
//! A half-open `[start, end)` window into the logical image address space.
//! Every offset the engine reports is expressed through this type.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Half-open byte range `[start, end)` in the logical image address space
///
/// A `ByteRange` is never empty: construction fails when `start >= end`.
///
/// # Example
///
/// ```
/// use evidentia::domain::entities::ByteRange;
///
/// let range = ByteRange::new(512, 1024).unwrap();
/// assert_eq!(range.len(), 512);
/// assert!(ByteRange::new(10, 10).is_none());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "RawRange", into = "RawRange")]
pub struct ByteRange {
    start: u64,
    end: u64,
}

impl ByteRange {
    /// Creates a range, or `None` when it would be empty or inverted
    pub fn new(start: u64, end: u64) -> Option<Self> {
        (start < end).then_some(Self { start, end })
    }

    /// Creates a range that must also end within `total` bytes
    pub fn checked(start: u64, end: u64, total: u64) -> Option<Self> {
        if end > total {
            return None;
        }
        Self::new(start, end)
    }

    /// Creates a range from a start offset and a length
    pub fn with_len(start: u64, len: u64) -> Option<Self> {
        Self::new(start, start.checked_add(len)?)
    }

    pub fn start(&self) -> u64 {
        self.start
    }

    pub fn end(&self) -> u64 {
        self.end
    }

    /// Number of bytes covered
    #[allow(clippy::len_without_is_empty)]
    pub fn len(&self) -> u64 {
        self.end - self.start
    }

    pub fn contains(&self, offset: u64) -> bool {
        offset >= self.start && offset < self.end
    }

    pub fn overlaps(&self, other: &ByteRange) -> bool {
        self.start < other.end && other.start < self.end
    }

    /// Returns the overlapping part of two ranges
    pub fn intersect(&self, other: &ByteRange) -> Option<ByteRange> {
        ByteRange::new(self.start.max(other.start), self.end.min(other.end))
    }

    /// Returns the smallest range covering both ranges
    pub fn span(&self, other: &ByteRange) -> ByteRange {
        ByteRange {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }

    /// Splits the range into at most `parts` contiguous pieces
    ///
    /// Interior boundaries are aligned down to `align` bytes so partitions
    /// start on sector boundaries. The pieces cover the range exactly and
    /// never overlap. Fewer pieces are returned when the range is too small
    /// to give every piece at least one aligned unit.
    pub fn split(&self, parts: usize, align: u64) -> Vec<ByteRange> {
        let parts = parts.max(1) as u64;
        let align = align.max(1);
        let step = (self.len() / parts) / align * align;

        if parts == 1 || step == 0 {
            return vec![*self];
        }

        let mut ranges = Vec::with_capacity(parts as usize);
        let mut cursor = self.start;
        for index in 0..parts {
            let end = if index == parts - 1 {
                self.end
            } else {
                cursor + step
            };
            if let Some(range) = ByteRange::new(cursor, end) {
                ranges.push(range);
            }
            cursor = end;
        }
        ranges
    }
}

impl fmt::Display for ByteRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{:#x}, {:#x})", self.start, self.end)
    }
}

/// Serialized form, validated on the way back in
#[derive(Serialize, Deserialize)]
struct RawRange {
    start: u64,
    end: u64,
}

impl TryFrom<RawRange> for ByteRange {
    type Error = String;

    fn try_from(raw: RawRange) -> Result<Self, Self::Error> {
        ByteRange::new(raw.start, raw.end)
            .ok_or_else(|| format!("empty byte range [{}, {})", raw.start, raw.end))
    }
}

impl From<ByteRange> for RawRange {
    fn from(range: ByteRange) -> Self {
        RawRange {
            start: range.start,
            end: range.end,
        }
    }
}
