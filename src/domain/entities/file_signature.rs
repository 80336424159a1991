//! File signature entity
//!
//! Header and footer magic that lets the carver find file boundaries in
//! unallocated space, plus the size bound past which a match is abandoned.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Content classification of a piece of evidence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileType {
    Jpeg,
    Png,
    Gif,
    Pdf,
    /// Content no enabled signature recognizes
    Unknown,
}

impl FileType {
    /// Types the built-in signature table can carve
    pub const CARVABLE: [FileType; 4] =
        [FileType::Jpeg, FileType::Png, FileType::Gif, FileType::Pdf];

    /// Short lowercase tag, identical to the serialized form
    pub fn tag(&self) -> &'static str {
        match self {
            FileType::Jpeg => "jpeg",
            FileType::Png => "png",
            FileType::Gif => "gif",
            FileType::Pdf => "pdf",
            FileType::Unknown => "unknown",
        }
    }

    /// Conventional file extension, without the dot
    pub fn extension(&self) -> &'static str {
        match self {
            FileType::Jpeg => "jpg",
            FileType::Png => "png",
            FileType::Gif => "gif",
            FileType::Pdf => "pdf",
            FileType::Unknown => "bin",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            FileType::Jpeg => "JPEG image",
            FileType::Png => "PNG image",
            FileType::Gif => "GIF image",
            FileType::Pdf => "PDF document",
            FileType::Unknown => "Unidentified data",
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            FileType::Jpeg => "image/jpeg",
            FileType::Png => "image/png",
            FileType::Gif => "image/gif",
            FileType::Pdf => "application/pdf",
            FileType::Unknown => "application/octet-stream",
        }
    }
}

impl fmt::Display for FileType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// Which footer occurrence ends a carved file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FooterPolicy {
    /// The first footer after the header closes the file
    #[default]
    FirstFooter,
    /// Keep extending to the last footer seen within the size bound
    ///
    /// Used by formats that append trailers on incremental update (PDF).
    LastFooter,
}

/// Magic bytes bounding one file type on disk
///
/// A signature without a footer never closes on its own: the carver ends
/// its candidates at the size bound, the next header or the image end.
#[derive(Debug, Clone)]
pub struct FileSignature {
    file_type: FileType,
    header: Vec<u8>,
    footer: Option<Vec<u8>>,
    /// Largest plausible file, counted from the first header byte
    max_size: u64,
    footer_policy: FooterPolicy,
}

impl FileSignature {
    pub fn new(
        file_type: FileType,
        header: Vec<u8>,
        footer: Option<Vec<u8>>,
        max_size: u64,
    ) -> Self {
        Self {
            file_type,
            header,
            footer,
            max_size,
            footer_policy: FooterPolicy::default(),
        }
    }

    pub fn with_footer_policy(mut self, policy: FooterPolicy) -> Self {
        self.footer_policy = policy;
        self
    }

    pub fn file_type(&self) -> FileType {
        self.file_type
    }

    pub fn header(&self) -> &[u8] {
        &self.header
    }

    pub fn footer(&self) -> Option<&[u8]> {
        self.footer.as_deref()
    }

    pub fn max_size(&self) -> u64 {
        self.max_size
    }

    pub fn footer_policy(&self) -> FooterPolicy {
        self.footer_policy
    }

    /// Length of the footer pattern, zero when the signature has none
    pub fn footer_len(&self) -> u64 {
        self.footer().map_or(0, |f| f.len() as u64)
    }

    /// Whether `data` begins with this signature's header
    pub fn matches_header(&self, data: &[u8]) -> bool {
        data.starts_with(&self.header)
    }
}
