//! Signature registry service
//!
//! Manages the collection of file signatures used for file carving.
//! Uses Aho-Corasick algorithm for efficient O(n+m+z) multi-pattern matching
//! over every header and footer pattern at once.

use crate::domain::entities::{FileSignature, FileType, FooterPolicy};
use aho_corasick::AhoCorasick;

/// Which end of a file a pattern marks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PatternRole {
    Footer,
    Header,
}

/// One pattern occurrence in a scanned buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PatternHit {
    /// Offset of the first pattern byte within the buffer
    pub offset: usize,
    /// Index into [`SignatureRegistry::signatures`]
    pub signature: usize,
    pub role: PatternRole,
}

/// Registry of file signatures for file type detection
///
/// # Example
///
/// ```
/// use evidentia::domain::services::SignatureRegistry;
/// use evidentia::domain::entities::FileType;
///
/// let registry = SignatureRegistry::default_signatures();
/// let jpeg_data = &[0xFF, 0xD8, 0xFF, 0xE0];
/// assert_eq!(registry.identify(jpeg_data), FileType::Jpeg);
/// ```
#[derive(Debug, Clone)]
pub struct SignatureRegistry {
    signatures: Vec<FileSignature>,
    enabled_types: Vec<FileType>,
    /// Aho-Corasick automaton over enabled headers and footers
    pattern_matcher: Option<AhoCorasick>,
    /// Maps pattern index to (signature index, role)
    pattern_map: Vec<(usize, PatternRole)>,
    longest_pattern: usize,
}

impl SignatureRegistry {
    /// Creates an empty registry
    pub fn new() -> Self {
        Self {
            signatures: Vec::new(),
            enabled_types: Vec::new(),
            pattern_matcher: None,
            pattern_map: Vec::new(),
            longest_pattern: 0,
        }
    }

    /// Creates a registry with the built-in signature table
    pub fn default_signatures() -> Self {
        let mut registry = Self::new();

        // JPEG
        // Header: FF D8 FF, Footer: FF D9
        registry.register(FileSignature::new(
            FileType::Jpeg,
            vec![0xFF, 0xD8, 0xFF],
            Some(vec![0xFF, 0xD9]),
            50 * 1024 * 1024,
        ));

        // PNG
        // Header: 89 50 4E 47 0D 0A 1A 0A
        // Footer: 49 45 4E 44 AE 42 60 82 (IEND chunk type + CRC)
        registry.register(FileSignature::new(
            FileType::Png,
            vec![0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A],
            Some(vec![0x49, 0x45, 0x4E, 0x44, 0xAE, 0x42, 0x60, 0x82]),
            100 * 1024 * 1024,
        ));

        // GIF89a and GIF87a, trailer 00 3B
        registry.register(FileSignature::new(
            FileType::Gif,
            b"GIF89a".to_vec(),
            Some(vec![0x00, 0x3B]),
            50 * 1024 * 1024,
        ));
        registry.register(FileSignature::new(
            FileType::Gif,
            b"GIF87a".to_vec(),
            Some(vec![0x00, 0x3B]),
            50 * 1024 * 1024,
        ));

        // PDF: incremental saves append more %%EOF markers
        registry.register(
            FileSignature::new(
                FileType::Pdf,
                b"%PDF-".to_vec(),
                Some(b"%%EOF".to_vec()),
                200 * 1024 * 1024,
            )
            .with_footer_policy(FooterPolicy::LastFooter),
        );

        registry
    }

    /// Registers a new file signature
    pub fn register(&mut self, signature: FileSignature) {
        let file_type = signature.file_type();
        if !self.enabled_types.contains(&file_type) {
            self.enabled_types.push(file_type);
        }
        self.signatures.push(signature);
        self.build_pattern_matcher();
    }

    /// Enables only specific file types; an empty slice keeps everything
    pub fn filter_types(&mut self, types: &[FileType]) {
        if types.is_empty() {
            return;
        }
        self.enabled_types.retain(|t| types.contains(t));
        self.build_pattern_matcher();
    }

    /// Builder form of [`filter_types`](Self::filter_types)
    pub fn with_types(mut self, types: &[FileType]) -> Self {
        self.filter_types(types);
        self
    }

    /// Builds the Aho-Corasick automaton from enabled signatures
    fn build_pattern_matcher(&mut self) {
        let mut patterns: Vec<&[u8]> = Vec::new();
        let mut pattern_map = Vec::new();

        for (index, sig) in self.signatures.iter().enumerate() {
            if !self.enabled_types.contains(&sig.file_type()) {
                continue;
            }
            patterns.push(sig.header());
            pattern_map.push((index, PatternRole::Header));
            if let Some(footer) = sig.footer() {
                patterns.push(footer);
                pattern_map.push((index, PatternRole::Footer));
            }
        }

        self.longest_pattern = patterns.iter().map(|p| p.len()).max().unwrap_or(0);
        self.pattern_matcher = if patterns.is_empty() {
            None
        } else {
            AhoCorasick::new(&patterns).ok()
        };
        self.pattern_map = pattern_map;
    }

    /// Returns every registered signature, enabled or not
    pub fn signatures(&self) -> &[FileSignature] {
        &self.signatures
    }

    /// Returns the signature at `index`
    pub fn signature(&self, index: usize) -> Option<&FileSignature> {
        self.signatures.get(index)
    }

    /// Returns the enabled file types
    pub fn enabled_types(&self) -> &[FileType] {
        &self.enabled_types
    }

    /// Length of the longest enabled header or footer pattern
    ///
    /// Scan windows overlap by this length minus one so that no pattern is
    /// missed at a window boundary.
    pub fn longest_pattern(&self) -> usize {
        self.longest_pattern
    }

    /// Finds every header and footer occurrence in `data`
    ///
    /// Hits are ordered by offset; at equal offsets footers come before
    /// headers, then by signature index.
    pub fn find_all(&self, data: &[u8]) -> Vec<PatternHit> {
        let Some(matcher) = &self.pattern_matcher else {
            return Vec::new();
        };

        let mut hits: Vec<PatternHit> = matcher
            .find_overlapping_iter(data)
            .map(|mat| {
                let (signature, role) = self.pattern_map[mat.pattern().as_usize()];
                PatternHit {
                    offset: mat.start(),
                    signature,
                    role,
                }
            })
            .collect();

        hits.sort_by_key(|hit| (hit.offset, hit.role, hit.signature));
        hits.dedup();
        hits
    }

    /// Identifies a file type from the leading bytes of `data`
    pub fn identify(&self, data: &[u8]) -> FileType {
        self.signatures
            .iter()
            .filter(|sig| self.enabled_types.contains(&sig.file_type()))
            .find(|sig| sig.matches_header(data))
            .map_or(FileType::Unknown, |sig| sig.file_type())
    }

    /// Returns the number of registered signatures
    pub fn signature_count(&self) -> usize {
        self.signatures.len()
    }
}

impl Default for SignatureRegistry {
    fn default() -> Self {
        Self::default_signatures()
    }
}
