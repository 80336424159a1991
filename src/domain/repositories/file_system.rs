//! File system parser trait
//!
//! Defines the interface for parsing filesystem metadata tables directly,
//! including entries the filesystem has marked deleted. This is separate
//! from raw file carving.

use crate::domain::entities::{ByteRange, FilesystemKind, MetadataRecord};
use thiserror::Error;

/// Errors that can occur when parsing a file system
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FileSystemError {
    #[error("Unsupported file system: {0}")]
    Unsupported(String),

    #[error("Invalid superblock: {0}")]
    InvalidSuperblock(String),

    /// One entry could not be parsed; extraction continues past it
    #[error("Corrupted entry {entry}: {message}")]
    CorruptedEntry { entry: u64, message: String },

    #[error("Corrupted metadata: {0}")]
    CorruptedMetadata(String),

    #[error("Read error at offset {offset}: {message}")]
    ReadError { offset: u64, message: String },

    #[error("No file system detected")]
    NoFileSystem,
}

impl FileSystemError {
    /// The entry identifier the error refers to, if any
    pub fn entry(&self) -> Option<u64> {
        match self {
            FileSystemError::CorruptedEntry { entry, .. } => Some(*entry),
            _ => None,
        }
    }
}

/// Lazy sequence of metadata records
///
/// An `Err` item reports one unparsable entry; the iterator keeps going.
pub type MetadataStream<'a> =
    Box<dyn Iterator<Item = Result<MetadataRecord, FileSystemError>> + Send + 'a>;

/// Trait for parsing file system metadata
///
/// Implementations parse one specific layout within one volume of an
/// image and enumerate every directory-entry-equivalent structure,
/// allocated or not.
///
/// # Example
///
/// ```ignore
/// let parser = ExtParser::open(&image, volume)?;
/// for entry in parser.entries() {
///     match entry {
///         Ok(record) if record.is_deleted() => println!("deleted: {}", record.path),
///         Ok(_) => {}
///         Err(warning) => eprintln!("skipped: {warning}"),
///     }
/// }
/// ```
pub trait FileSystemParser: Send + Sync {
    /// Returns the filesystem kind this parser handles
    fn kind(&self) -> FilesystemKind;

    /// The volume this parser reads, in image coordinates
    fn volume(&self) -> ByteRange;

    /// Enumerates every entry lazily
    fn entries(&self) -> MetadataStream<'_>;
}
