//! File system parsers
//!
//! [`MetadataExtractor`] finds the volumes of an image (the whole image, or
//! the entries of its partition table), identifies the filesystem on each
//! and streams per-entry metadata through the matching parser.

pub mod ext4;
pub mod fat;
pub mod ntfs;
mod partition;
pub(crate) mod volume;

pub use ext4::ExtParser;
pub use fat::FatParser;
pub use ntfs::NtfsParser;
pub use partition::{PartitionEntry, read_partition_table};

use crate::domain::entities::{ByteRange, FilesystemKind, VolumeSummary};
use crate::domain::repositories::{FileSystemError, ImageSource, MetadataStream};
use tracing::{debug, info};

/// A region of the image that may hold a filesystem
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Volume {
    pub index: usize,
    pub range: ByteRange,
    /// `None` when no supported filesystem was recognized
    pub kind: Option<FilesystemKind>,
    pub description: String,
}

impl Volume {
    /// Summary entry for the run report
    pub fn summary(&self, records: usize) -> VolumeSummary {
        VolumeSummary {
            index: self.index,
            range: self.range,
            filesystem: self.kind,
            description: self.description.clone(),
            records,
        }
    }
}

/// Result of volume discovery
#[derive(Debug, Clone, Default)]
pub struct VolumeDiscovery {
    pub volumes: Vec<Volume>,
    /// Partition table problems; discovery still returns what it could
    pub warnings: Vec<FileSystemError>,
}

impl VolumeDiscovery {
    /// Volumes with a recognized filesystem
    pub fn parseable(&self) -> impl Iterator<Item = &Volume> {
        self.volumes.iter().filter(|v| v.kind.is_some())
    }
}

/// Identifies filesystems and dispatches to their parsers
///
/// # Example
///
/// ```ignore
/// let extractor = MetadataExtractor::new();
/// if let Some(kind) = extractor.detect(&image) {
///     for entry in extractor.extract(&image, kind) {
///         // ...
///     }
/// }
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct MetadataExtractor;

impl MetadataExtractor {
    pub fn new() -> Self {
        Self
    }

    /// Filesystem occupying the image from offset 0, if any
    pub fn detect(&self, source: &dyn ImageSource) -> Option<FilesystemKind> {
        self.detect_at(source, source.info().full_range()?)
    }

    /// Filesystem starting at `volume.start()`, probing NTFS, ext, then FAT
    pub fn detect_at(
        &self,
        source: &dyn ImageSource,
        volume: ByteRange,
    ) -> Option<FilesystemKind> {
        FilesystemKind::all().into_iter().find(|kind| match kind {
            FilesystemKind::Ntfs => NtfsParser::recognizes(source, volume),
            FilesystemKind::Ext => ExtParser::recognizes(source, volume),
            FilesystemKind::Fat => FatParser::recognizes(source, volume),
        })
    }

    /// Finds the volumes of an image
    ///
    /// A filesystem at offset 0 makes the whole image one volume; otherwise
    /// each partition table entry is examined.
    pub fn discover_volumes(&self, source: &dyn ImageSource) -> VolumeDiscovery {
        let Some(full) = source.info().full_range() else {
            return VolumeDiscovery::default();
        };

        if let Some(kind) = self.detect_at(source, full) {
            info!(filesystem = %kind, "filesystem found at image start");
            return VolumeDiscovery {
                volumes: vec![Volume {
                    index: 0,
                    range: full,
                    kind: Some(kind),
                    description: "whole image".to_string(),
                }],
                warnings: Vec::new(),
            };
        }

        match read_partition_table(source) {
            Ok(entries) => {
                let volumes: Vec<Volume> = entries
                    .into_iter()
                    .enumerate()
                    .map(|(index, entry)| Volume {
                        index,
                        range: entry.range,
                        kind: self.detect_at(source, entry.range),
                        description: entry.description,
                    })
                    .collect();
                for volume in &volumes {
                    debug!(
                        index = volume.index,
                        range = %volume.range,
                        filesystem = ?volume.kind,
                        "volume discovered"
                    );
                }
                VolumeDiscovery {
                    volumes,
                    warnings: Vec::new(),
                }
            }
            Err(error) => VolumeDiscovery {
                volumes: Vec::new(),
                warnings: vec![error],
            },
        }
    }

    /// Streams the records of the filesystem at offset 0
    ///
    /// Opening failures surface as the single `Err` item of the stream.
    pub fn extract<'a>(
        &self,
        source: &'a dyn ImageSource,
        kind: FilesystemKind,
    ) -> MetadataStream<'a> {
        match source.info().full_range() {
            Some(full) => self.extract_range(source, kind, full),
            None => Box::new(std::iter::empty()),
        }
    }

    /// Streams the records of one discovered volume
    pub fn extract_volume<'a>(
        &self,
        source: &'a dyn ImageSource,
        volume: &Volume,
    ) -> MetadataStream<'a> {
        match volume.kind {
            Some(kind) => self.extract_range(source, kind, volume.range),
            None => Box::new(std::iter::empty()),
        }
    }

    fn extract_range<'a>(
        &self,
        source: &'a dyn ImageSource,
        kind: FilesystemKind,
        range: ByteRange,
    ) -> MetadataStream<'a> {
        let opened = match kind {
            FilesystemKind::Ext => ExtParser::open(source, range).map(ExtParser::into_entries),
            FilesystemKind::Fat => FatParser::open(source, range).map(FatParser::into_entries),
            FilesystemKind::Ntfs => NtfsParser::open(source, range).map(NtfsParser::into_entries),
        };
        opened.unwrap_or_else(|error| Box::new(std::iter::once(Err(error))))
    }
}
