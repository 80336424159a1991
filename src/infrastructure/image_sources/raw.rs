//! Raw (dd) image source
//!
//! Memory-maps each segment of a plain sector copy and stitches reads across
//! segment boundaries. Mapping gives zero-copy access and lets every worker
//! read concurrently without a file-position lock.

use super::segments::{discover_raw_segments, image_identifier};
use crate::domain::entities::{
    AcquisitionMetadata, ByteRange, ImageFormat, ImageInfo, SegmentDescriptor,
};
use crate::domain::repositories::{ImageError, ImageSource, clamp_read};
use memmap2::Mmap;
use std::fs::File;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Logical sector size assumed for raw images
const RAW_SECTOR_SIZE: u32 = 512;

/// One mapped segment file
struct MappedSegment {
    /// Logical offset of the segment's first byte
    start: u64,
    /// `None` for empty segment files, which cannot be mapped
    mmap: Option<Mmap>,
}

impl MappedSegment {
    fn len(&self) -> u64 {
        self.mmap.as_ref().map_or(0, |m| m.len() as u64)
    }
}

/// Raw image reader over one or more segment files
///
/// # Example
///
/// ```ignore
/// let image = RawImage::open(Path::new("disk.001"))?; // also maps disk.002, ...
/// let mbr = image.read_block(0, 512)?;
/// ```
pub struct RawImage {
    info: ImageInfo,
    segments: Vec<MappedSegment>,
}

impl RawImage {
    /// Opens a raw image, discovering numbered split segments
    pub fn open(path: &Path) -> Result<Self, ImageError> {
        Self::open_segments(&discover_raw_segments(path))
    }

    /// Opens an explicit, ordered list of segment files
    pub fn open_segments(paths: &[PathBuf]) -> Result<Self, ImageError> {
        let first = paths
            .first()
            .ok_or_else(|| ImageError::NotFound("no image segments given".into()))?;

        let mut segments = Vec::with_capacity(paths.len());
        let mut descriptors = Vec::with_capacity(paths.len());
        let mut offset = 0u64;

        for (index, path) in paths.iter().enumerate() {
            let mapped = map_segment(path, offset)?;
            let len = mapped.len();
            descriptors.push(SegmentDescriptor {
                number: index as u32 + 1,
                path: path.clone(),
                file_size: len,
                logical_range: ByteRange::with_len(offset, len),
            });
            offset += len;
            segments.push(mapped);
        }

        if offset == 0 {
            return Err(ImageError::Format(format!(
                "image {} has zero size",
                first.display()
            )));
        }

        debug!(
            image = %first.display(),
            segments = segments.len(),
            size = offset,
            "opened raw image"
        );

        Ok(Self {
            info: ImageInfo {
                format: ImageFormat::Raw,
                identifier: image_identifier(first),
                block_size: RAW_SECTOR_SIZE,
                total_size: offset,
                acquisition: AcquisitionMetadata::default(),
                segments: descriptors,
            },
            segments,
        })
    }

    /// Zero-copy view when the range lies in a single segment
    pub fn slice_at(&self, offset: u64, length: usize) -> Option<&[u8]> {
        let segment = self.segment_for(offset)?;
        let mmap = segment.mmap.as_ref()?;
        let start = (offset - segment.start) as usize;
        let end = start.checked_add(length)?;
        mmap.get(start..end)
    }

    fn segment_for(&self, offset: u64) -> Option<&MappedSegment> {
        let index = self
            .segments
            .partition_point(|s| s.start + s.len() <= offset);
        self.segments.get(index)
    }
}

fn map_segment(path: &Path, start: u64) -> Result<MappedSegment, ImageError> {
    let file = File::open(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => ImageError::NotFound(path.display().to_string()),
        _ => ImageError::Io(e),
    })?;
    let size = file.metadata()?.len();
    if size == 0 {
        return Ok(MappedSegment { start, mmap: None });
    }
    // SAFETY: the mapping is read-only and the engine never writes to evidence.
    let mmap = unsafe { Mmap::map(&file) }?;
    Ok(MappedSegment {
        start,
        mmap: Some(mmap),
    })
}

impl ImageSource for RawImage {
    fn info(&self) -> &ImageInfo {
        &self.info
    }

    fn read_block(&self, offset: u64, length: usize) -> Result<Vec<u8>, ImageError> {
        let to_read = clamp_read(offset, length, self.info.total_size)?;
        let mut out = Vec::with_capacity(to_read);
        let mut position = offset;

        while out.len() < to_read {
            let mmap = self
                .segment_for(position)
                .and_then(|s| s.mmap.as_ref().map(|m| (s.start, m)));
            let Some((segment_start, mmap)) = mmap else {
                return Err(ImageError::Read {
                    offset: position,
                    message: "offset not covered by any segment".into(),
                });
            };
            let start = (position - segment_start) as usize;
            let take = (to_read - out.len()).min(mmap.len() - start);
            out.extend_from_slice(&mmap[start..start + take]);
            position += take as u64;
        }

        Ok(out)
    }
}
