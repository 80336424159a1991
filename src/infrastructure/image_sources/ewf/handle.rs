//! Expert Witness Format image source
//!
//! Walks the section chain of every segment file once at open time to build
//! a global chunk map, then serves reads by inflating chunks on demand
//! through a shared LRU cache.

use super::cache::{ChunkCache, DEFAULT_CACHE_ENTRIES};
use super::sections::{
    COMPRESSED_FLAG, FILE_HEADER_SIZE, FileHeader, SECTION_DESCRIPTOR_SIZE, SectionDescriptor,
    TableSection, VolumeSection, adler32, apply_header_text, decode_header_text, inflate,
    parse_digest_section, parse_hash_section,
};
use crate::domain::entities::{
    AcquisitionMetadata, ByteRange, ImageFormat, ImageInfo, SegmentDescriptor, StoredHash,
};
use crate::domain::repositories::{ImageError, ImageSource, clamp_read};
use crate::infrastructure::image_sources::segments::{discover_ewf_segments, image_identifier};
use memmap2::Mmap;
use parking_lot::Mutex;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

/// Where one chunk is stored
#[derive(Debug, Clone, Copy)]
struct ChunkLocation {
    segment: usize,
    /// Offset within the segment file
    offset: u64,
    /// Bytes stored on disk, including a trailing checksum if uncompressed
    stored_size: u64,
    compressed: bool,
}

/// Section facts gathered from one segment file
#[derive(Default)]
struct SegmentScan {
    volume: Option<VolumeSection>,
    header_text: Vec<String>,
    hashes: Vec<StoredHash>,
    chunks: Vec<ChunkLocation>,
}

/// Reader over a (possibly multi-segment) E01 image
pub struct EwfImage {
    info: ImageInfo,
    segments: Vec<Mmap>,
    chunks: Vec<ChunkLocation>,
    chunk_size: u64,
    cache: Mutex<ChunkCache>,
}

impl EwfImage {
    /// Opens an image from its first segment, discovering E02, E03, ...
    pub fn open(path: &Path) -> Result<Self, ImageError> {
        Self::open_segments(&discover_ewf_segments(path))
    }

    /// Opens an explicit, ordered list of segment files
    pub fn open_segments(paths: &[PathBuf]) -> Result<Self, ImageError> {
        let first = paths
            .first()
            .ok_or_else(|| ImageError::NotFound("no image segments given".into()))?;

        let mut maps = Vec::with_capacity(paths.len());
        let mut scan = SegmentScan::default();
        let mut chunk_counts = Vec::with_capacity(paths.len());

        for (index, path) in paths.iter().enumerate() {
            let mmap = map_file(path)?;
            let header = FileHeader::parse(&mmap)?;
            if header.segment_number as usize != index + 1 {
                return Err(ImageError::Format(format!(
                    "{} is segment {} but was expected as segment {}",
                    path.display(),
                    header.segment_number,
                    index + 1
                )));
            }
            let before = scan.chunks.len();
            walk_sections(&mmap, index, &mut scan)?;
            chunk_counts.push(scan.chunks.len() - before);
            maps.push(mmap);
        }

        let volume = scan
            .volume
            .ok_or_else(|| ImageError::Format("no volume section found".into()))?;
        let chunk_size = volume.chunk_size();
        let total_size = volume.media_size();

        if scan.chunks.len() != volume.chunk_count as usize {
            return Err(ImageError::Format(format!(
                "volume declares {} chunks but tables list {}",
                volume.chunk_count,
                scan.chunks.len()
            )));
        }
        if (scan.chunks.len() as u64) * chunk_size < total_size {
            return Err(ImageError::Format(format!(
                "chunk tables cover less than the {total_size} byte media"
            )));
        }

        let mut acquisition = AcquisitionMetadata::default();
        for text in &scan.header_text {
            apply_header_text(text, &mut acquisition);
        }
        acquisition.acquisition_hashes = dedup_hashes(scan.hashes);

        let mut descriptors = Vec::with_capacity(paths.len());
        let mut first_chunk = 0u64;
        for (index, (path, mmap)) in paths.iter().zip(&maps).enumerate() {
            let count = chunk_counts[index] as u64;
            let start = first_chunk * chunk_size;
            let end = ((first_chunk + count) * chunk_size).min(total_size);
            descriptors.push(SegmentDescriptor {
                number: index as u32 + 1,
                path: path.clone(),
                file_size: mmap.len() as u64,
                logical_range: ByteRange::new(start, end),
            });
            first_chunk += count;
        }

        debug!(
            image = %first.display(),
            segments = maps.len(),
            chunks = scan.chunks.len(),
            chunk_size,
            size = total_size,
            "opened expert-witness image"
        );

        Ok(Self {
            info: ImageInfo {
                format: ImageFormat::Ewf,
                identifier: image_identifier(first),
                block_size: volume.bytes_per_sector,
                total_size,
                acquisition,
                segments: descriptors,
            },
            segments: maps,
            chunks: scan.chunks,
            chunk_size,
            cache: Mutex::new(ChunkCache::new(DEFAULT_CACHE_ENTRIES)),
        })
    }

    /// Number of chunks in the image
    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    /// Uncompressed chunk size in bytes
    pub fn chunk_size(&self) -> u64 {
        self.chunk_size
    }

    /// Logical length of chunk `index` (the last one may be short)
    fn chunk_len(&self, index: usize) -> u64 {
        let start = index as u64 * self.chunk_size;
        self.chunk_size.min(self.info.total_size.saturating_sub(start))
    }

    fn read_chunk(&self, index: usize) -> Result<Arc<Vec<u8>>, ImageError> {
        if let Some(chunk) = self.cache.lock().get(index) {
            return Ok(chunk);
        }

        let logical_offset = index as u64 * self.chunk_size;
        let read_error = |message: String| ImageError::Read {
            offset: logical_offset,
            message,
        };

        let location = self
            .chunks
            .get(index)
            .ok_or_else(|| read_error(format!("chunk {index} not in chunk map")))?;
        let segment = &self.segments[location.segment];
        let start = location.offset as usize;
        let end = start + location.stored_size as usize;
        let stored = segment.get(start..end).ok_or_else(|| {
            read_error(format!("chunk {index} extends past end of segment file"))
        })?;

        let expected = self.chunk_len(index) as usize;
        let mut data = if location.compressed {
            inflate(stored).map_err(|e| read_error(format!("chunk {index}: {e}")))?
        } else {
            verify_uncompressed(stored, self.chunk_size as usize)
                .ok_or_else(|| read_error(format!("chunk {index} checksum mismatch")))?
                .to_vec()
        };

        if data.len() < expected {
            return Err(read_error(format!(
                "chunk {index} holds {} bytes, expected {expected}",
                data.len()
            )));
        }
        data.truncate(expected);

        let chunk = Arc::new(data);
        self.cache.lock().insert(index, Arc::clone(&chunk));
        Ok(chunk)
    }
}

/// Strips and checks the Adler-32 trailer of an uncompressed chunk
fn verify_uncompressed(stored: &[u8], chunk_size: usize) -> Option<&[u8]> {
    if stored.len() == chunk_size {
        return Some(stored);
    }
    let split = stored.len().checked_sub(4)?;
    let (data, trailer) = stored.split_at(split);
    let checksum = u32::from_le_bytes([trailer[0], trailer[1], trailer[2], trailer[3]]);
    (adler32(data) == checksum).then_some(data)
}

fn map_file(path: &Path) -> Result<Mmap, ImageError> {
    let file = File::open(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => ImageError::NotFound(path.display().to_string()),
        _ => ImageError::Io(e),
    })?;
    if file.metadata()?.len() < FILE_HEADER_SIZE {
        return Err(ImageError::Format(format!(
            "{} is too small to be an EWF segment",
            path.display()
        )));
    }
    // SAFETY: the mapping is read-only and the engine never writes to evidence.
    Ok(unsafe { Mmap::map(&file) }?)
}

/// Follows the section chain of one segment, collecting what the reader needs
fn walk_sections(data: &[u8], segment: usize, scan: &mut SegmentScan) -> Result<(), ImageError> {
    let mut offset = FILE_HEADER_SIZE;
    let mut sectors_end: Option<u64> = None;

    loop {
        let start = offset as usize;
        let descriptor_bytes = data
            .get(start..start + SECTION_DESCRIPTOR_SIZE)
            .ok_or_else(|| {
                ImageError::Format(format!(
                    "section chain runs past end of segment {}",
                    segment + 1
                ))
            })?;
        let section = SectionDescriptor::parse(descriptor_bytes, offset)?;
        let payload = data
            .get(section.data_offset() as usize..(section.end() as usize).min(data.len()))
            .unwrap_or(&[]);

        match section.kind.as_str() {
            "header" | "header2" => {
                match decode_header_text(payload, section.kind == "header2") {
                    Ok(text) => scan.header_text.push(text),
                    Err(e) => warn!(segment = segment + 1, error = %e, "unreadable header section"),
                }
            }
            "volume" | "disk" => {
                if scan.volume.is_none() {
                    scan.volume = Some(VolumeSection::parse(payload)?);
                }
            }
            "sectors" => sectors_end = Some(section.end()),
            "table" => {
                let table = TableSection::parse(payload)?;
                let end = sectors_end.unwrap_or(section.offset);
                push_chunks(&table, segment, end, &mut scan.chunks)?;
            }
            "hash" => scan.hashes.extend(parse_hash_section(payload)),
            "digest" => scan.hashes.extend(parse_digest_section(payload)),
            _ => {}
        }

        if section.is_terminal() {
            return Ok(());
        }
        if section.next <= offset {
            return Err(ImageError::Format(format!(
                "section chain loops back at {offset:#x} in segment {}",
                segment + 1
            )));
        }
        offset = section.next;
    }
}

/// Converts table entries to chunk locations
///
/// A chunk's stored size runs to the next entry; the last chunk of the table
/// runs to the end of its `sectors` section.
fn push_chunks(
    table: &TableSection,
    segment: usize,
    sectors_end: u64,
    chunks: &mut Vec<ChunkLocation>,
) -> Result<(), ImageError> {
    let offsets: Vec<(u64, bool)> = table
        .entries
        .iter()
        .map(|&entry| {
            (
                table.base_offset + (entry & !COMPRESSED_FLAG) as u64,
                entry & COMPRESSED_FLAG != 0,
            )
        })
        .collect();

    for (i, &(offset, compressed)) in offsets.iter().enumerate() {
        let end = offsets.get(i + 1).map_or(sectors_end, |&(next, _)| next);
        if end <= offset {
            return Err(ImageError::Format(format!(
                "chunk table entry {i} in segment {} is out of order",
                segment + 1
            )));
        }
        chunks.push(ChunkLocation {
            segment,
            offset,
            stored_size: end - offset,
            compressed,
        });
    }
    Ok(())
}

fn dedup_hashes(hashes: Vec<StoredHash>) -> Vec<StoredHash> {
    let mut unique: Vec<StoredHash> = Vec::with_capacity(hashes.len());
    for hash in hashes {
        if !unique.iter().any(|h| h.algorithm == hash.algorithm) {
            unique.push(hash);
        }
    }
    unique
}

impl ImageSource for EwfImage {
    fn info(&self) -> &ImageInfo {
        &self.info
    }

    fn read_block(&self, offset: u64, length: usize) -> Result<Vec<u8>, ImageError> {
        let to_read = clamp_read(offset, length, self.info.total_size)?;
        let mut out = Vec::with_capacity(to_read);
        let mut position = offset;

        while out.len() < to_read {
            let index = (position / self.chunk_size) as usize;
            let within = (position % self.chunk_size) as usize;
            let chunk = self.read_chunk(index)?;
            let take = (to_read - out.len()).min(chunk.len().saturating_sub(within));
            if take == 0 {
                return Err(ImageError::Read {
                    offset: position,
                    message: format!("chunk {index} is shorter than its map entry"),
                });
            }
            out.extend_from_slice(&chunk[within..within + take]);
            position += take as u64;
        }

        Ok(out)
    }
}
