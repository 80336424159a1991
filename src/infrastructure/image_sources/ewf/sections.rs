//! EWF v1 on-disk structures
//!
//! File header, section descriptors and the section payloads the reader
//! needs: acquisition header text, volume geometry, chunk tables and stored
//! hashes.

use crate::domain::entities::{AcquisitionMetadata, HashAlgorithm, StoredHash};
use crate::domain::repositories::ImageError;
use byteorder::{LittleEndian, ReadBytesExt};
use flate2::read::ZlibDecoder;
use std::io::{Cursor, Read};

/// EWF v1 (E01) signature
pub const EWF_SIGNATURE: [u8; 8] = *b"EVF\x09\x0d\x0a\xff\x00";

/// EWF v2 (Ex01) signature, recognised but not supported
pub const EWF2_SIGNATURE: [u8; 8] = *b"EVF2\x0d\x0a\x81\x00";

/// Size of the segment file header
pub const FILE_HEADER_SIZE: u64 = 13;

/// Size of a section descriptor
pub const SECTION_DESCRIPTOR_SIZE: usize = 76;

/// Size of the table section header preceding the offset entries
pub const TABLE_HEADER_SIZE: usize = 24;

/// High bit of a table entry: chunk is zlib compressed
pub const COMPRESSED_FLAG: u32 = 0x8000_0000;

/// Adler-32 checksum as used by EWF descriptors and chunks
pub fn adler32(data: &[u8]) -> u32 {
    const MOD_ADLER: u32 = 65_521;
    // Largest block that cannot overflow the running sums
    const NMAX: usize = 5552;

    let mut a: u32 = 1;
    let mut b: u32 = 0;
    for block in data.chunks(NMAX) {
        for &byte in block {
            a += byte as u32;
            b += a;
        }
        a %= MOD_ADLER;
        b %= MOD_ADLER;
    }
    (b << 16) | a
}

fn format_error(context: &str, e: impl std::fmt::Display) -> ImageError {
    ImageError::Format(format!("{context}: {e}"))
}

/// Segment file header
#[derive(Debug, Clone, Copy)]
pub(crate) struct FileHeader {
    pub segment_number: u16,
}

impl FileHeader {
    pub fn parse(data: &[u8]) -> Result<Self, ImageError> {
        if data.len() < FILE_HEADER_SIZE as usize {
            return Err(ImageError::Format("segment shorter than EWF file header".into()));
        }
        if data[..8] == EWF2_SIGNATURE {
            return Err(ImageError::Format(
                "EWF2 (Ex01) containers are not supported".into(),
            ));
        }
        if data[..8] != EWF_SIGNATURE {
            return Err(ImageError::Format("missing EWF signature".into()));
        }
        let mut cursor = Cursor::new(&data[9..11]);
        let segment_number = cursor
            .read_u16::<LittleEndian>()
            .map_err(|e| format_error("file header", e))?;
        Ok(Self { segment_number })
    }
}

/// Section descriptor
#[derive(Debug, Clone)]
pub(crate) struct SectionDescriptor {
    pub kind: String,
    /// Offset of this descriptor within its segment file
    pub offset: u64,
    /// Offset of the next descriptor within the segment file
    pub next: u64,
    /// Section size including the descriptor
    pub size: u64,
}

impl SectionDescriptor {
    pub fn parse(data: &[u8], offset: u64) -> Result<Self, ImageError> {
        if data.len() < SECTION_DESCRIPTOR_SIZE {
            return Err(ImageError::Format(format!(
                "truncated section descriptor at {offset:#x}"
            )));
        }

        let kind_bytes = &data[..16];
        let kind_len = kind_bytes.iter().position(|&b| b == 0).unwrap_or(16);
        let kind = String::from_utf8_lossy(&kind_bytes[..kind_len]).into_owned();

        let mut cursor = Cursor::new(&data[16..]);
        let next = cursor
            .read_u64::<LittleEndian>()
            .map_err(|e| format_error("section descriptor", e))?;
        let size = cursor
            .read_u64::<LittleEndian>()
            .map_err(|e| format_error("section descriptor", e))?;

        cursor.set_position(72 - 16);
        let stored = cursor
            .read_u32::<LittleEndian>()
            .map_err(|e| format_error("section descriptor", e))?;
        let computed = adler32(&data[..72]);
        if stored != computed {
            return Err(ImageError::Format(format!(
                "section descriptor checksum mismatch at {offset:#x} ({kind})"
            )));
        }

        Ok(Self {
            kind,
            offset,
            next,
            size,
        })
    }

    /// Offset of the section payload within the segment file
    pub fn data_offset(&self) -> u64 {
        self.offset + SECTION_DESCRIPTOR_SIZE as u64
    }

    /// Offset just past the section within the segment file
    pub fn end(&self) -> u64 {
        self.offset + self.size
    }

    /// Whether the section chain stops after this descriptor
    pub fn is_terminal(&self) -> bool {
        matches!(self.kind.as_str(), "next" | "done") || self.next == self.offset || self.next == 0
    }
}

/// Media geometry from a `volume` or `disk` section
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct VolumeSection {
    pub chunk_count: u32,
    pub sectors_per_chunk: u32,
    pub bytes_per_sector: u32,
    pub sector_count: u64,
}

impl VolumeSection {
    pub fn parse(data: &[u8]) -> Result<Self, ImageError> {
        let mut cursor = Cursor::new(data);
        cursor.set_position(4);
        let chunk_count = cursor
            .read_u32::<LittleEndian>()
            .map_err(|e| format_error("volume section", e))?;
        let sectors_per_chunk = cursor
            .read_u32::<LittleEndian>()
            .map_err(|e| format_error("volume section", e))?;
        let bytes_per_sector = cursor
            .read_u32::<LittleEndian>()
            .map_err(|e| format_error("volume section", e))?;
        let sector_count = cursor
            .read_u64::<LittleEndian>()
            .map_err(|e| format_error("volume section", e))?;

        if sectors_per_chunk == 0 || bytes_per_sector == 0 {
            return Err(ImageError::Format("volume section has zero geometry".into()));
        }

        Ok(Self {
            chunk_count,
            sectors_per_chunk,
            bytes_per_sector,
            sector_count,
        })
    }

    pub fn chunk_size(&self) -> u64 {
        self.sectors_per_chunk as u64 * self.bytes_per_sector as u64
    }

    pub fn media_size(&self) -> u64 {
        self.sector_count * self.bytes_per_sector as u64
    }
}

/// Chunk offsets from a `table` section
#[derive(Debug, Clone)]
pub(crate) struct TableSection {
    pub base_offset: u64,
    pub entries: Vec<u32>,
}

impl TableSection {
    pub fn parse(data: &[u8]) -> Result<Self, ImageError> {
        let mut cursor = Cursor::new(data);
        let entry_count = cursor
            .read_u32::<LittleEndian>()
            .map_err(|e| format_error("table section", e))? as usize;
        cursor.set_position(8);
        let base_offset = cursor
            .read_u64::<LittleEndian>()
            .map_err(|e| format_error("table section", e))?;

        let needed = TABLE_HEADER_SIZE + entry_count * 4;
        if data.len() < needed {
            return Err(ImageError::Format(format!(
                "table declares {entry_count} entries but holds {} bytes",
                data.len()
            )));
        }

        cursor.set_position(TABLE_HEADER_SIZE as u64);
        let mut entries = Vec::with_capacity(entry_count);
        for _ in 0..entry_count {
            entries.push(
                cursor
                    .read_u32::<LittleEndian>()
                    .map_err(|e| format_error("table entry", e))?,
            );
        }

        Ok(Self {
            base_offset,
            entries,
        })
    }
}

/// Inflates a zlib stream
pub(crate) fn inflate(data: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut decoder = ZlibDecoder::new(data);
    let mut out = Vec::new();
    decoder.read_to_end(&mut out)?;
    Ok(out)
}

/// Decodes `header` (ASCII) or `header2` (UTF-16LE) acquisition text
pub(crate) fn decode_header_text(compressed: &[u8], utf16: bool) -> Result<String, ImageError> {
    let raw = inflate(compressed).map_err(|e| format_error("header section", e))?;
    if !utf16 {
        return Ok(String::from_utf8_lossy(&raw).into_owned());
    }
    let body = raw.strip_prefix(&[0xFF, 0xFE]).unwrap_or(&raw);
    let units: Vec<u16> = body
        .chunks_exact(2)
        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
        .collect();
    Ok(String::from_utf16_lossy(&units))
}

/// Fills acquisition fields from header text
///
/// The text is a category count, a category name, a tab separated key
/// line and a tab separated value line. Fields already set are kept.
pub(crate) fn apply_header_text(text: &str, metadata: &mut AcquisitionMetadata) {
    let lines: Vec<&str> = text.lines().map(|l| l.trim_end_matches('\r')).collect();
    let Some(main) = lines.iter().position(|l| l.trim() == "main") else {
        return;
    };
    let (Some(keys), Some(values)) = (lines.get(main + 1), lines.get(main + 2)) else {
        return;
    };

    for (key, value) in keys.split('\t').zip(values.split('\t')) {
        let value = value.trim();
        if value.is_empty() {
            continue;
        }
        let slot = match key.trim() {
            "c" => &mut metadata.case_number,
            "n" => &mut metadata.evidence_number,
            "a" => &mut metadata.description,
            "e" => &mut metadata.examiner,
            "t" => &mut metadata.notes,
            "m" => &mut metadata.acquisition_date,
            "u" => &mut metadata.system_date,
            _ => continue,
        };
        if slot.is_none() {
            *slot = Some(value.to_string());
        }
    }
}

fn digest_hex(bytes: &[u8]) -> Option<String> {
    if bytes.iter().all(|&b| b == 0) {
        None
    } else {
        Some(hex::encode(bytes))
    }
}

/// Stored MD5 from a `hash` section
pub(crate) fn parse_hash_section(data: &[u8]) -> Vec<StoredHash> {
    data.get(..16)
        .and_then(digest_hex)
        .map(|digest| StoredHash {
            algorithm: HashAlgorithm::Md5,
            digest,
        })
        .into_iter()
        .collect()
}

/// Stored MD5 and SHA-1 from a `digest` section
pub(crate) fn parse_digest_section(data: &[u8]) -> Vec<StoredHash> {
    let mut hashes = parse_hash_section(data);
    if let Some(digest) = data.get(16..36).and_then(digest_hex) {
        hashes.push(StoredHash {
            algorithm: HashAlgorithm::Sha1,
            digest,
        });
    }
    hashes
}
