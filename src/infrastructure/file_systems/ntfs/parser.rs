//! NTFS filesystem parser implementation
//!
//! Parses the NTFS boot sector, locates the MFT (Master File Table) through
//! its own `$DATA` runlist and walks every FILE record. Records whose in-use
//! flag is clear are deleted files whose attributes are still readable.

use crate::domain::entities::{
    AllocationStatus, ByteRange, EntryKind, FilesystemKind, MetadataRecord, Timestamps,
};
use crate::domain::repositories::{
    FileSystemError, FileSystemParser, ImageSource, MetadataStream,
};
use crate::infrastructure::file_systems::volume::{
    VolumeReader, coalesce, filetime, le_u8, le_u16, le_u32, le_u64, truncate_extents,
};
use byteorder::{LittleEndian, ReadBytesExt};
use std::collections::{HashMap, HashSet};
use std::io::Cursor;
use tracing::{debug, info};

/// NTFS boot sector signature "NTFS    "
const NTFS_OEM_ID: [u8; 8] = [0x4E, 0x54, 0x46, 0x53, 0x20, 0x20, 0x20, 0x20];

/// Boot sector size
const BOOT_SECTOR_SIZE: usize = 512;

/// MFT entry signature "FILE"
const MFT_ENTRY_SIGNATURE: [u8; 4] = [0x46, 0x49, 0x4C, 0x45];

const ROOT_RECORD: u64 = 5;

const ATTR_STANDARD_INFORMATION: u32 = 0x10;
const ATTR_FILE_NAME: u32 = 0x30;
const ATTR_DATA: u32 = 0x80;
const ATTR_END: u32 = 0xFFFF_FFFF;

const RECORD_IN_USE: u16 = 0x0001;
const RECORD_IS_DIRECTORY: u16 = 0x0002;

const NAMESPACE_DOS: u8 = 2;

/// Bytes protected by each update sequence entry
const FIXUP_STRIDE: usize = 512;

/// Parent chains longer than this are treated as corrupt
const MAX_PATH_DEPTH: usize = 256;

/// NTFS boot sector (BIOS Parameter Block), fields the MFT walk needs
#[derive(Debug, Clone)]
struct NtfsBootSector {
    oem_id: [u8; 8],
    bytes_per_sector: u16,
    sectors_per_cluster: u8,
    total_sectors: u64,
    mft_lcn: u64,
    /// Clusters per MFT record (negative means 2^|value| bytes)
    clusters_per_mft_record: i8,
}

impl NtfsBootSector {
    /// Parses boot sector from raw bytes
    fn parse(data: &[u8]) -> Result<Self, FileSystemError> {
        if data.len() < BOOT_SECTOR_SIZE {
            return Err(FileSystemError::InvalidSuperblock(
                "NTFS boot sector too small".to_string(),
            ));
        }

        let mut oem_id = [0u8; 8];
        oem_id.copy_from_slice(&data[3..11]);

        let mut cursor = Cursor::new(data);

        // Bytes per sector at offset 11
        cursor.set_position(11);
        let bytes_per_sector = cursor
            .read_u16::<LittleEndian>()
            .map_err(|e| FileSystemError::InvalidSuperblock(e.to_string()))?;

        // Sectors per cluster at offset 13
        let sectors_per_cluster = cursor
            .read_u8()
            .map_err(|e| FileSystemError::InvalidSuperblock(e.to_string()))?;

        // Total sectors at offset 40
        cursor.set_position(40);
        let total_sectors = cursor
            .read_u64::<LittleEndian>()
            .map_err(|e| FileSystemError::InvalidSuperblock(e.to_string()))?;

        // MFT LCN at offset 48
        let mft_lcn = cursor
            .read_u64::<LittleEndian>()
            .map_err(|e| FileSystemError::InvalidSuperblock(e.to_string()))?;

        // Clusters per MFT record at offset 64
        cursor.set_position(64);
        let clusters_per_mft_record = cursor
            .read_i8()
            .map_err(|e| FileSystemError::InvalidSuperblock(e.to_string()))?;

        Ok(Self {
            oem_id,
            bytes_per_sector,
            sectors_per_cluster,
            total_sectors,
            mft_lcn,
            clusters_per_mft_record,
        })
    }

    /// Validates the boot sector
    fn is_valid(&self) -> bool {
        self.oem_id == NTFS_OEM_ID
            && self.bytes_per_sector >= 512
            && self.bytes_per_sector.is_power_of_two()
            && self.sectors_per_cluster > 0
            && self.total_sectors > 0
            && (256..=65536).contains(&self.mft_record_size())
    }

    /// Returns the cluster size in bytes
    fn cluster_size(&self) -> u64 {
        self.bytes_per_sector as u64 * self.sectors_per_cluster as u64
    }

    /// Returns the MFT record size in bytes
    fn mft_record_size(&self) -> u64 {
        if self.clusters_per_mft_record > 0 {
            self.cluster_size() * self.clusters_per_mft_record as u64
        } else {
            // Negative value means 2^|value| bytes
            1u64 << (-(self.clusters_per_mft_record as i64)).min(63)
        }
    }

    /// Returns the MFT offset in bytes, `None` when the LCN is out of range
    fn mft_offset(&self) -> Option<u64> {
        self.mft_lcn.checked_mul(self.cluster_size())
    }
}

/// A `$FILE_NAME` attribute
#[derive(Debug, Clone)]
struct FileName {
    parent: u64,
    name: String,
    namespace: u8,
}

/// Where an unnamed `$DATA` stream lives
#[derive(Debug, Clone)]
enum DataStream {
    Resident(Option<ByteRange>, u64),
    NonResident { runs: Vec<(u64, u64)>, size: u64 },
}

/// One parsed FILE record
#[derive(Debug, Clone)]
struct MftRecord {
    in_use: bool,
    is_directory: bool,
    is_extension: bool,
    timestamps: Timestamps,
    file_name: Option<FileName>,
    data: Option<DataStream>,
}

/// Applies the update sequence array in place
fn apply_fixups(record: &mut [u8]) -> Result<(), FileSystemError> {
    let usa_offset = le_u16(record, 4)? as usize;
    let usa_count = le_u16(record, 6)? as usize;
    if usa_count < 2 {
        return Ok(());
    }
    // One entry for the sequence number, then one per 512-byte sector
    if (usa_count - 1) * FIXUP_STRIDE != record.len()
        || usa_offset + usa_count * 2 > record.len()
    {
        return Err(FileSystemError::CorruptedMetadata(format!(
            "update sequence array of {usa_count} entries at {usa_offset} \
             does not fit a {}-byte record",
            record.len()
        )));
    }
    let sequence = le_u16(record, usa_offset)?;

    for sector in 1..usa_count {
        let tail = sector * FIXUP_STRIDE - 2;
        if le_u16(record, tail)? != sequence {
            return Err(FileSystemError::CorruptedMetadata(format!(
                "update sequence mismatch in sector {sector}"
            )));
        }
        let original = le_u16(record, usa_offset + sector * 2)?;
        record[tail..tail + 2].copy_from_slice(&original.to_le_bytes());
    }
    Ok(())
}

/// Decodes a runlist into `(lcn, clusters)` pairs, dropping sparse runs
fn decode_runlist(data: &[u8]) -> Result<Vec<(u64, u64)>, FileSystemError> {
    let mut runs = Vec::new();
    let mut pos = 0usize;
    let mut lcn: i64 = 0;

    while let Some(&header) = data.get(pos) {
        if header == 0 {
            break;
        }
        let length_size = (header & 0x0F) as usize;
        let offset_size = (header >> 4) as usize;
        if length_size == 0 || length_size > 8 || offset_size > 8 {
            return Err(FileSystemError::CorruptedMetadata(format!(
                "bad runlist header {header:#04x}"
            )));
        }
        let field = |start: usize, size: usize| {
            data.get(start..start + size)
                .ok_or_else(|| FileSystemError::CorruptedMetadata("runlist truncated".into()))
        };

        let length = field(pos + 1, length_size)?
            .iter()
            .rev()
            .fold(0u64, |acc, &b| (acc << 8) | b as u64);
        let offset_bytes = field(pos + 1 + length_size, offset_size)?;
        pos += 1 + length_size + offset_size;

        if offset_size == 0 {
            continue;
        }
        // Signed little-endian delta from the previous run
        let mut delta = offset_bytes
            .iter()
            .rev()
            .fold(0i64, |acc, &b| (acc << 8) | b as i64);
        let bits = offset_size as u32 * 8;
        if bits < 64 && offset_bytes[offset_size - 1] & 0x80 != 0 {
            delta -= 1i64 << bits;
        }
        lcn += delta;
        if lcn < 0 {
            return Err(FileSystemError::CorruptedMetadata("negative LCN".into()));
        }
        runs.push((lcn as u64, length));
    }
    Ok(runs)
}

fn utf16_name(bytes: &[u8]) -> String {
    let units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
        .collect();
    String::from_utf16_lossy(&units)
}

impl MftRecord {
    /// Parses a fixed-up record; `Ok(None)` for a never-used slot
    fn parse(data: &mut [u8], location: ByteRange) -> Result<Option<Self>, FileSystemError> {
        if data.iter().take(4).all(|&b| b == 0) {
            return Ok(None);
        }
        if data[..4] != MFT_ENTRY_SIGNATURE {
            return Err(FileSystemError::CorruptedMetadata(
                "missing FILE signature".into(),
            ));
        }
        apply_fixups(data)?;

        let first_attribute = le_u16(data, 20)? as usize;
        let flags = le_u16(data, 22)?;
        let base_reference = le_u64(data, 32)? & 0x0000_FFFF_FFFF_FFFF;

        let mut record = MftRecord {
            in_use: flags & RECORD_IN_USE != 0,
            is_directory: flags & RECORD_IS_DIRECTORY != 0,
            is_extension: base_reference != 0,
            timestamps: Timestamps::default(),
            file_name: None,
            data: None,
        };

        let mut pos = first_attribute;
        while pos + 8 <= data.len() {
            let kind = le_u32(data, pos)?;
            if kind == ATTR_END {
                break;
            }
            let length = le_u32(data, pos + 4)? as usize;
            if length < 16 || pos + length > data.len() {
                return Err(FileSystemError::CorruptedMetadata(format!(
                    "attribute at {pos} has bad length {length}"
                )));
            }
            let attribute = &data[pos..pos + length];
            record.apply_attribute(kind, attribute, location.start() + pos as u64)?;
            pos += length;
        }
        Ok(Some(record))
    }

    fn apply_attribute(
        &mut self,
        kind: u32,
        attribute: &[u8],
        attribute_offset: u64,
    ) -> Result<(), FileSystemError> {
        let non_resident = le_u8(attribute, 8)? != 0;
        let name_length = le_u8(attribute, 9)?;

        match kind {
            ATTR_STANDARD_INFORMATION if !non_resident => {
                let (_, content) = resident_content(attribute)?;
                self.timestamps.created = filetime(le_u64(content, 0)?);
                self.timestamps.modified = filetime(le_u64(content, 8)?);
                self.timestamps.accessed = filetime(le_u64(content, 24)?);
            }
            ATTR_FILE_NAME if !non_resident => {
                let (_, content) = resident_content(attribute)?;
                let parent = le_u64(content, 0)? & 0x0000_FFFF_FFFF_FFFF;
                let length = le_u8(content, 0x40)? as usize;
                let namespace = le_u8(content, 0x41)?;
                let raw = content.get(0x42..0x42 + length * 2).ok_or_else(|| {
                    FileSystemError::CorruptedMetadata("file name out of bounds".into())
                })?;
                let candidate = FileName {
                    parent,
                    name: utf16_name(raw),
                    namespace,
                };
                // Prefer the long name over the DOS 8.3 alias
                let replace = match &self.file_name {
                    None => true,
                    Some(existing) => existing.namespace == NAMESPACE_DOS,
                };
                if replace {
                    self.file_name = Some(candidate);
                }
            }
            ATTR_DATA if name_length == 0 && self.data.is_none() => {
                if non_resident {
                    let start_vcn = le_u64(attribute, 16)?;
                    if start_vcn != 0 {
                        return Ok(());
                    }
                    let runlist_offset = le_u16(attribute, 32)? as usize;
                    let size = le_u64(attribute, 48)?;
                    let runs = decode_runlist(attribute.get(runlist_offset..).unwrap_or(&[]))?;
                    self.data = Some(DataStream::NonResident { runs, size });
                } else {
                    let (offset, content) = resident_content(attribute)?;
                    let range =
                        ByteRange::with_len(attribute_offset + offset as u64, content.len() as u64);
                    self.data = Some(DataStream::Resident(range, content.len() as u64));
                }
            }
            _ => {}
        }
        Ok(())
    }
}

/// Offset and bytes of a resident attribute's content
fn resident_content(attribute: &[u8]) -> Result<(usize, &[u8]), FileSystemError> {
    let length = le_u32(attribute, 16)? as usize;
    let offset = le_u16(attribute, 20)? as usize;
    let content = attribute.get(offset..offset + length).ok_or_else(|| {
        FileSystemError::CorruptedMetadata("resident content out of bounds".into())
    })?;
    Ok((offset, content))
}

/// Name and parent of a record, collected before paths are resolved
#[derive(Debug, Clone)]
struct NameEntry {
    parent: u64,
    name: String,
}

/// NTFS filesystem parser
#[derive(Clone)]
pub struct NtfsParser<'a> {
    volume: VolumeReader<'a>,
    boot_sector: NtfsBootSector,
    /// Image extents holding the MFT, in record order
    mft_extents: Vec<ByteRange>,
    record_count: u64,
}

impl<'a> NtfsParser<'a> {
    /// Opens the NTFS volume occupying `range` of the image
    pub fn open(source: &'a dyn ImageSource, range: ByteRange) -> Result<Self, FileSystemError> {
        let volume = VolumeReader::new(source, range);
        let boot_sector = Self::read_boot_sector(&volume)?;

        let record_size = boot_sector.mft_record_size();
        let outside = || FileSystemError::InvalidSuperblock("MFT lies outside the volume".into());
        let mft_offset = boot_sector.mft_offset().ok_or_else(outside)?;
        let mft_location = volume.extent(mft_offset, record_size).ok_or_else(outside)?;
        let mut first = volume.read(mft_offset, record_size as usize)?;
        let mft_record = MftRecord::parse(&mut first, mft_location)?
            .ok_or_else(|| FileSystemError::InvalidSuperblock("empty $MFT record".into()))?;

        let cluster_size = boot_sector.cluster_size();
        let (mft_extents, mft_size) = match mft_record.data {
            Some(DataStream::NonResident { runs, size }) => {
                let extents = runs
                    .iter()
                    .map(|&(lcn, clusters)| volume.units(lcn, clusters, cluster_size))
                    .filter_map(Result::transpose)
                    .collect::<Result<Vec<_>, _>>()?;
                (truncate_extents(coalesce(extents), size), size)
            }
            _ => {
                return Err(FileSystemError::InvalidSuperblock(
                    "$MFT has no non-resident data stream".into(),
                ));
            }
        };

        let record_count = mft_size / record_size;
        info!(
            volume = %range,
            records = record_count,
            record_size,
            cluster_size,
            "NTFS filesystem opened"
        );

        Ok(Self {
            volume,
            boot_sector,
            mft_extents,
            record_count,
        })
    }

    /// Consumes the parser into a lazy record stream
    pub fn into_entries(self) -> MetadataStream<'a> {
        let names = self.collect_names();
        Box::new(MftWalk {
            parser: self,
            names,
            directory_paths: HashMap::new(),
            next_record: 0,
        })
    }

    /// Returns true when a valid NTFS boot sector starts the range
    pub(crate) fn recognizes(source: &dyn ImageSource, range: ByteRange) -> bool {
        Self::read_boot_sector(&VolumeReader::new(source, range)).is_ok()
    }

    /// Reads and parses the boot sector
    fn read_boot_sector(volume: &VolumeReader<'_>) -> Result<NtfsBootSector, FileSystemError> {
        let data = volume.read(0, BOOT_SECTOR_SIZE)?;
        let boot_sector = NtfsBootSector::parse(&data)?;

        if !boot_sector.is_valid() {
            return Err(FileSystemError::InvalidSuperblock(
                "Invalid NTFS OEM ID or geometry".to_string(),
            ));
        }
        Ok(boot_sector)
    }

    /// Image location of MFT record `number`
    fn record_location(&self, number: u64) -> Option<ByteRange> {
        let record_size = self.boot_sector.mft_record_size();
        let mut offset = number * record_size;
        for extent in &self.mft_extents {
            if offset < extent.len() {
                return ByteRange::with_len(extent.start() + offset, record_size);
            }
            offset -= extent.len();
        }
        None
    }

    fn read_record(&self, number: u64) -> Result<Option<(ByteRange, MftRecord)>, FileSystemError> {
        let entry_error = |message: String| FileSystemError::CorruptedEntry {
            entry: number,
            message,
        };
        let location = self
            .record_location(number)
            .ok_or_else(|| entry_error("record outside the MFT".into()))?;
        let mut data = self.volume.read(
            location.start() - self.volume.range().start(),
            location.len() as usize,
        )?;
        let record = MftRecord::parse(&mut data, location).map_err(|e| entry_error(e.to_string()))?;
        Ok(record.map(|record| (location, record)))
    }

    /// First pass: names and parents of every readable record
    fn collect_names(&self) -> HashMap<u64, NameEntry> {
        let mut names = HashMap::new();
        for number in 0..self.record_count {
            if let Ok(Some((_, record))) = self.read_record(number) {
                if record.is_extension {
                    continue;
                }
                if let Some(file_name) = record.file_name {
                    names.insert(
                        number,
                        NameEntry {
                            parent: file_name.parent,
                            name: file_name.name,
                        },
                    );
                }
            }
        }
        debug!(named = names.len(), "NTFS name pass finished");
        names
    }

    fn data_extents(&self, stream: &DataStream) -> Result<Vec<ByteRange>, FileSystemError> {
        match stream {
            DataStream::Resident(range, _) => Ok(range.iter().copied().collect()),
            DataStream::NonResident { runs, size } => {
                let cluster_size = self.boot_sector.cluster_size();
                let extents = runs
                    .iter()
                    .map(|&(lcn, clusters)| self.volume.units(lcn, clusters, cluster_size))
                    .filter_map(Result::transpose)
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(truncate_extents(coalesce(extents), *size))
            }
        }
    }
}

/// Lazy MFT walk resolving paths through parent references
struct MftWalk<'a> {
    parser: NtfsParser<'a>,
    names: HashMap<u64, NameEntry>,
    directory_paths: HashMap<u64, String>,
    next_record: u64,
}

impl MftWalk<'_> {
    fn resolve_path(&mut self, number: u64) -> String {
        if number == ROOT_RECORD {
            return "/".to_string();
        }
        let mut parts = Vec::new();
        let mut seen = HashSet::new();
        let mut current = number;
        let prefix = loop {
            if current == ROOT_RECORD {
                break String::new();
            }
            if current != number {
                if let Some(known) = self.directory_paths.get(&current) {
                    break known.clone();
                }
            }
            match self.names.get(&current) {
                Some(entry) if seen.insert(current) && parts.len() < MAX_PATH_DEPTH => {
                    parts.push(entry.name.clone());
                    current = entry.parent;
                }
                _ => break "/$Orphan".to_string(),
            }
        };

        if parts.is_empty() {
            return format!("{prefix}/{number}");
        }
        parts.reverse();
        format!("{prefix}/{}", parts.join("/"))
    }

    fn step(&mut self, number: u64) -> Result<Option<MetadataRecord>, FileSystemError> {
        let Some((location, record)) = self.parser.read_record(number)? else {
            return Ok(None);
        };
        if record.is_extension {
            return Ok(None);
        }

        let path = self.resolve_path(number);
        if record.is_directory {
            self.directory_paths.insert(number, path.clone());
        }

        let data_extents = match &record.data {
            Some(stream) => {
                self.parser
                    .data_extents(stream)
                    .map_err(|e| FileSystemError::CorruptedEntry {
                        entry: number,
                        message: e.to_string(),
                    })?
            }
            None => Vec::new(),
        };
        let logical_size = match &record.data {
            Some(DataStream::Resident(_, size)) | Some(DataStream::NonResident { size, .. }) => {
                *size
            }
            None => 0,
        };

        Ok(Some(MetadataRecord {
            path,
            identifier: number,
            filesystem: FilesystemKind::Ntfs,
            entry_kind: if record.is_directory {
                EntryKind::Directory
            } else {
                EntryKind::File
            },
            timestamps: record.timestamps,
            logical_size,
            allocation: if record.in_use {
                AllocationStatus::Allocated
            } else {
                AllocationStatus::Unallocated
            },
            entry_location: location,
            data_extents,
        }))
    }
}

impl Iterator for MftWalk<'_> {
    type Item = Result<MetadataRecord, FileSystemError>;

    fn next(&mut self) -> Option<Self::Item> {
        while self.next_record < self.parser.record_count {
            let number = self.next_record;
            self.next_record += 1;
            match self.step(number) {
                Ok(Some(record)) => return Some(Ok(record)),
                Ok(None) => continue,
                Err(error) => return Some(Err(error)),
            }
        }
        None
    }
}

impl FileSystemParser for NtfsParser<'_> {
    fn kind(&self) -> FilesystemKind {
        FilesystemKind::Ntfs
    }

    fn volume(&self) -> ByteRange {
        self.volume.range()
    }

    fn entries(&self) -> MetadataStream<'_> {
        self.clone().into_entries()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_boot_sector_parse() {
        let mut data = vec![0u8; BOOT_SECTOR_SIZE];
        data[3..11].copy_from_slice(&NTFS_OEM_ID);
        data[11..13].copy_from_slice(&512u16.to_le_bytes());
        data[13] = 8;
        data[40..48].copy_from_slice(&2048u64.to_le_bytes());
        data[48..56].copy_from_slice(&4u64.to_le_bytes());
        data[64] = 0xF6; // -10 => 1024-byte records

        let boot = NtfsBootSector::parse(&data).unwrap();
        assert!(boot.is_valid());
        assert_eq!(boot.cluster_size(), 4096);
        assert_eq!(boot.mft_record_size(), 1024);
        assert_eq!(boot.mft_offset(), Some(16384));
    }

    #[test]
    fn test_runlist_decoding() {
        // 0x10 clusters at LCN 0x20, then 0x08 clusters 0x10 back, then sparse
        let runlist = [0x11, 0x10, 0x20, 0x11, 0x08, 0xF0, 0x01, 0x04, 0x00];
        let runs = decode_runlist(&runlist).unwrap();
        assert_eq!(runs, vec![(0x20, 0x10), (0x10, 0x08)]);
    }

    #[test]
    fn test_fixups_restore_sector_tails() {
        let mut record = vec![0u8; 1024];
        record[4..6].copy_from_slice(&48u16.to_le_bytes());
        record[6..8].copy_from_slice(&3u16.to_le_bytes());
        record[48..50].copy_from_slice(&0x0007u16.to_le_bytes());
        record[50..52].copy_from_slice(&0xAAAAu16.to_le_bytes());
        record[52..54].copy_from_slice(&0xBBBBu16.to_le_bytes());
        record[510..512].copy_from_slice(&0x0007u16.to_le_bytes());
        record[1022..1024].copy_from_slice(&0x0007u16.to_le_bytes());

        apply_fixups(&mut record).unwrap();
        assert_eq!(&record[510..512], &[0xAA, 0xAA]);
        assert_eq!(&record[1022..1024], &[0xBB, 0xBB]);

        record[510..512].copy_from_slice(&0x0009u16.to_le_bytes());
        record[1022..1024].copy_from_slice(&0x0007u16.to_le_bytes());
        assert!(apply_fixups(&mut record).is_err());
    }

    #[test]
    fn test_fixups_reject_out_of_bounds_array() {
        let mut record = vec![0u8; 1024];
        record[510..512].copy_from_slice(&0x0007u16.to_le_bytes());
        record[1022..1024].copy_from_slice(&0x0007u16.to_le_bytes());

        // Array starting two bytes before the record end
        record[4..6].copy_from_slice(&1020u16.to_le_bytes());
        record[6..8].copy_from_slice(&3u16.to_le_bytes());
        record[1020..1022].copy_from_slice(&0x0007u16.to_le_bytes());
        assert!(apply_fixups(&mut record).is_err());

        // More sectors than the record holds
        record[4..6].copy_from_slice(&48u16.to_le_bytes());
        record[6..8].copy_from_slice(&0xFFFFu16.to_le_bytes());
        assert!(apply_fixups(&mut record).is_err());

        // Too few sectors to cover the record
        record[6..8].copy_from_slice(&2u16.to_le_bytes());
        assert!(apply_fixups(&mut record).is_err());
    }

    #[test]
    fn test_mft_offset_overflow_detected() {
        let mut data = vec![0u8; BOOT_SECTOR_SIZE];
        data[3..11].copy_from_slice(&NTFS_OEM_ID);
        data[11..13].copy_from_slice(&512u16.to_le_bytes());
        data[13] = 8;
        data[40..48].copy_from_slice(&2048u64.to_le_bytes());
        data[48..56].copy_from_slice(&u64::MAX.to_le_bytes());
        data[64] = 0xF6;

        let boot = NtfsBootSector::parse(&data).unwrap();
        assert_eq!(boot.mft_offset(), None);
    }
}
