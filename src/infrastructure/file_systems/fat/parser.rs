//! FAT12/16/32 filesystem parser implementation
//!
//! Walks the directory tree from the root, reporting entries whose first
//! name byte is 0xE5 as deleted. Deleted entries have their cluster chain
//! zeroed, so their data is assumed contiguous from the first cluster.

use crate::domain::entities::{
    AllocationStatus, ByteRange, EntryKind, FilesystemKind, MetadataRecord, Timestamps,
};
use crate::domain::repositories::{
    FileSystemError, FileSystemParser, ImageSource, MetadataStream,
};
use crate::infrastructure::file_systems::volume::{
    VolumeReader, coalesce, fat_time, le_u8, le_u16, le_u32, truncate_extents,
};
use std::collections::{HashSet, VecDeque};
use std::vec;
use tracing::info;

const BOOT_SECTOR_SIZE: usize = 512;
const DIR_ENTRY_SIZE: usize = 32;

const DELETED_MARKER: u8 = 0xE5;
const ATTR_VOLUME_ID: u8 = 0x08;
const ATTR_DIRECTORY: u8 = 0x10;
const ATTR_LONG_NAME: u8 = 0x0F;

/// Directories larger than this are not walked
const MAX_DIRECTORY_BYTES: u64 = 4 * 1024 * 1024;

/// FAT variant, decided by cluster count
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FatVariant {
    Fat12,
    Fat16,
    Fat32,
}

impl FatVariant {
    fn end_of_chain(&self) -> u32 {
        match self {
            FatVariant::Fat12 => 0x0FF8,
            FatVariant::Fat16 => 0xFFF8,
            FatVariant::Fat32 => 0x0FFF_FFF8,
        }
    }
}

/// FAT BIOS Parameter Block
#[derive(Debug, Clone)]
struct FatBootSector {
    bytes_per_sector: u16,
    sectors_per_cluster: u8,
    reserved_sectors: u16,
    fat_count: u8,
    root_entries: u16,
    total_sectors: u32,
    fat_sectors: u32,
    root_cluster: u32,
}

impl FatBootSector {
    fn parse(data: &[u8]) -> Result<Self, FileSystemError> {
        if data.len() < BOOT_SECTOR_SIZE {
            return Err(FileSystemError::InvalidSuperblock(
                "FAT boot sector too small".to_string(),
            ));
        }
        if data[510..512] != [0x55, 0xAA] || !matches!(data[0], 0xEB | 0xE9) {
            return Err(FileSystemError::InvalidSuperblock(
                "missing boot signature or jump instruction".to_string(),
            ));
        }

        let total16 = le_u16(data, 19)? as u32;
        let fat16 = le_u16(data, 22)? as u32;
        Ok(Self {
            bytes_per_sector: le_u16(data, 11)?,
            sectors_per_cluster: le_u8(data, 13)?,
            reserved_sectors: le_u16(data, 14)?,
            fat_count: le_u8(data, 16)?,
            root_entries: le_u16(data, 17)?,
            total_sectors: if total16 != 0 { total16 } else { le_u32(data, 32)? },
            fat_sectors: if fat16 != 0 { fat16 } else { le_u32(data, 36)? },
            root_cluster: le_u32(data, 44)?,
        })
    }

    fn is_valid(&self) -> bool {
        matches!(self.bytes_per_sector, 512 | 1024 | 2048 | 4096)
            && self.sectors_per_cluster.is_power_of_two()
            && self.reserved_sectors > 0
            && self.fat_count > 0
            && self.fat_sectors > 0
            && self.total_sectors > self.first_data_sector()
    }

    fn root_dir_sectors(&self) -> u32 {
        (self.root_entries as u32 * DIR_ENTRY_SIZE as u32).div_ceil(self.bytes_per_sector as u32)
    }

    fn first_root_sector(&self) -> u32 {
        self.reserved_sectors as u32 + self.fat_count as u32 * self.fat_sectors
    }

    fn first_data_sector(&self) -> u32 {
        self.first_root_sector() + self.root_dir_sectors()
    }

    fn cluster_count(&self) -> u32 {
        (self.total_sectors - self.first_data_sector()) / self.sectors_per_cluster as u32
    }

    fn variant(&self) -> FatVariant {
        match self.cluster_count() {
            count if count < 4085 => FatVariant::Fat12,
            count if count < 65525 => FatVariant::Fat16,
            _ => FatVariant::Fat32,
        }
    }

    fn cluster_size(&self) -> u64 {
        self.bytes_per_sector as u64 * self.sectors_per_cluster as u64
    }
}

/// A directory still to be walked
#[derive(Debug, Clone)]
struct PendingDirectory {
    path: String,
    /// `None` is the fixed FAT12/16 root region
    first_cluster: Option<u32>,
    deleted: bool,
}

/// Directory bytes and the volume offset of each cluster-sized piece
#[derive(Debug)]
struct DirectoryData {
    bytes: Vec<u8>,
    units: Vec<u64>,
    unit_len: u64,
}

impl DirectoryData {
    /// VolumeReader offset of the `index`th 32-byte entry
    fn location(&self, index: usize) -> u64 {
        let byte = (index * DIR_ENTRY_SIZE) as u64;
        let unit = (byte / self.unit_len) as usize;
        self.units.get(unit).copied().unwrap_or_default() + byte % self.unit_len
    }
}

/// A parsed 8.3 directory entry
#[derive(Debug, Clone)]
struct ShortEntry {
    raw_name: [u8; 11],
    attributes: u8,
    first_cluster: u32,
    size: u32,
    timestamps: Timestamps,
}

impl ShortEntry {
    fn parse(entry: &[u8], variant: FatVariant) -> Result<Self, FileSystemError> {
        let mut raw_name = [0u8; 11];
        raw_name.copy_from_slice(&entry[..11]);
        let cluster_hi = if variant == FatVariant::Fat32 {
            le_u16(entry, 20)? as u32
        } else {
            0
        };
        Ok(Self {
            raw_name,
            attributes: le_u8(entry, 11)?,
            first_cluster: (cluster_hi << 16) | le_u16(entry, 26)? as u32,
            size: le_u32(entry, 28)?,
            timestamps: Timestamps {
                created: fat_time(le_u16(entry, 16)?, le_u16(entry, 14)?),
                modified: fat_time(le_u16(entry, 24)?, le_u16(entry, 22)?),
                accessed: fat_time(le_u16(entry, 18)?, 0),
                deleted: None,
            },
        })
    }

    fn is_deleted(&self) -> bool {
        self.raw_name[0] == DELETED_MARKER
    }

    fn is_directory(&self) -> bool {
        self.attributes & ATTR_DIRECTORY != 0
    }

    /// 8.3 name; a deleted entry's lost first character becomes `_`
    fn display_name(&self) -> String {
        let mut base = self.raw_name[..8].to_vec();
        if base[0] == DELETED_MARKER {
            base[0] = b'_';
        } else if base[0] == 0x05 {
            base[0] = DELETED_MARKER;
        }
        let base = String::from_utf8_lossy(&base).trim_end().to_string();
        let extension = String::from_utf8_lossy(&self.raw_name[8..]).trim_end().to_string();
        if extension.is_empty() {
            base
        } else {
            format!("{base}.{extension}")
        }
    }

    fn checksum(&self) -> u8 {
        self.raw_name
            .iter()
            .fold(0u8, |sum, &b| sum.rotate_right(1).wrapping_add(b))
    }
}

/// Long file name fragments collected ahead of their short entry
#[derive(Debug, Default)]
struct LongName {
    fragments: Vec<Vec<u16>>,
    checksum: Option<u8>,
}

impl LongName {
    fn push(&mut self, entry: &[u8]) {
        let checksum = entry[13];
        if self.checksum.is_some_and(|c| c != checksum) {
            self.fragments.clear();
        }
        self.checksum = Some(checksum);
        let units = [1..11, 14..26, 28..32]
            .into_iter()
            .flat_map(|span| entry[span].chunks_exact(2))
            .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
            .collect();
        self.fragments.push(units);
    }

    /// Assembles the name if it belongs to `short`
    fn take_for(&mut self, short: &ShortEntry) -> Option<String> {
        let fragments = std::mem::take(&mut self.fragments);
        let checksum = self.checksum.take()?;
        if fragments.is_empty() || checksum != short.checksum() {
            return None;
        }
        // Fragments are stored last-first on disk
        let units: Vec<u16> = fragments
            .into_iter()
            .rev()
            .flatten()
            .take_while(|&u| u != 0x0000 && u != 0xFFFF)
            .collect();
        let name = String::from_utf16_lossy(&units);
        (!name.is_empty()).then_some(name)
    }

    fn clear(&mut self) {
        self.fragments.clear();
        self.checksum = None;
    }
}

/// FAT12/16/32 filesystem parser
#[derive(Clone)]
pub struct FatParser<'a> {
    volume: VolumeReader<'a>,
    boot_sector: FatBootSector,
    variant: FatVariant,
    table: Vec<u8>,
}

impl<'a> FatParser<'a> {
    /// Opens the FAT filesystem occupying `range` of the image
    pub fn open(source: &'a dyn ImageSource, range: ByteRange) -> Result<Self, FileSystemError> {
        let volume = VolumeReader::new(source, range);
        let boot_sector = Self::read_boot_sector(&volume)?;
        let variant = boot_sector.variant();

        let table = volume.read(
            boot_sector.reserved_sectors as u64 * boot_sector.bytes_per_sector as u64,
            boot_sector.fat_sectors as usize * boot_sector.bytes_per_sector as usize,
        )?;

        info!(
            volume = %range,
            variant = ?variant,
            clusters = boot_sector.cluster_count(),
            cluster_size = boot_sector.cluster_size(),
            "FAT filesystem opened"
        );

        Ok(Self {
            volume,
            boot_sector,
            variant,
            table,
        })
    }

    /// Consumes the parser into a lazy record stream
    pub fn into_entries(self) -> MetadataStream<'a> {
        let root = match self.variant {
            FatVariant::Fat32 => Some(self.boot_sector.root_cluster),
            _ => None,
        };
        let visited = root.into_iter().collect();
        Box::new(DirectoryWalk {
            parser: self,
            queue: VecDeque::from([PendingDirectory {
                path: String::new(),
                first_cluster: root,
                deleted: false,
            }]),
            visited,
            current: Vec::new().into_iter(),
        })
    }

    /// Returns true when a valid FAT boot sector starts the range
    pub(crate) fn recognizes(source: &dyn ImageSource, range: ByteRange) -> bool {
        Self::read_boot_sector(&VolumeReader::new(source, range)).is_ok()
    }

    fn read_boot_sector(volume: &VolumeReader<'_>) -> Result<FatBootSector, FileSystemError> {
        let data = volume.read(0, BOOT_SECTOR_SIZE)?;
        let boot_sector = FatBootSector::parse(&data)?;
        if !boot_sector.is_valid() {
            return Err(FileSystemError::InvalidSuperblock(
                "Invalid FAT geometry".to_string(),
            ));
        }
        Ok(boot_sector)
    }

    /// Raw table entry for a cluster
    fn table_entry(&self, cluster: u32) -> Option<u32> {
        let index = cluster as usize;
        match self.variant {
            FatVariant::Fat12 => {
                let raw = le_u16(&self.table, index + index / 2).ok()? as u32;
                Some(if cluster % 2 == 1 { raw >> 4 } else { raw & 0x0FFF })
            }
            FatVariant::Fat16 => le_u16(&self.table, index * 2).ok().map(u32::from),
            FatVariant::Fat32 => le_u32(&self.table, index * 4).ok().map(|v| v & 0x0FFF_FFFF),
        }
    }

    /// Next cluster in a chain, or `None` at end of chain or on a free entry
    fn next_cluster(&self, cluster: u32) -> Option<u32> {
        let value = self.table_entry(cluster)?;
        let valid = value >= 2 && value < self.variant.end_of_chain() - 1;
        valid.then_some(value)
    }

    fn is_free(&self, cluster: u32) -> bool {
        self.table_entry(cluster) == Some(0)
    }

    fn cluster_is_valid(&self, cluster: u32) -> bool {
        cluster >= 2 && cluster - 2 < self.boot_sector.cluster_count()
    }

    /// Follows a cluster chain, capped at `limit` clusters
    fn chain(&self, first: u32, limit: u64) -> Vec<u32> {
        let mut clusters = Vec::new();
        let mut seen = HashSet::new();
        let mut current = Some(first);
        while let Some(cluster) = current {
            if clusters.len() as u64 >= limit
                || !self.cluster_is_valid(cluster)
                || !seen.insert(cluster)
            {
                break;
            }
            clusters.push(cluster);
            current = self.next_cluster(cluster);
        }
        clusters
    }

    /// Clusters assumed for a deleted entry whose chain was released
    fn contiguous(&self, first: u32, count: u64) -> Vec<u32> {
        (0..count)
            .map_while(|i| {
                let cluster = first.checked_add(i as u32)?;
                self.cluster_is_valid(cluster).then_some(cluster)
            })
            .collect()
    }

    fn cluster_offset(&self, cluster: u32) -> u64 {
        let data_start =
            self.boot_sector.first_data_sector() as u64 * self.boot_sector.bytes_per_sector as u64;
        data_start + (cluster as u64 - 2) * self.boot_sector.cluster_size()
    }

    fn clusters_to_extents(&self, clusters: &[u32]) -> Vec<ByteRange> {
        let cluster_size = self.boot_sector.cluster_size();
        let extents = clusters
            .iter()
            .filter_map(|&c| self.volume.extent(self.cluster_offset(c), cluster_size))
            .collect();
        coalesce(extents)
    }

    /// Reads a directory's entries along with where each piece lives
    fn read_directory(
        &self,
        directory: &PendingDirectory,
    ) -> Result<DirectoryData, FileSystemError> {
        match directory.first_cluster {
            None => {
                let offset = self.boot_sector.first_root_sector() as u64
                    * self.boot_sector.bytes_per_sector as u64;
                let length = self.boot_sector.root_entries as usize * DIR_ENTRY_SIZE;
                Ok(DirectoryData {
                    bytes: self.volume.read(offset, length)?,
                    units: vec![offset],
                    unit_len: length.max(1) as u64,
                })
            }
            Some(first) => {
                let cluster_size = self.boot_sector.cluster_size();
                let clusters = if directory.deleted || self.is_free(first) {
                    self.contiguous(first, 1)
                } else {
                    self.chain(first, MAX_DIRECTORY_BYTES / cluster_size)
                };
                let mut bytes = Vec::with_capacity(clusters.len() * cluster_size as usize);
                let mut units = Vec::with_capacity(clusters.len());
                for &cluster in &clusters {
                    let offset = self.cluster_offset(cluster);
                    bytes.extend(self.volume.read(offset, cluster_size as usize)?);
                    units.push(offset);
                }
                Ok(DirectoryData {
                    bytes,
                    units,
                    unit_len: cluster_size,
                })
            }
        }
    }

    /// Parses one directory into records, queueing its subdirectories
    fn walk_directory(
        &self,
        directory: &PendingDirectory,
        queue: &mut VecDeque<PendingDirectory>,
        visited: &mut HashSet<u32>,
    ) -> Vec<Result<MetadataRecord, FileSystemError>> {
        let data = match self.read_directory(directory) {
            Ok(data) => data,
            Err(error) => return vec![Err(error)],
        };

        let mut records = Vec::new();
        let mut long_name = LongName::default();

        for (index, entry) in data.bytes.chunks_exact(DIR_ENTRY_SIZE).enumerate() {
            if entry[0] == 0x00 {
                break;
            }
            if entry[11] == ATTR_LONG_NAME {
                long_name.push(entry);
                continue;
            }
            if entry[11] & ATTR_VOLUME_ID != 0 {
                long_name.clear();
                continue;
            }

            let volume_offset = data.location(index);
            let identifier = volume_offset / DIR_ENTRY_SIZE as u64;
            let short = match ShortEntry::parse(entry, self.variant) {
                Ok(short) => short,
                Err(error) => {
                    long_name.clear();
                    records.push(Err(FileSystemError::CorruptedEntry {
                        entry: identifier,
                        message: error.to_string(),
                    }));
                    continue;
                }
            };
            let name = long_name
                .take_for(&short)
                .unwrap_or_else(|| short.display_name());
            if name == "." || name == ".." {
                continue;
            }

            let path = format!("{}/{}", directory.path, name);
            let deleted = directory.deleted || short.is_deleted();

            if short.is_directory()
                && self.cluster_is_valid(short.first_cluster)
                && visited.insert(short.first_cluster)
            {
                queue.push_back(PendingDirectory {
                    path: path.clone(),
                    first_cluster: Some(short.first_cluster),
                    deleted,
                });
            }

            let Some(entry_location) = self.volume.extent(volume_offset, DIR_ENTRY_SIZE as u64)
            else {
                records.push(Err(FileSystemError::CorruptedEntry {
                    entry: identifier,
                    message: "directory entry outside the volume".into(),
                }));
                continue;
            };

            records.push(Ok(self.record_for(&short, path, identifier, entry_location, deleted)));
        }
        records
    }

    fn record_for(
        &self,
        short: &ShortEntry,
        path: String,
        identifier: u64,
        entry_location: ByteRange,
        deleted: bool,
    ) -> MetadataRecord {
        let size = short.size as u64;
        let data_extents = if short.is_directory() || size == 0 {
            Vec::new()
        } else {
            let needed = size.div_ceil(self.boot_sector.cluster_size());
            let released = short.is_deleted() || self.is_free(short.first_cluster);
            let clusters = if released {
                self.contiguous(short.first_cluster, needed)
            } else {
                self.chain(short.first_cluster, needed)
            };
            truncate_extents(self.clusters_to_extents(&clusters), size)
        };

        MetadataRecord {
            path,
            identifier,
            filesystem: FilesystemKind::Fat,
            entry_kind: if short.is_directory() {
                EntryKind::Directory
            } else {
                EntryKind::File
            },
            timestamps: short.timestamps,
            logical_size: if short.is_directory() { 0 } else { size },
            allocation: if deleted {
                AllocationStatus::Unallocated
            } else {
                AllocationStatus::Allocated
            },
            entry_location,
            data_extents,
        }
    }
}

/// Lazy breadth-first directory walk, one directory at a time
struct DirectoryWalk<'a> {
    parser: FatParser<'a>,
    queue: VecDeque<PendingDirectory>,
    visited: HashSet<u32>,
    current: vec::IntoIter<Result<MetadataRecord, FileSystemError>>,
}

impl Iterator for DirectoryWalk<'_> {
    type Item = Result<MetadataRecord, FileSystemError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(item) = self.current.next() {
                return Some(item);
            }
            let directory = self.queue.pop_front()?;
            self.current = self
                .parser
                .walk_directory(&directory, &mut self.queue, &mut self.visited)
                .into_iter();
        }
    }
}

impl FileSystemParser for FatParser<'_> {
    fn kind(&self) -> FilesystemKind {
        FilesystemKind::Fat
    }

    fn volume(&self) -> ByteRange {
        self.volume.range()
    }

    fn entries(&self) -> MetadataStream<'_> {
        self.clone().into_entries()
    }
}
