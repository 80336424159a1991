//! ext2/3/4 filesystem parser implementation
//!
//! Walks the inode table of every block group, so inodes the filesystem has
//! released are reported alongside live ones. Names come from a directory
//! walk that also picks up deleted entries left in directory record slack.

use crate::domain::entities::{
    AllocationStatus, ByteRange, EntryKind, FilesystemKind, MetadataRecord, Timestamps,
};
use crate::domain::repositories::{
    FileSystemError, FileSystemParser, ImageSource, MetadataStream,
};
use crate::infrastructure::file_systems::volume::{
    VolumeReader, coalesce, le_u8, le_u16, le_u32, scaled, truncate_extents, unix_time,
};
use std::collections::{HashMap, HashSet, VecDeque};
use std::vec;
use tracing::{debug, info, warn};

/// ext superblock magic number
const EXT_SUPER_MAGIC: u16 = 0xEF53;

/// Superblock offset from volume start
const SUPERBLOCK_OFFSET: u64 = 1024;

/// Superblock size
const SUPERBLOCK_SIZE: usize = 1024;

const ROOT_INODE: u32 = 2;

const INCOMPAT_64BIT: u32 = 0x80;
const INODE_FLAG_EXTENTS: u32 = 0x0008_0000;
const INODE_FLAG_INLINE_DATA: u32 = 0x1000_0000;
const EXTENT_MAGIC: u16 = 0xF30A;
const MAX_EXTENT_DEPTH: u16 = 5;

const MODE_TYPE_MASK: u16 = 0xF000;
const MODE_DIRECTORY: u16 = 0x4000;
const MODE_REGULAR: u16 = 0x8000;
const MODE_SYMLINK: u16 = 0xA000;

const DIRENT_TYPE_DIRECTORY: u8 = 2;

/// Directories larger than this are not walked for names
const MAX_DIRECTORY_BYTES: u64 = 16 * 1024 * 1024;

/// ext superblock (only the fields the inode walk needs)
#[derive(Debug, Clone)]
struct ExtSuperblock {
    inode_count: u32,
    block_count: u64,
    first_data_block: u32,
    block_size: u32,
    inodes_per_group: u32,
    magic: u16,
    inode_size: u16,
    first_inode: u32,
    desc_size: u16,
}

impl ExtSuperblock {
    /// Parses superblock from raw bytes
    fn parse(data: &[u8]) -> Result<Self, FileSystemError> {
        if data.len() < SUPERBLOCK_SIZE {
            return Err(FileSystemError::InvalidSuperblock(
                "Superblock too small".to_string(),
            ));
        }

        let inode_count = le_u32(data, 0)?;
        let block_count_lo = le_u32(data, 4)?;
        let first_data_block = le_u32(data, 20)?;
        let log_block_size = le_u32(data, 24)?;
        let inodes_per_group = le_u32(data, 40)?;
        let magic = le_u16(data, 56)?;
        let rev_level = le_u32(data, 76)?;
        let feature_incompat = le_u32(data, 96)?;

        // Revision 0 has fixed inode geometry
        let (first_inode, inode_size) = if rev_level == 0 {
            (11, 128)
        } else {
            (le_u32(data, 84)?, le_u16(data, 88)?)
        };

        let is_64bit = feature_incompat & INCOMPAT_64BIT != 0;
        let block_count = if is_64bit {
            ((le_u32(data, 0x150)? as u64) << 32) | block_count_lo as u64
        } else {
            block_count_lo as u64
        };
        let desc_size = if is_64bit {
            le_u16(data, 0xFE)?.max(32)
        } else {
            32
        };

        if log_block_size > 6 {
            return Err(FileSystemError::InvalidSuperblock(format!(
                "block size exponent {log_block_size} out of range"
            )));
        }

        Ok(Self {
            inode_count,
            block_count,
            first_data_block,
            block_size: 1024u32 << log_block_size,
            inodes_per_group,
            magic,
            inode_size,
            first_inode,
            desc_size,
        })
    }

    /// Validates the superblock
    fn is_valid(&self) -> bool {
        self.magic == EXT_SUPER_MAGIC
            && self.block_size >= 1024
            && self.block_size <= 65536
            && self.inode_size >= 128
            && self.inode_size as u32 <= self.block_size
            && self.inode_size.is_power_of_two()
            && self.inodes_per_group > 0
            && self.inode_count > 0
    }

    fn group_count(&self) -> u32 {
        self.inode_count.div_ceil(self.inodes_per_group)
    }
}

/// The fields of an on-disk inode the extractor reports
#[derive(Debug, Clone)]
struct RawInode {
    mode: u16,
    size: u64,
    atime: u32,
    mtime: u32,
    dtime: u32,
    crtime: Option<u32>,
    links: u16,
    flags: u32,
    block: [u8; 60],
}

impl RawInode {
    fn parse(data: &[u8]) -> Result<Self, FileSystemError> {
        let mode = le_u16(data, 0)?;
        let size_lo = le_u32(data, 4)? as u64;
        let size_high = le_u32(data, 108)? as u64;
        let mut block = [0u8; 60];
        block.copy_from_slice(data.get(40..100).ok_or_else(|| {
            FileSystemError::CorruptedMetadata("inode shorter than block map".into())
        })?);

        // i_crtime sits past the 128-byte base inode when i_extra_isize covers it
        let crtime = if data.len() > 128 && le_u16(data, 128)? >= 0x14 {
            Some(le_u32(data, 0x90)?)
        } else {
            None
        };

        let size = if mode & MODE_TYPE_MASK == MODE_REGULAR {
            (size_high << 32) | size_lo
        } else {
            size_lo
        };

        Ok(Self {
            mode,
            size,
            atime: le_u32(data, 8)?,
            mtime: le_u32(data, 16)?,
            dtime: le_u32(data, 20)?,
            crtime,
            links: le_u16(data, 26)?,
            flags: le_u32(data, 32)?,
            block,
        })
    }

    fn never_used(&self) -> bool {
        self.mode == 0 && self.dtime == 0 && self.links == 0
    }

    fn is_deleted(&self) -> bool {
        self.links == 0 || self.dtime != 0
    }

    fn entry_kind(&self) -> EntryKind {
        match self.mode & MODE_TYPE_MASK {
            MODE_DIRECTORY => EntryKind::Directory,
            MODE_REGULAR => EntryKind::File,
            _ => EntryKind::Other,
        }
    }

    /// Data stored inside the inode itself instead of in blocks
    fn data_is_inline(&self) -> bool {
        self.flags & INODE_FLAG_INLINE_DATA != 0
            || (self.mode & MODE_TYPE_MASK == MODE_SYMLINK && self.size < 60)
    }

    fn timestamps(&self) -> Timestamps {
        Timestamps {
            created: self.crtime.and_then(unix_time),
            modified: unix_time(self.mtime),
            accessed: unix_time(self.atime),
            deleted: unix_time(self.dtime),
        }
    }
}

/// Names recovered by the directory walk
#[derive(Debug, Default)]
struct NameIndex {
    live: HashMap<u32, String>,
    deleted: HashMap<u32, String>,
}

impl NameIndex {
    fn path_for(&self, inode: u32) -> String {
        self.live
            .get(&inode)
            .or_else(|| self.deleted.get(&inode))
            .cloned()
            .unwrap_or_else(|| format!("/$Orphan/{inode}"))
    }
}

/// ext2/3/4 filesystem parser
#[derive(Clone)]
pub struct ExtParser<'a> {
    volume: VolumeReader<'a>,
    superblock: ExtSuperblock,
    /// Inode table start block per group
    inode_tables: Vec<u64>,
}

impl<'a> ExtParser<'a> {
    /// Opens the ext filesystem occupying `range` of the image
    pub fn open(source: &'a dyn ImageSource, range: ByteRange) -> Result<Self, FileSystemError> {
        let volume = VolumeReader::new(source, range);
        let superblock = Self::read_superblock(&volume)?;
        let inode_tables = Self::read_group_descriptors(&volume, &superblock)?;

        info!(
            volume = %range,
            inodes = superblock.inode_count,
            blocks = superblock.block_count,
            block_size = superblock.block_size,
            "ext filesystem opened"
        );
        let declared = superblock.block_count.checked_mul(superblock.block_size as u64);
        if declared.is_none_or(|bytes| bytes > volume.len()) {
            warn!(volume = %range, "ext filesystem extends past the end of its volume");
        }

        Ok(Self {
            volume,
            superblock,
            inode_tables,
        })
    }

    /// Consumes the parser into a lazy record stream
    ///
    /// The directory walk runs first; its warnings lead the stream.
    pub fn into_entries(self) -> MetadataStream<'a> {
        let (names, warnings) = self.build_name_index();
        Box::new(InodeWalk {
            parser: self,
            names,
            warnings: warnings.into_iter(),
            next_inode: 1,
            cache: BlockCache::default(),
        })
    }

    /// Returns true when a valid ext superblock sits at the expected offset
    pub(crate) fn recognizes(source: &dyn ImageSource, range: ByteRange) -> bool {
        Self::read_superblock(&VolumeReader::new(source, range)).is_ok()
    }

    /// Reads and parses the superblock
    fn read_superblock(volume: &VolumeReader<'_>) -> Result<ExtSuperblock, FileSystemError> {
        let data = volume.read(SUPERBLOCK_OFFSET, SUPERBLOCK_SIZE)?;
        let superblock = ExtSuperblock::parse(&data)?;

        if !superblock.is_valid() {
            return Err(FileSystemError::InvalidSuperblock(
                "Invalid ext magic number or geometry".to_string(),
            ));
        }
        Ok(superblock)
    }

    fn read_group_descriptors(
        volume: &VolumeReader<'_>,
        superblock: &ExtSuperblock,
    ) -> Result<Vec<u64>, FileSystemError> {
        let groups = superblock.group_count() as usize;
        let desc_size = superblock.desc_size as usize;
        let table_offset = (superblock.first_data_block as u64 + 1) * superblock.block_size as u64;
        let table = volume.read(table_offset, groups * desc_size)?;

        (0..groups)
            .map(|group| {
                let base = group * desc_size;
                let lo = le_u32(&table, base + 8)? as u64;
                let hi = if desc_size >= 64 {
                    le_u32(&table, base + 0x28)? as u64
                } else {
                    0
                };
                Ok((hi << 32) | lo)
            })
            .collect()
    }

    fn block_size(&self) -> u64 {
        self.superblock.block_size as u64
    }

    fn read_block(&self, block: u64) -> Result<Vec<u8>, FileSystemError> {
        self.check_block(block, 1)?;
        self.volume.read(
            scaled(block, self.block_size())?,
            self.superblock.block_size as usize,
        )
    }

    fn check_block(&self, block: u64, count: u64) -> Result<(), FileSystemError> {
        if block == 0 || block.saturating_add(count) > self.superblock.block_count {
            return Err(FileSystemError::CorruptedMetadata(format!(
                "block {block} (+{count}) outside the filesystem"
            )));
        }
        Ok(())
    }

    /// VolumeReader offset of an inode's on-disk structure
    fn inode_offset(&self, inode: u32) -> Option<u64> {
        let index = inode.checked_sub(1)?;
        let group = (index / self.superblock.inodes_per_group) as usize;
        let local = (index % self.superblock.inodes_per_group) as u64;
        let table = *self.inode_tables.get(group)?;
        table
            .checked_mul(self.block_size())?
            .checked_add(local * self.superblock.inode_size as u64)
    }

    fn read_inode(&self, inode: u32) -> Result<RawInode, FileSystemError> {
        let offset = self
            .inode_offset(inode)
            .ok_or_else(|| FileSystemError::CorruptedEntry {
                entry: inode as u64,
                message: "inode number outside the inode tables".into(),
            })?;
        let data = self
            .volume
            .read(offset, self.superblock.inode_size as usize)?;
        RawInode::parse(&data)
    }

    /// Data extents of an inode in image coordinates, trimmed to its size
    fn data_extents(
        &self,
        location: ByteRange,
        inode: &RawInode,
    ) -> Result<Vec<ByteRange>, FileSystemError> {
        if inode.size == 0 {
            return Ok(Vec::new());
        }
        if inode.data_is_inline() {
            let inline = ByteRange::with_len(location.start() + 40, inode.size.min(60));
            return Ok(inline.into_iter().collect());
        }
        // Deleted inodes on ext3/4 often have their block map wiped
        if inode.block.iter().all(|&b| b == 0) {
            return Ok(Vec::new());
        }

        let block_size = self.block_size();
        let extents = if inode.flags & INODE_FLAG_EXTENTS != 0 {
            let mut runs = Vec::new();
            self.walk_extent_node(&inode.block, MAX_EXTENT_DEPTH, &mut runs)?;
            runs.sort_by_key(|&(logical, _, _)| logical);
            runs.into_iter()
                .map(|(_, physical, count)| {
                    self.check_block(physical, count)?;
                    self.volume
                        .units(physical, count, block_size)?
                        .ok_or_else(|| {
                            FileSystemError::CorruptedMetadata("empty extent".into())
                        })
                })
                .collect::<Result<Vec<_>, _>>()?
        } else {
            let needed = inode.size.div_ceil(block_size);
            self.walk_block_map(&inode.block, needed)?
                .into_iter()
                .map(|block| self.volume.units(block, 1, block_size))
                .filter_map(Result::transpose)
                .collect::<Result<Vec<_>, _>>()?
        };

        Ok(truncate_extents(coalesce(extents), inode.size))
    }

    /// Collects `(logical, physical, count)` runs from an extent tree node
    fn walk_extent_node(
        &self,
        node: &[u8],
        depth_budget: u16,
        runs: &mut Vec<(u32, u64, u64)>,
    ) -> Result<(), FileSystemError> {
        if le_u16(node, 0)? != EXTENT_MAGIC {
            return Err(FileSystemError::CorruptedMetadata(
                "bad extent header magic".into(),
            ));
        }
        let entries = le_u16(node, 2)? as usize;
        let depth = le_u16(node, 6)?;
        if depth >= depth_budget {
            return Err(FileSystemError::CorruptedMetadata(format!(
                "extent tree depth {depth} too large"
            )));
        }

        for entry in 0..entries {
            let base = 12 + entry * 12;
            if depth == 0 {
                let logical = le_u32(node, base)?;
                let raw_len = le_u16(node, base + 4)?;
                // Lengths above 32768 mark uninitialized extents
                let count = if raw_len > 32768 { raw_len - 32768 } else { raw_len };
                let start_hi = le_u16(node, base + 6)? as u64;
                let start_lo = le_u32(node, base + 8)? as u64;
                runs.push((logical, (start_hi << 32) | start_lo, count as u64));
            } else {
                let leaf_lo = le_u32(node, base + 4)? as u64;
                let leaf_hi = le_u16(node, base + 8)? as u64;
                let child = self.read_block((leaf_hi << 32) | leaf_lo)?;
                self.walk_extent_node(&child, depth, runs)?;
            }
        }
        Ok(())
    }

    /// Resolves the classic direct/indirect block map; a zero pointer ends it
    fn walk_block_map(&self, map: &[u8], needed: u64) -> Result<Vec<u64>, FileSystemError> {
        let mut blocks = Vec::new();
        for slot in 0..12 {
            if blocks.len() as u64 >= needed {
                return Ok(blocks);
            }
            let block = le_u32(map, slot * 4)? as u64;
            if block == 0 {
                return Ok(blocks);
            }
            self.check_block(block, 1)?;
            blocks.push(block);
        }
        for (slot, level) in [(12, 1u8), (13, 2), (14, 3)] {
            if blocks.len() as u64 >= needed {
                break;
            }
            let block = le_u32(map, slot * 4)? as u64;
            if block == 0 {
                break;
            }
            self.walk_indirect(block, level, needed, &mut blocks)?;
        }
        Ok(blocks)
    }

    fn walk_indirect(
        &self,
        block: u64,
        level: u8,
        needed: u64,
        blocks: &mut Vec<u64>,
    ) -> Result<(), FileSystemError> {
        let pointers = self.read_block(block)?;
        for index in 0..pointers.len() / 4 {
            if blocks.len() as u64 >= needed {
                break;
            }
            let target = le_u32(&pointers, index * 4)? as u64;
            if target == 0 {
                break;
            }
            if level == 1 {
                self.check_block(target, 1)?;
                blocks.push(target);
            } else {
                self.walk_indirect(target, level - 1, needed, blocks)?;
            }
        }
        Ok(())
    }

    fn read_extents(&self, extents: &[ByteRange]) -> Result<Vec<u8>, FileSystemError> {
        let base = self.volume.range().start();
        let mut data = Vec::new();
        for extent in extents {
            data.extend(self.volume.read(extent.start() - base, extent.len() as usize)?);
        }
        Ok(data)
    }

    /// Breadth-first walk from the root directory collecting entry names
    fn build_name_index(&self) -> (NameIndex, Vec<FileSystemError>) {
        let mut names = NameIndex::default();
        let mut warnings = Vec::new();
        let mut visited = HashSet::new();
        let mut queue = VecDeque::from([(ROOT_INODE, String::new())]);

        while let Some((directory, path)) = queue.pop_front() {
            if !visited.insert(directory) {
                continue;
            }
            let data = match self.directory_data(directory) {
                Ok(data) => data,
                Err(error) => {
                    warnings.push(error);
                    continue;
                }
            };
            for block in data.chunks(self.superblock.block_size as usize) {
                if let Err(error) =
                    self.parse_directory_block(directory, block, &path, &mut names, &mut queue)
                {
                    warnings.push(error);
                }
            }
        }

        debug!(
            live = names.live.len(),
            deleted = names.deleted.len(),
            "ext directory walk finished"
        );
        (names, warnings)
    }

    fn directory_data(&self, directory: u32) -> Result<Vec<u8>, FileSystemError> {
        let entry_error = |message: String| FileSystemError::CorruptedEntry {
            entry: directory as u64,
            message,
        };
        let offset = self
            .inode_offset(directory)
            .ok_or_else(|| entry_error("directory inode outside the inode tables".into()))?;
        let location = self
            .volume
            .extent(offset, self.superblock.inode_size as u64)
            .ok_or_else(|| entry_error("directory inode outside the volume".into()))?;
        let inode = self.read_inode(directory)?;
        if inode.size > MAX_DIRECTORY_BYTES {
            return Err(entry_error(format!("directory of {} bytes skipped", inode.size)));
        }
        let extents = self
            .data_extents(location, &inode)
            .map_err(|e| entry_error(e.to_string()))?;
        self.read_extents(&extents)
    }

    fn parse_directory_block(
        &self,
        directory: u32,
        block: &[u8],
        path: &str,
        names: &mut NameIndex,
        queue: &mut VecDeque<(u32, String)>,
    ) -> Result<(), FileSystemError> {
        let mut pos = 0usize;
        while pos + 8 <= block.len() {
            let inode = le_u32(block, pos)?;
            let rec_len = le_u16(block, pos + 4)? as usize;
            let name_len = le_u8(block, pos + 6)? as usize;
            let file_type = le_u8(block, pos + 7)?;

            if rec_len < 8 || rec_len % 4 != 0 || pos + rec_len > block.len() {
                return Err(FileSystemError::CorruptedEntry {
                    entry: directory as u64,
                    message: format!("malformed directory record at {pos}"),
                });
            }

            let used = dirent_size(name_len);
            if inode != 0 && used <= rec_len {
                let name = String::from_utf8_lossy(&block[pos + 8..pos + 8 + name_len]);
                if name != "." && name != ".." {
                    let child = format!("{path}/{name}");
                    if file_type == DIRENT_TYPE_DIRECTORY {
                        queue.push_back((inode, child.clone()));
                    }
                    names.live.entry(inode).or_insert(child);
                }
                if rec_len > used {
                    self.scan_slack(&block[pos + used..pos + rec_len], path, names);
                }
            }
            pos += rec_len;
        }
        Ok(())
    }

    /// Recovers entries a deletion folded into the previous record's length
    fn scan_slack(&self, slack: &[u8], path: &str, names: &mut NameIndex) {
        let mut pos = 0usize;
        while pos + 8 <= slack.len() {
            match self.plausible_entry(&slack[pos..]) {
                Some((inode, name)) => {
                    let used = dirent_size(name.len());
                    names
                        .deleted
                        .entry(inode)
                        .or_insert_with(|| format!("{path}/{name}"));
                    pos += used;
                }
                None => pos += 4,
            }
        }
    }

    fn plausible_entry(&self, data: &[u8]) -> Option<(u32, String)> {
        let inode = le_u32(data, 0).ok()?;
        let rec_len = le_u16(data, 4).ok()? as usize;
        let name_len = le_u8(data, 6).ok()? as usize;
        if inode == 0 || inode > self.superblock.inode_count || name_len == 0 {
            return None;
        }
        if rec_len < 8 || rec_len % 4 != 0 {
            return None;
        }
        let name = data.get(8..8 + name_len)?;
        if name.iter().any(|&b| b == 0 || b == b'/') {
            return None;
        }
        Some((inode, String::from_utf8_lossy(name).into_owned()))
    }

    /// Builds the record for one inode, or `None` for never-used slots
    fn inode_record(
        &self,
        inode: u32,
        table_block: &[u8],
        location: ByteRange,
        names: &NameIndex,
    ) -> Result<Option<MetadataRecord>, FileSystemError> {
        let entry_error = |e: FileSystemError| FileSystemError::CorruptedEntry {
            entry: inode as u64,
            message: e.to_string(),
        };

        let raw = RawInode::parse(table_block).map_err(entry_error)?;
        let reserved = inode < self.superblock.first_inode && inode != ROOT_INODE;
        if reserved || raw.never_used() {
            return Ok(None);
        }

        let data_extents = self.data_extents(location, &raw).map_err(entry_error)?;
        let path = if inode == ROOT_INODE {
            "/".to_string()
        } else {
            names.path_for(inode)
        };

        Ok(Some(MetadataRecord {
            path,
            identifier: inode as u64,
            filesystem: FilesystemKind::Ext,
            entry_kind: raw.entry_kind(),
            timestamps: raw.timestamps(),
            logical_size: raw.size,
            allocation: if raw.is_deleted() {
                AllocationStatus::Unallocated
            } else {
                AllocationStatus::Allocated
            },
            entry_location: location,
            data_extents,
        }))
    }
}

/// On-disk size of a directory record holding a name of `name_len` bytes
fn dirent_size(name_len: usize) -> usize {
    (8 + name_len).div_ceil(4) * 4
}

/// The most recently read inode-table block
#[derive(Default)]
struct BlockCache {
    block: Option<(u64, Vec<u8>)>,
}

impl BlockCache {
    fn get(
        &mut self,
        volume: &VolumeReader<'_>,
        offset: u64,
        size: usize,
    ) -> Result<&[u8], FileSystemError> {
        let stale = self
            .block
            .as_ref()
            .is_none_or(|(cached, _)| *cached != offset);
        if stale {
            self.block = Some((offset, volume.read(offset, size)?));
        }
        Ok(self
            .block
            .as_ref()
            .map(|(_, data)| data.as_slice())
            .unwrap_or_default())
    }
}

/// Lazy inode-table walk, one table block read at a time
struct InodeWalk<'a> {
    parser: ExtParser<'a>,
    names: NameIndex,
    warnings: vec::IntoIter<FileSystemError>,
    next_inode: u32,
    cache: BlockCache,
}

impl InodeWalk<'_> {
    fn step(&mut self, inode: u32) -> Result<Option<MetadataRecord>, FileSystemError> {
        let parser = &self.parser;
        let offset = parser
            .inode_offset(inode)
            .ok_or_else(|| FileSystemError::CorruptedEntry {
                entry: inode as u64,
                message: "inode outside the inode tables".into(),
            })?;
        let block_size = parser.block_size();
        let block_offset = offset - offset % block_size;
        let within = (offset - block_offset) as usize;
        let inode_size = parser.superblock.inode_size as usize;

        let location = parser
            .volume
            .extent(offset, inode_size as u64)
            .ok_or_else(|| FileSystemError::CorruptedEntry {
                entry: inode as u64,
                message: "inode outside the volume".into(),
            })?;
        let block = self
            .cache
            .get(&parser.volume, block_offset, block_size as usize)?;
        let slot = block
            .get(within..within + inode_size)
            .ok_or_else(|| FileSystemError::CorruptedEntry {
                entry: inode as u64,
                message: "inode crosses a block boundary".into(),
            })?;
        parser.inode_record(inode, slot, location, &self.names)
    }
}

impl Iterator for InodeWalk<'_> {
    type Item = Result<MetadataRecord, FileSystemError>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(warning) = self.warnings.next() {
            return Some(Err(warning));
        }
        while self.next_inode <= self.parser.superblock.inode_count {
            let inode = self.next_inode;
            self.next_inode += 1;
            match self.step(inode) {
                Ok(Some(record)) => return Some(Ok(record)),
                Ok(None) => continue,
                Err(error) => return Some(Err(error)),
            }
        }
        None
    }
}

impl FileSystemParser for ExtParser<'_> {
    fn kind(&self) -> FilesystemKind {
        FilesystemKind::Ext
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

    fn superblock_bytes(log_block_size: u32, inode_size: u16) -> Vec<u8> {
        let mut data = vec![0u8; SUPERBLOCK_SIZE];
        data[0..4].copy_from_slice(&64u32.to_le_bytes());
        data[4..8].copy_from_slice(&256u32.to_le_bytes());
        data[20..24].copy_from_slice(&1u32.to_le_bytes());
        data[24..28].copy_from_slice(&log_block_size.to_le_bytes());
        data[40..44].copy_from_slice(&64u32.to_le_bytes());
        data[56..58].copy_from_slice(&EXT_SUPER_MAGIC.to_le_bytes());
        data[76..80].copy_from_slice(&1u32.to_le_bytes());
        data[84..88].copy_from_slice(&11u32.to_le_bytes());
        data[88..90].copy_from_slice(&inode_size.to_le_bytes());
        data
    }

    #[test]
    fn test_superblock_parse() {
        let superblock = ExtSuperblock::parse(&superblock_bytes(0, 128)).unwrap();
        assert!(superblock.is_valid());
        assert_eq!(superblock.block_size, 1024);
        assert_eq!(superblock.group_count(), 1);
        assert_eq!(superblock.desc_size, 32);
    }

    #[test]
    fn test_superblock_rejects_bad_geometry() {
        let superblock = ExtSuperblock::parse(&superblock_bytes(0, 100)).unwrap();
        assert!(!superblock.is_valid());
        assert!(ExtSuperblock::parse(&superblock_bytes(9, 128)).is_err());
        assert!(ExtSuperblock::parse(&[0u8; 100]).is_err());
    }

    #[test]
    fn test_inode_deletion_markers() {
        let mut data = vec![0u8; 128];
        data[0..2].copy_from_slice(&0x81A4u16.to_le_bytes());
        data[4..8].copy_from_slice(&5000u32.to_le_bytes());
        data[20..24].copy_from_slice(&1_600_000_000u32.to_le_bytes());
        let inode = RawInode::parse(&data).unwrap();

        assert!(inode.is_deleted());
        assert_eq!(inode.entry_kind(), EntryKind::File);
        assert_eq!(inode.size, 5000);
        assert!(inode.timestamps().deleted.is_some());
        assert!(inode.timestamps().created.is_none());
    }

    #[test]
    fn test_dirent_size_rounds_to_four() {
        assert_eq!(dirent_size(1), 12);
        assert_eq!(dirent_size(4), 12);
        assert_eq!(dirent_size(5), 16);
    }
}
