//! Synthetic evidence shared by the integration tests
//!
//! Builders for carvable files, raw and expert-witness containers, small
//! ext2, FAT12 and NTFS filesystems and MBR disks, plus image sources that
//! fail, stall or cancel on demand.

#![allow(dead_code)]

use evidentia::domain::entities::{AcquisitionMetadata, ByteRange, ImageFormat, ImageInfo};
use evidentia::domain::repositories::{ImageError, ImageSource, clamp_read};
use evidentia::domain::services::CancellationToken;
use evidentia::infrastructure::image_sources::ewf::adler32;
use flate2::Compression;
use flate2::write::ZlibEncoder;
use md5::Md5;
use sha1::{Digest, Sha1};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

pub const SECTOR: usize = 512;

/// Routes library logs to the test harness; safe to call from every test
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

// ============================================================================
// Carvable files
// ============================================================================

/// Lowercase letters only, so no signature pattern can occur inside
pub fn payload(len: usize, seed: u8) -> Vec<u8> {
    (0..len)
        .map(|i| b'a' + ((i * 7 + seed as usize * 13) % 26) as u8)
        .collect()
}

pub fn jpeg(body_len: usize, seed: u8) -> Vec<u8> {
    let mut file = vec![0xFF, 0xD8, 0xFF, 0xE0];
    file.extend(payload(body_len, seed));
    file.extend([0xFF, 0xD9]);
    file
}

/// A JPEG whose end-of-image marker is missing
pub fn jpeg_without_footer(body_len: usize, seed: u8) -> Vec<u8> {
    let mut file = vec![0xFF, 0xD8, 0xFF, 0xE0];
    file.extend(payload(body_len, seed));
    file
}

pub fn png(body_len: usize, seed: u8) -> Vec<u8> {
    let mut file = vec![0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];
    file.extend(payload(body_len, seed));
    file.extend([0x49, 0x45, 0x4E, 0x44, 0xAE, 0x42, 0x60, 0x82]);
    file
}

pub fn gif(body_len: usize, seed: u8) -> Vec<u8> {
    let mut file = b"GIF89a".to_vec();
    file.extend(payload(body_len, seed));
    file.extend([0x00, 0x3B]);
    file
}

pub fn pdf(body_len: usize, seed: u8) -> Vec<u8> {
    let mut file = b"%PDF-1.4\n".to_vec();
    file.extend(payload(body_len, seed));
    file.extend(b"%%EOF");
    file
}

/// Zero-filled image with files placed at chosen offsets
pub struct ImageBuilder {
    data: Vec<u8>,
    placed: Vec<ByteRange>,
}

impl ImageBuilder {
    /// `size` is rounded up to whole sectors
    pub fn new(size: usize) -> Self {
        Self {
            data: vec![0u8; size.div_ceil(SECTOR) * SECTOR],
            placed: Vec::new(),
        }
    }

    pub fn place(mut self, offset: usize, bytes: &[u8]) -> Self {
        self.data[offset..offset + bytes.len()].copy_from_slice(bytes);
        self.placed
            .push(ByteRange::with_len(offset as u64, bytes.len() as u64).unwrap());
        self
    }

    /// Ranges of every placed file, in placement order
    pub fn placed(&self) -> &[ByteRange] {
        &self.placed
    }

    pub fn build(self) -> Vec<u8> {
        self.data
    }
}

/// Four distinct files of four types in a 256 KiB image
pub fn mixed_image() -> (Vec<u8>, Vec<ByteRange>) {
    let builder = ImageBuilder::new(256 * 1024)
        .place(4096, &jpeg(3000, 1))
        .place(40_000, &png(5000, 2))
        .place(100_000, &gif(700, 3))
        .place(180_000, &pdf(9000, 4));
    let placed = builder.placed().to_vec();
    (builder.build(), placed)
}

// ============================================================================
// On-disk containers
// ============================================================================

pub fn write_raw(dir: &Path, name: &str, data: &[u8]) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, data).unwrap();
    path
}

/// Options for the expert-witness writer
#[derive(Debug, Clone)]
pub struct EwfLayout {
    pub sectors_per_chunk: u32,
    pub segments: usize,
    pub compressed: bool,
    pub store_hashes: bool,
    /// Stores digests that do not match the media
    pub wrong_hashes: bool,
    pub case_number: Option<String>,
}

impl Default for EwfLayout {
    fn default() -> Self {
        Self {
            sectors_per_chunk: 64,
            segments: 1,
            compressed: true,
            store_hashes: true,
            wrong_hashes: false,
            case_number: None,
        }
    }
}

fn section(kind: &str, offset: u64, payload: &[u8], last: bool) -> Vec<u8> {
    let size = 76 + payload.len() as u64;
    let next = if last { offset } else { offset + size };
    let mut descriptor = vec![0u8; 76];
    descriptor[..kind.len()].copy_from_slice(kind.as_bytes());
    descriptor[16..24].copy_from_slice(&next.to_le_bytes());
    descriptor[24..32].copy_from_slice(&size.to_le_bytes());
    let checksum = adler32(&descriptor[..72]);
    descriptor[72..76].copy_from_slice(&checksum.to_le_bytes());
    descriptor.extend_from_slice(payload);
    descriptor
}

fn zlib(data: &[u8]) -> Vec<u8> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

/// Writes `data` as an E01 set and returns the segment paths in order
///
/// `data` must be a whole number of sectors.
pub fn write_ewf(dir: &Path, stem: &str, data: &[u8], layout: &EwfLayout) -> Vec<PathBuf> {
    assert_eq!(data.len() % SECTOR, 0);
    let chunk_size = layout.sectors_per_chunk as usize * SECTOR;
    let chunks: Vec<Vec<u8>> = data
        .chunks(chunk_size)
        .map(|chunk| {
            let mut padded = chunk.to_vec();
            padded.resize(chunk_size, 0);
            padded
        })
        .collect();
    let per_segment = chunks.len().div_ceil(layout.segments.max(1)).max(1);
    let groups: Vec<&[Vec<u8>]> = chunks.chunks(per_segment).collect();

    let mut paths = Vec::new();
    for (index, group) in groups.iter().enumerate() {
        let number = index + 1;
        let first = index == 0;
        let last = number == groups.len();

        let mut file = b"EVF\x09\x0d\x0a\xff\x00".to_vec();
        file.push(0x01);
        file.extend((number as u16).to_le_bytes());
        file.extend([0u8; 2]);

        if first {
            let keys = "1\nmain\nc\tn\ta\te\tt\tm\tu\n";
            let case = layout.case_number.as_deref().unwrap_or("");
            let date = "2024 1 2 10 0 0";
            let text =
                format!("{keys}{case}\tEV-1\tsynthetic disk\tExaminer\t\t{date}\t{date}\n\n");
            let offset = file.len() as u64;
            file.extend(section("header", offset, &zlib(text.as_bytes()), false));

            let mut volume = vec![0u8; 1052];
            volume[0] = 0x01;
            volume[4..8].copy_from_slice(&(chunks.len() as u32).to_le_bytes());
            volume[8..12].copy_from_slice(&layout.sectors_per_chunk.to_le_bytes());
            volume[12..16].copy_from_slice(&(SECTOR as u32).to_le_bytes());
            volume[16..24].copy_from_slice(&((data.len() / SECTOR) as u64).to_le_bytes());
            let offset = file.len() as u64;
            file.extend(section("volume", offset, &volume, false));
        }

        let sectors_offset = file.len() as u64;
        let mut stored = Vec::new();
        let mut entries = Vec::new();
        for chunk in group.iter() {
            let chunk_offset = sectors_offset + 76 + stored.len() as u64;
            if layout.compressed {
                entries.push(chunk_offset as u32 | 0x8000_0000);
                stored.extend(zlib(chunk));
            } else {
                entries.push(chunk_offset as u32);
                stored.extend_from_slice(chunk);
                stored.extend(adler32(chunk).to_le_bytes());
            }
        }
        file.extend(section("sectors", sectors_offset, &stored, false));

        let mut table = vec![0u8; 24];
        table[..4].copy_from_slice(&(entries.len() as u32).to_le_bytes());
        for entry in &entries {
            table.extend(entry.to_le_bytes());
        }
        let offset = file.len() as u64;
        file.extend(section("table", offset, &table, false));
        let offset = file.len() as u64;
        file.extend(section("table2", offset, &table, false));

        if last && layout.store_hashes {
            let mut digest = vec![0u8; 80];
            digest[..16].copy_from_slice(&Md5::digest(data));
            digest[16..36].copy_from_slice(&Sha1::digest(data));
            if layout.wrong_hashes {
                digest[0] ^= 0xFF;
                digest[16] ^= 0xFF;
            }
            let offset = file.len() as u64;
            file.extend(section("digest", offset, &digest, false));
        }

        let offset = file.len() as u64;
        file.extend(section(if last { "done" } else { "next" }, offset, &[], true));

        let path = dir.join(format!("{stem}.E{number:02}"));
        std::fs::write(&path, file).unwrap();
        paths.push(path);
    }
    paths
}

// ============================================================================
// Filesystems
// ============================================================================

pub const EXT_DELETED_AT: u32 = 1_700_000_100;
pub const EXT_LIVE_CONTENT: &[u8] = b"minutes of the board meeting, kept\n";
pub const EXT_DELETED_CONTENT: &[u8] = b"draft resignation letter, deleted\n";
/// Byte offset of `/notes.txt` data inside [`ext2_image`]
pub const EXT_LIVE_DATA_OFFSET: u64 = 30 * 1024;

fn put_u16(data: &mut [u8], offset: usize, value: u16) {
    data[offset..offset + 2].copy_from_slice(&value.to_le_bytes());
}

fn put_u32(data: &mut [u8], offset: usize, value: u32) {
    data[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}

/// 64 KiB ext2 volume: `/notes.txt` live, `/draft.txt` deleted
///
/// The deleted entry survives in the slack of the live entry's record and
/// its inode keeps the block map with `i_dtime` set.
pub fn ext2_image() -> Vec<u8> {
    const BLOCK: usize = 1024;
    let mut image = vec![0u8; 64 * BLOCK];

    let sb = BLOCK;
    put_u32(&mut image, sb, 32);
    put_u32(&mut image, sb + 4, 64);
    put_u32(&mut image, sb + 20, 1);
    put_u32(&mut image, sb + 24, 0);
    put_u32(&mut image, sb + 32, 8192);
    put_u32(&mut image, sb + 40, 32);
    put_u16(&mut image, sb + 56, 0xEF53);
    put_u32(&mut image, sb + 76, 1);
    put_u32(&mut image, sb + 84, 11);
    put_u16(&mut image, sb + 88, 128);

    // Group descriptor: inode table at block 5
    put_u32(&mut image, 2 * BLOCK + 8, 5);

    let inode = |n: usize| 5 * BLOCK + (n - 1) * 128;
    let write_inode = |image: &mut [u8],
                       n: usize,
                       mode: u16,
                       size: u32,
                       links: u16,
                       dtime: u32,
                       block: u32| {
        let base = inode(n);
        put_u16(image, base, mode);
        put_u32(image, base + 4, size);
        put_u32(image, base + 8, 1_690_000_000);
        put_u32(image, base + 12, 1_690_000_000);
        put_u32(image, base + 16, 1_690_000_000);
        put_u32(image, base + 20, dtime);
        put_u16(image, base + 26, links);
        put_u32(image, base + 40, block);
    };
    write_inode(&mut image, 2, 0x41ED, BLOCK as u32, 3, 0, 20);
    write_inode(&mut image, 12, 0x81A4, EXT_LIVE_CONTENT.len() as u32, 1, 0, 30);
    write_inode(&mut image, 13, 0x81A4, EXT_DELETED_CONTENT.len() as u32, 0, EXT_DELETED_AT, 31);

    let dir = 20 * BLOCK;
    let mut entry = |pos: usize, inode: u32, rec_len: u16, name: &str, kind: u8| {
        put_u32(&mut image, dir + pos, inode);
        put_u16(&mut image, dir + pos + 4, rec_len);
        image[dir + pos + 6] = name.len() as u8;
        image[dir + pos + 7] = kind;
        image[dir + pos + 8..dir + pos + 8 + name.len()].copy_from_slice(name.as_bytes());
    };
    entry(0, 2, 12, ".", 2);
    entry(12, 2, 12, "..", 2);
    // The deletion folded draft.txt's record into this one
    entry(24, 12, (BLOCK - 24) as u16, "notes.txt", 1);
    entry(44, 13, 20, "draft.txt", 1);

    image[30 * BLOCK..30 * BLOCK + EXT_LIVE_CONTENT.len()].copy_from_slice(EXT_LIVE_CONTENT);
    image[31 * BLOCK..31 * BLOCK + EXT_DELETED_CONTENT.len()].copy_from_slice(EXT_DELETED_CONTENT);
    image
}

pub const FAT_LIVE_CONTENT: &[u8] = b"hello from a live FAT file\n";
pub const FAT_DELETED_CONTENT: &[u8] = b"notes somebody tried to erase\n";

/// 64 KiB FAT12 volume: `/HELLO.TXT` live, `/_OTES.TXT` deleted
pub fn fat12_image() -> Vec<u8> {
    let mut image = vec![0u8; 128 * SECTOR];

    image[..3].copy_from_slice(&[0xEB, 0x3C, 0x90]);
    image[3..11].copy_from_slice(b"MSWIN4.1");
    put_u16(&mut image, 11, SECTOR as u16);
    image[13] = 1;
    put_u16(&mut image, 14, 1);
    image[16] = 2;
    put_u16(&mut image, 17, 16);
    put_u16(&mut image, 19, 128);
    image[21] = 0xF8;
    put_u16(&mut image, 22, 1);
    image[510] = 0x55;
    image[511] = 0xAA;

    // Both FAT copies: media descriptor, then cluster 2 as a one-cluster chain
    for fat in [SECTOR, 2 * SECTOR] {
        image[fat..fat + 5].copy_from_slice(&[0xF8, 0xFF, 0xFF, 0xFF, 0x0F]);
    }

    let date = ((2024 - 1980) << 9) | (3 << 5) | 15;
    let time = (10 << 11) | (30 << 5);
    let root = 3 * SECTOR;
    let mut entry = |index: usize, name: &[u8; 11], attributes: u8, cluster: u16, size: u32| {
        let base = root + index * 32;
        image[base..base + 11].copy_from_slice(name);
        image[base + 11] = attributes;
        put_u16(&mut image, base + 14, time);
        put_u16(&mut image, base + 16, date);
        put_u16(&mut image, base + 22, time);
        put_u16(&mut image, base + 24, date);
        put_u16(&mut image, base + 26, cluster);
        put_u32(&mut image, base + 28, size);
    };
    entry(0, b"EVIDENCE   ", 0x08, 0, 0);
    entry(1, b"HELLO   TXT", 0x20, 2, FAT_LIVE_CONTENT.len() as u32);
    entry(2, b"\xE5OTES   TXT", 0x20, 3, FAT_DELETED_CONTENT.len() as u32);

    image[4 * SECTOR..4 * SECTOR + FAT_LIVE_CONTENT.len()].copy_from_slice(FAT_LIVE_CONTENT);
    image[5 * SECTOR..5 * SECTOR + FAT_DELETED_CONTENT.len()]
        .copy_from_slice(FAT_DELETED_CONTENT);
    image
}

pub const NTFS_LIVE_CONTENT: &[u8] = b"quarterly figures, resident in the MFT\n";
pub const NTFS_DELETED_CONTENT: &[u8] = b"wire transfer instructions, removed\n";
/// Unix time stamped into every `$STANDARD_INFORMATION` of [`ntfs_image`]
pub const NTFS_MODIFIED_AT: i64 = 1_700_000_000;
pub const NTFS_CLUSTER: usize = 1024;
pub const NTFS_RECORD: usize = 1024;
pub const NTFS_MFT_LCN: usize = 4;
/// Cluster holding the data of the deleted file
pub const NTFS_DELETED_LCN: usize = 20;

const NTFS_IN_USE: u16 = 0x0001;
const NTFS_DIRECTORY: u16 = 0x0002;

fn put_u64(data: &mut [u8], offset: usize, value: u64) {
    data[offset..offset + 8].copy_from_slice(&value.to_le_bytes());
}

fn ntfs_resident(kind: u32, content: &[u8]) -> Vec<u8> {
    let length = (24 + content.len()).div_ceil(8) * 8;
    let mut attribute = vec![0u8; length];
    put_u32(&mut attribute, 0, kind);
    put_u32(&mut attribute, 4, length as u32);
    put_u32(&mut attribute, 16, content.len() as u32);
    put_u16(&mut attribute, 20, 24);
    attribute[24..24 + content.len()].copy_from_slice(content);
    attribute
}

fn ntfs_non_resident(kind: u32, runlist: &[u8], size: u64) -> Vec<u8> {
    let length = (64 + runlist.len()).div_ceil(8) * 8;
    let mut attribute = vec![0u8; length];
    put_u32(&mut attribute, 0, kind);
    put_u32(&mut attribute, 4, length as u32);
    attribute[8] = 1;
    put_u16(&mut attribute, 32, 64);
    put_u64(&mut attribute, 40, size.next_multiple_of(NTFS_CLUSTER as u64));
    put_u64(&mut attribute, 48, size);
    put_u64(&mut attribute, 56, size);
    attribute[64..64 + runlist.len()].copy_from_slice(runlist);
    attribute
}

fn ntfs_standard_information() -> Vec<u8> {
    let ticks = (NTFS_MODIFIED_AT as u64 + 11_644_473_600) * 10_000_000;
    let mut content = vec![0u8; 48];
    for field in [0, 8, 16, 24] {
        put_u64(&mut content, field, ticks);
    }
    ntfs_resident(0x10, &content)
}

fn ntfs_file_name(parent: u64, name: &str) -> Vec<u8> {
    let units: Vec<u16> = name.encode_utf16().collect();
    let mut content = vec![0u8; 0x42 + units.len() * 2];
    // Sequence number in the top 16 bits of the reference
    put_u64(&mut content, 0, (1 << 48) | parent);
    content[0x40] = units.len() as u8;
    content[0x41] = 1; // Win32 namespace
    for (i, unit) in units.iter().enumerate() {
        put_u16(&mut content, 0x42 + i * 2, *unit);
    }
    ntfs_resident(0x30, &content)
}

/// One FILE record with its update sequence applied as on disk
fn ntfs_record(flags: u16, attributes: &[Vec<u8>]) -> Vec<u8> {
    const USA_OFFSET: usize = 48;
    const SEQUENCE: u16 = 0x0001;

    let mut record = vec![0u8; NTFS_RECORD];
    record[..4].copy_from_slice(b"FILE");
    put_u16(&mut record, 4, USA_OFFSET as u16);
    put_u16(&mut record, 6, 3);
    put_u16(&mut record, 20, 56);
    put_u16(&mut record, 22, flags);

    let mut pos = 56;
    for attribute in attributes {
        record[pos..pos + attribute.len()].copy_from_slice(attribute);
        pos += attribute.len();
    }
    put_u32(&mut record, pos, 0xFFFF_FFFF);

    put_u16(&mut record, USA_OFFSET, SEQUENCE);
    for sector in 1..=2 {
        let tail = sector * SECTOR - 2;
        let saved = [record[tail], record[tail + 1]];
        record[USA_OFFSET + sector * 2..USA_OFFSET + sector * 2 + 2].copy_from_slice(&saved);
        put_u16(&mut record, tail, SEQUENCE);
    }
    record
}

/// Image offset of MFT record `number` inside [`ntfs_image`]
pub fn ntfs_record_offset(number: usize) -> usize {
    NTFS_MFT_LCN * NTFS_CLUSTER + number * NTFS_RECORD
}

/// 64 KiB NTFS volume with an eight-record MFT
///
/// `/report.txt` (record 6) is in use with resident data; `/secret.bin`
/// (record 7) is no longer in use and keeps a one-cluster data run.
pub fn ntfs_image() -> Vec<u8> {
    let mut image = vec![0u8; 64 * 1024];
    image[3..11].copy_from_slice(b"NTFS    ");
    put_u16(&mut image, 11, SECTOR as u16);
    image[13] = (NTFS_CLUSTER / SECTOR) as u8;
    let total_sectors = (image.len() / SECTOR) as u64;
    put_u64(&mut image, 40, total_sectors);
    put_u64(&mut image, 48, NTFS_MFT_LCN as u64);
    image[64] = 0xF6; // 2^10-byte records
    image[510] = 0x55;
    image[511] = 0xAA;

    let mft_size = (8 * NTFS_RECORD) as u64;
    let records = [
        (
            0,
            ntfs_record(
                NTFS_IN_USE,
                &[
                    ntfs_standard_information(),
                    ntfs_file_name(5, "$MFT"),
                    ntfs_non_resident(0x80, &[0x11, 0x08, NTFS_MFT_LCN as u8, 0x00], mft_size),
                ],
            ),
        ),
        (
            5,
            ntfs_record(
                NTFS_IN_USE | NTFS_DIRECTORY,
                &[ntfs_standard_information(), ntfs_file_name(5, ".")],
            ),
        ),
        (
            6,
            ntfs_record(
                NTFS_IN_USE,
                &[
                    ntfs_standard_information(),
                    ntfs_file_name(5, "report.txt"),
                    ntfs_resident(0x80, NTFS_LIVE_CONTENT),
                ],
            ),
        ),
        (
            7,
            ntfs_record(
                0,
                &[
                    ntfs_standard_information(),
                    ntfs_file_name(5, "secret.bin"),
                    ntfs_non_resident(
                        0x80,
                        &[0x11, 0x01, NTFS_DELETED_LCN as u8, 0x00],
                        NTFS_DELETED_CONTENT.len() as u64,
                    ),
                ],
            ),
        ),
    ];
    for (number, record) in records {
        let at = ntfs_record_offset(number);
        image[at..at + NTFS_RECORD].copy_from_slice(&record);
    }

    let data = NTFS_DELETED_LCN * NTFS_CLUSTER;
    image[data..data + NTFS_DELETED_CONTENT.len()].copy_from_slice(NTFS_DELETED_CONTENT);
    image
}

/// Wraps a volume in a disk with a single-entry MBR
pub fn mbr_disk(volume: &[u8], partition_type: u8, start_lba: u32) -> Vec<u8> {
    let start = start_lba as usize * SECTOR;
    let sectors = volume.len().div_ceil(SECTOR);
    let mut disk = vec![0u8; start + sectors * SECTOR];
    disk[446 + 4] = partition_type;
    put_u32(&mut disk, 446 + 8, start_lba);
    put_u32(&mut disk, 446 + 12, sectors as u32);
    disk[510] = 0x55;
    disk[511] = 0xAA;
    disk[start..start + volume.len()].copy_from_slice(volume);
    disk
}

// ============================================================================
// Image sources
// ============================================================================

/// In-memory raw image
pub struct MemoryImage {
    info: ImageInfo,
    data: Vec<u8>,
}

impl MemoryImage {
    pub fn new(identifier: &str, data: Vec<u8>) -> Self {
        Self {
            info: ImageInfo {
                format: ImageFormat::Raw,
                identifier: identifier.to_string(),
                block_size: SECTOR as u32,
                total_size: data.len() as u64,
                acquisition: AcquisitionMetadata::default(),
                segments: Vec::new(),
            },
            data,
        }
    }
}

impl ImageSource for MemoryImage {
    fn info(&self) -> &ImageInfo {
        &self.info
    }

    fn read_block(&self, offset: u64, length: usize) -> Result<Vec<u8>, ImageError> {
        let length = clamp_read(offset, length, self.info.total_size)?;
        let start = offset as usize;
        Ok(self.data[start..start + length].to_vec())
    }
}

/// Fails every read that touches `bad`
pub struct FaultyImage<S> {
    pub inner: S,
    pub bad: ByteRange,
}

impl<S: ImageSource> ImageSource for FaultyImage<S> {
    fn info(&self) -> &ImageInfo {
        self.inner.info()
    }

    fn read_block(&self, offset: u64, length: usize) -> Result<Vec<u8>, ImageError> {
        let requested = ByteRange::with_len(offset, length as u64);
        if requested.is_some_and(|r| r.overlaps(&self.bad)) {
            return Err(ImageError::Read {
                offset,
                message: "simulated media error".into(),
            });
        }
        self.inner.read_block(offset, length)
    }
}

/// Stalls every read starting at or after `from`
pub struct SlowImage<S> {
    pub inner: S,
    pub from: u64,
    pub delay: Duration,
}

impl<S: ImageSource> ImageSource for SlowImage<S> {
    fn info(&self) -> &ImageInfo {
        self.inner.info()
    }

    fn read_block(&self, offset: u64, length: usize) -> Result<Vec<u8>, ImageError> {
        if offset >= self.from {
            std::thread::sleep(self.delay);
        }
        self.inner.read_block(offset, length)
    }
}

/// Cancels `token` once `reads_allowed` reads have been served
pub struct CancellingImage<S> {
    pub inner: S,
    pub token: CancellationToken,
    pub reads_allowed: usize,
    reads: AtomicUsize,
}

impl<S> CancellingImage<S> {
    pub fn new(inner: S, token: CancellationToken, reads_allowed: usize) -> Self {
        Self {
            inner,
            token,
            reads_allowed,
            reads: AtomicUsize::new(0),
        }
    }
}

impl<S: ImageSource> ImageSource for CancellingImage<S> {
    fn info(&self) -> &ImageInfo {
        self.inner.info()
    }

    fn read_block(&self, offset: u64, length: usize) -> Result<Vec<u8>, ImageError> {
        let served = self.reads.fetch_add(1, Ordering::SeqCst) + 1;
        if served >= self.reads_allowed {
            self.token.cancel();
        }
        self.inner.read_block(offset, length)
    }
}

/// Cancels `token` when a read of at most `max_len` bytes starts at `at`
///
/// Carving windows are longer than `max_len`, so only content reads of
/// small chunks trigger it.
pub struct CancelAtRead<S> {
    pub inner: S,
    pub token: CancellationToken,
    pub at: u64,
    pub max_len: usize,
}

impl<S: ImageSource> ImageSource for CancelAtRead<S> {
    fn info(&self) -> &ImageInfo {
        self.inner.info()
    }

    fn read_block(&self, offset: u64, length: usize) -> Result<Vec<u8>, ImageError> {
        if offset == self.at && length <= self.max_len {
            self.token.cancel();
        }
        self.inner.read_block(offset, length)
    }
}
