//! Partition table discovery
//!
//! Full-disk images carry an MBR (with an optional chain of extended boot
//! records) or a GPT. Each entry becomes a candidate volume for the
//! filesystem checks.

use crate::domain::entities::ByteRange;
use crate::domain::repositories::{FileSystemError, ImageSource};
use crate::infrastructure::file_systems::volume::{le_u8, le_u32, le_u64};
use tracing::debug;

const SECTOR_SIZE: u64 = 512;
const MBR_TABLE_OFFSET: usize = 446;
const MBR_ENTRY_SIZE: usize = 16;

const TYPE_GPT_PROTECTIVE: u8 = 0xEE;
const EXTENDED_TYPES: [u8; 3] = [0x05, 0x0F, 0x85];

const GPT_SIGNATURE: &[u8; 8] = b"EFI PART";
const MAX_GPT_ENTRIES: u32 = 1024;

/// Extended partition chains longer than this are treated as looping
const MAX_LOGICAL_PARTITIONS: usize = 128;

/// One entry of a partition table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionEntry {
    pub range: ByteRange,
    pub description: String,
}

/// Reads the partition table of a full-disk image
///
/// Returns an empty list when sector 0 carries no recognizable table.
pub fn read_partition_table(
    source: &dyn ImageSource,
) -> Result<Vec<PartitionEntry>, FileSystemError> {
    if source.total_size() < SECTOR_SIZE {
        return Ok(Vec::new());
    }
    let sector = read_sector(source, 0)?;
    if sector[510..512] != [0x55, 0xAA] {
        return Ok(Vec::new());
    }

    let primaries = parse_mbr_entries(&sector)?;
    if primaries.is_empty() {
        return Ok(Vec::new());
    }
    if primaries
        .iter()
        .any(|entry| entry.kind == TYPE_GPT_PROTECTIVE)
    {
        return read_gpt(source);
    }

    let total = source.total_size();
    let mut partitions = Vec::new();
    for (slot, entry) in primaries.iter().enumerate() {
        if EXTENDED_TYPES.contains(&entry.kind) {
            partitions.extend(read_extended_chain(source, entry.start_lba)?);
            continue;
        }
        let description = format!("MBR partition {} (type {:#04x})", slot + 1, entry.kind);
        if let Some(range) = lba_range(entry.start_lba, entry.sector_count, total) {
            partitions.push(PartitionEntry { range, description });
        }
    }
    debug!(count = partitions.len(), "MBR partitions discovered");
    Ok(partitions)
}

#[derive(Debug, Clone, Copy)]
struct MbrEntry {
    kind: u8,
    start_lba: u64,
    sector_count: u64,
}

fn read_sector(source: &dyn ImageSource, lba: u64) -> Result<Vec<u8>, FileSystemError> {
    let offset = lba * SECTOR_SIZE;
    source
        .read_exact_at(offset, SECTOR_SIZE as usize)
        .map_err(|e| FileSystemError::ReadError {
            offset,
            message: e.to_string(),
        })
}

/// Non-empty entries of a 4-slot table; invalid boot flags reject the table
fn parse_mbr_entries(sector: &[u8]) -> Result<Vec<MbrEntry>, FileSystemError> {
    let mut entries = Vec::new();
    for slot in 0..4 {
        let base = MBR_TABLE_OFFSET + slot * MBR_ENTRY_SIZE;
        let boot_flag = le_u8(sector, base)?;
        if boot_flag != 0x00 && boot_flag != 0x80 {
            return Ok(Vec::new());
        }
        let kind = le_u8(sector, base + 4)?;
        let start_lba = le_u32(sector, base + 8)? as u64;
        let sector_count = le_u32(sector, base + 12)? as u64;
        if kind != 0 && sector_count != 0 {
            entries.push(MbrEntry {
                kind,
                start_lba,
                sector_count,
            });
        }
    }
    Ok(entries)
}

fn lba_range(start_lba: u64, sector_count: u64, total: u64) -> Option<ByteRange> {
    let start = start_lba.checked_mul(SECTOR_SIZE)?;
    let end = start
        .checked_add(sector_count.checked_mul(SECTOR_SIZE)?)?
        .min(total);
    ByteRange::new(start, end)
}

/// Follows the EBR chain of an extended partition
fn read_extended_chain(
    source: &dyn ImageSource,
    extended_lba: u64,
) -> Result<Vec<PartitionEntry>, FileSystemError> {
    let total = source.total_size();
    let mut partitions = Vec::new();
    let mut ebr_lba = extended_lba;

    while partitions.len() < MAX_LOGICAL_PARTITIONS {
        let sector = read_sector(source, ebr_lba)?;
        if sector[510..512] != [0x55, 0xAA] {
            break;
        }
        let entries = parse_mbr_entries(&sector)?;
        let mut next = None;
        for entry in entries {
            if EXTENDED_TYPES.contains(&entry.kind) {
                next = Some(extended_lba + entry.start_lba);
            } else if let Some(range) =
                lba_range(ebr_lba + entry.start_lba, entry.sector_count, total)
            {
                partitions.push(PartitionEntry {
                    range,
                    description: format!(
                        "logical partition {} (type {:#04x})",
                        partitions.len() + 5,
                        entry.kind
                    ),
                });
            }
        }
        match next {
            Some(lba) if lba > ebr_lba => ebr_lba = lba,
            _ => break,
        }
    }
    Ok(partitions)
}

fn read_gpt(source: &dyn ImageSource) -> Result<Vec<PartitionEntry>, FileSystemError> {
    let header = read_sector(source, 1)?;
    if &header[..8] != GPT_SIGNATURE {
        return Err(FileSystemError::CorruptedMetadata(
            "protective MBR without a GPT header".into(),
        ));
    }

    let header_size = le_u32(&header, 12)? as usize;
    if !(92..=SECTOR_SIZE as usize).contains(&header_size) {
        return Err(FileSystemError::CorruptedMetadata(format!(
            "GPT header size {header_size} out of range"
        )));
    }
    let stored_crc = le_u32(&header, 16)?;
    let mut zeroed = header[..header_size].to_vec();
    zeroed[16..20].fill(0);
    if crc32fast::hash(&zeroed) != stored_crc {
        return Err(FileSystemError::CorruptedMetadata(
            "GPT header CRC mismatch".into(),
        ));
    }

    let entries_lba = le_u64(&header, 72)?;
    let entry_count = le_u32(&header, 80)?;
    let entry_size = le_u32(&header, 84)? as usize;
    let entries_crc = le_u32(&header, 88)?;
    if entry_count > MAX_GPT_ENTRIES || !(128..=4096).contains(&entry_size) {
        return Err(FileSystemError::CorruptedMetadata(
            "GPT entry array geometry out of range".into(),
        ));
    }

    let array_offset = entries_lba * SECTOR_SIZE;
    let array = source
        .read_exact_at(array_offset, entry_count as usize * entry_size)
        .map_err(|e| FileSystemError::ReadError {
            offset: array_offset,
            message: e.to_string(),
        })?;
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(&array);
    if hasher.finalize() != entries_crc {
        return Err(FileSystemError::CorruptedMetadata(
            "GPT entry array CRC mismatch".into(),
        ));
    }

    let total = source.total_size();
    let mut partitions = Vec::new();
    for (index, entry) in array.chunks_exact(entry_size).enumerate() {
        if entry[..16].iter().all(|&b| b == 0) {
            continue;
        }
        let first_lba = le_u64(entry, 32)?;
        let last_lba = le_u64(entry, 40)?;
        if last_lba < first_lba {
            continue;
        }
        let units: Vec<u16> = entry[56..128]
            .chunks_exact(2)
            .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
            .take_while(|&unit| unit != 0)
            .collect();
        let name = String::from_utf16_lossy(&units);
        let description = if name.is_empty() {
            format!("GPT partition {}", index + 1)
        } else {
            format!("GPT partition {} \"{name}\"", index + 1)
        };
        if let Some(range) = lba_range(first_lba, last_lba - first_lba + 1, total) {
            partitions.push(PartitionEntry { range, description });
        }
    }
    debug!(count = partitions.len(), "GPT partitions discovered");
    Ok(partitions)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mbr_entries_skip_empty_slots() {
        let mut sector = vec![0u8; 512];
        sector[446 + 4] = 0x83;
        sector[446 + 8..446 + 12].copy_from_slice(&2048u32.to_le_bytes());
        sector[446 + 12..446 + 16].copy_from_slice(&4096u32.to_le_bytes());
        let entries = parse_mbr_entries(&sector).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].start_lba, 2048);
    }

    #[test]
    fn test_bad_boot_flag_rejects_table() {
        let mut sector = vec![0u8; 512];
        sector[446] = 0x12;
        sector[446 + 4] = 0x83;
        sector[446 + 12] = 1;
        assert!(parse_mbr_entries(&sector).unwrap().is_empty());
    }

    #[test]
    fn test_lba_range_clipped_to_image() {
        let range = lba_range(1, 100, 4096).unwrap();
        assert_eq!(range, ByteRange::new(512, 4096).unwrap());
        assert!(lba_range(100, 1, 4096).is_none());
    }
}
