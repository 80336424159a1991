//! Infrastructure layer tests
//!
//! Container readers against synthetic raw and E01 files, filesystem parsers
//! against hand-built ext2, FAT12 and NTFS volumes, and catalog persistence.

mod common;

use chrono::{DateTime, TimeZone, Utc};
use common::*;
use evidentia::domain::entities::{
    AllocationStatus, ByteRange, EntryKind, FilesystemKind, HashAlgorithm, ImageFormat,
    MetadataRecord,
};
use evidentia::domain::repositories::{
    CatalogStore, CatalogStoreError, FileSystemError, ImageError, ImageSource,
};
use evidentia::domain::services::{CancellationToken, EvidenceCatalog, verify_acquisition};
use evidentia::infrastructure::file_systems::MetadataExtractor;
use evidentia::infrastructure::image_sources::{EwfImage, detect_format, open_image};
use evidentia::infrastructure::persistence::JsonCatalogStore;
use rstest::*;
use std::path::PathBuf;
use tempfile::TempDir;

fn read_all(image: &dyn ImageSource) -> Vec<u8> {
    let mut data = Vec::new();
    while (data.len() as u64) < image.total_size() {
        let block = image.read_block(data.len() as u64, 50_000).unwrap();
        assert!(!block.is_empty());
        data.extend(block);
    }
    data
}

fn content_of(image: &dyn ImageSource, record: &MetadataRecord) -> Vec<u8> {
    let mut content = Vec::new();
    for extent in &record.data_extents {
        content.extend(image.read_block(extent.start(), extent.len() as usize).unwrap());
    }
    content.truncate(record.logical_size as usize);
    content
}

fn records_of(image: &dyn ImageSource, kind: FilesystemKind) -> Vec<MetadataRecord> {
    MetadataExtractor::new()
        .extract(image, kind)
        .filter_map(Result::ok)
        .collect()
}

fn find<'a>(records: &'a [MetadataRecord], path: &str) -> &'a MetadataRecord {
    records
        .iter()
        .find(|r| r.path == path)
        .unwrap_or_else(|| panic!("no record for {path}"))
}

// ============================================================================
// Raw Image Tests
// ============================================================================

#[test]
fn test_split_raw_reads_across_segment_boundary() {
    let dir = TempDir::new().unwrap();
    let (data, _) = mixed_image();
    let boundary = 100 * 1024;
    let first = write_raw(dir.path(), "disk.001", &data[..boundary]);
    write_raw(dir.path(), "disk.002", &data[boundary..]);

    let image = open_image(&[first], None).unwrap();

    assert_eq!(image.format(), ImageFormat::Raw);
    assert_eq!(image.total_size(), data.len() as u64);
    assert_eq!(image.segments().len(), 2);
    let across = image.read_block(boundary as u64 - 100, 200).unwrap();
    assert_eq!(across, &data[boundary - 100..boundary + 100]);
    assert_eq!(read_all(image.as_ref()), data);
}

#[test]
fn test_read_past_end_is_rejected() {
    let dir = TempDir::new().unwrap();
    let path = write_raw(dir.path(), "disk.001", &vec![0u8; 4096]);
    let image = open_image(&[path], None).unwrap();

    assert_eq!(image.read_block(4000, 500).unwrap().len(), 96);
    assert!(matches!(
        image.read_block(4096, 1),
        Err(ImageError::InvalidOffset { .. })
    ));
}

#[test]
fn test_missing_image_reported() {
    let result = open_image(&[PathBuf::from("/nonexistent/disk.E01")], None);
    assert!(matches!(result, Err(ImageError::NotFound(_))));
}

// ============================================================================
// Expert Witness Tests
// ============================================================================

#[rstest]
#[case::compressed(EwfLayout::default())]
#[case::uncompressed(EwfLayout { compressed: false, ..EwfLayout::default() })]
#[case::three_segments(EwfLayout { segments: 3, ..EwfLayout::default() })]
#[case::small_chunks(EwfLayout { sectors_per_chunk: 8, ..EwfLayout::default() })]
fn test_ewf_reads_match_raw(#[case] layout: EwfLayout) {
    let dir = TempDir::new().unwrap();
    let (data, _) = mixed_image();
    let paths = write_ewf(dir.path(), "disk", &data, &layout);
    assert_eq!(paths.len(), layout.segments);

    let image = open_image(&paths[..1], None).unwrap();

    assert_eq!(image.format(), ImageFormat::Ewf);
    assert_eq!(image.total_size(), data.len() as u64);
    assert_eq!(image.block_size(), SECTOR as u32);
    assert_eq!(image.segments().len(), layout.segments);
    assert_eq!(read_all(image.as_ref()), data);

    let chunk = layout.sectors_per_chunk as usize * SECTOR;
    let across = image.read_block(chunk as u64 - 10, 20).unwrap();
    assert_eq!(across, &data[chunk - 10..chunk + 10]);
}

#[test]
fn test_ewf_acquisition_metadata() {
    let dir = TempDir::new().unwrap();
    let (data, _) = mixed_image();
    let layout = EwfLayout {
        case_number: Some("CASE-2024-17".into()),
        ..EwfLayout::default()
    };
    let paths = write_ewf(dir.path(), "evidence", &data, &layout);

    let image = EwfImage::open(&paths[0]).unwrap();
    let acquisition = &image.info().acquisition;

    assert_eq!(acquisition.case_number.as_deref(), Some("CASE-2024-17"));
    assert_eq!(acquisition.examiner.as_deref(), Some("Examiner"));
    assert!(acquisition.hash(HashAlgorithm::Md5).is_some());
    assert!(acquisition.hash(HashAlgorithm::Sha1).is_some());
    assert_eq!(image.chunk_count(), data.len() / (64 * SECTOR));
}

#[test]
fn test_corrupted_section_descriptor_rejected() {
    let dir = TempDir::new().unwrap();
    let (data, _) = mixed_image();
    let paths = write_ewf(dir.path(), "disk", &data, &EwfLayout::default());

    let mut bytes = std::fs::read(&paths[0]).unwrap();
    // First descriptor starts after the 13-byte file header
    bytes[13 + 20] ^= 0x5A;
    std::fs::write(&paths[0], bytes).unwrap();

    let result = open_image(&paths, None);
    assert!(matches!(result, Err(ImageError::Format(_))));
}

#[test]
fn test_missing_segment_detected() {
    let dir = TempDir::new().unwrap();
    let (data, _) = mixed_image();
    let layout = EwfLayout {
        segments: 2,
        ..EwfLayout::default()
    };
    let paths = write_ewf(dir.path(), "disk", &data, &layout);
    std::fs::remove_file(&paths[1]).unwrap();

    assert!(matches!(
        open_image(&paths[..1], None),
        Err(ImageError::Format(_))
    ));
}

#[test]
fn test_ewf_detected_by_signature() {
    let dir = TempDir::new().unwrap();
    let (data, _) = mixed_image();
    let paths = write_ewf(dir.path(), "renamed", &data, &EwfLayout::default());
    let renamed = dir.path().join("renamed.bin");
    std::fs::rename(&paths[0], &renamed).unwrap();

    assert_eq!(detect_format(&renamed).unwrap(), ImageFormat::Ewf);
    assert!(matches!(
        open_image(&[renamed], Some(ImageFormat::Raw)),
        Err(ImageError::Format(_))
    ));
}

// ============================================================================
// Acquisition Verification Tests
// ============================================================================

#[rstest]
#[case(false, true)]
#[case(true, false)]
fn test_verify_acquisition(#[case] wrong_hashes: bool, #[case] expect_match: bool) {
    let dir = TempDir::new().unwrap();
    let (data, _) = mixed_image();
    let layout = EwfLayout {
        wrong_hashes,
        ..EwfLayout::default()
    };
    let paths = write_ewf(dir.path(), "disk", &data, &layout);
    let image = open_image(&paths, None).unwrap();

    let checks = verify_acquisition(image.as_ref(), &CancellationToken::new())
        .unwrap()
        .unwrap();

    assert_eq!(checks.len(), 2);
    assert!(checks.iter().all(|c| c.matches() == expect_match));
}

#[test]
fn test_verify_without_stored_hashes() {
    let image = MemoryImage::new("memory.img", vec![0u8; 4096]);
    let checks = verify_acquisition(&image, &CancellationToken::new()).unwrap();
    assert_eq!(checks, Some(Vec::new()));
}

#[test]
fn test_verify_cancelled() {
    let dir = TempDir::new().unwrap();
    let (data, _) = mixed_image();
    let paths = write_ewf(dir.path(), "disk", &data, &EwfLayout::default());
    let image = open_image(&paths, None).unwrap();
    let cancel = CancellationToken::new();
    cancel.cancel();

    assert_eq!(verify_acquisition(image.as_ref(), &cancel).unwrap(), None);
}

// ============================================================================
// Filesystem Tests
// ============================================================================

#[test]
fn test_ext_deleted_entry_recovered() {
    let image = MemoryImage::new("ext.img", ext2_image());
    let extractor = MetadataExtractor::new();
    assert_eq!(extractor.detect(&image), Some(FilesystemKind::Ext));

    let records = records_of(&image, FilesystemKind::Ext);

    let live = find(&records, "/notes.txt");
    assert_eq!(live.allocation, AllocationStatus::Allocated);
    assert_eq!(live.identifier, 12);
    assert!(live.timestamps.deleted.is_none());
    assert_eq!(content_of(&image, live), EXT_LIVE_CONTENT);

    let deleted = find(&records, "/draft.txt");
    assert!(deleted.is_deleted());
    assert_eq!(deleted.identifier, 13);
    assert_eq!(
        deleted.timestamps.deleted,
        DateTime::from_timestamp(EXT_DELETED_AT as i64, 0)
    );
    assert_eq!(content_of(&image, deleted), EXT_DELETED_CONTENT);
}

#[test]
fn test_ntfs_records_resolved_through_mft() {
    let image = MemoryImage::new("ntfs.img", ntfs_image());
    let extractor = MetadataExtractor::new();
    assert_eq!(extractor.detect(&image), Some(FilesystemKind::Ntfs));

    let records = records_of(&image, FilesystemKind::Ntfs);
    let modified = DateTime::from_timestamp(NTFS_MODIFIED_AT, 0);

    let live = find(&records, "/report.txt");
    assert_eq!(live.allocation, AllocationStatus::Allocated);
    assert_eq!(live.identifier, 6);
    assert_eq!(live.entry_kind, EntryKind::File);
    assert_eq!(live.timestamps.modified, modified);
    assert_eq!(
        Some(live.entry_location),
        ByteRange::with_len(ntfs_record_offset(6) as u64, NTFS_RECORD as u64)
    );
    assert_eq!(content_of(&image, live), NTFS_LIVE_CONTENT);

    let deleted = find(&records, "/secret.bin");
    assert!(deleted.is_deleted());
    assert_eq!(deleted.identifier, 7);
    assert!(deleted.timestamps.deleted.is_none());
    assert_eq!(deleted.timestamps.created, modified);
    assert_eq!(
        deleted.data_extents[0].start(),
        (NTFS_DELETED_LCN * NTFS_CLUSTER) as u64
    );
    assert_eq!(content_of(&image, deleted), NTFS_DELETED_CONTENT);

    assert_eq!(find(&records, "/").entry_kind, EntryKind::Directory);
    assert_eq!(find(&records, "/$MFT").identifier, 0);
}

#[test]
fn test_ntfs_corrupt_update_sequence_skips_one_record() {
    let mut data = ntfs_image();
    // Point record 6's update sequence array past the end of the record
    let usa_offset = ntfs_record_offset(6) + 4;
    data[usa_offset..usa_offset + 2].copy_from_slice(&1020u16.to_le_bytes());
    let image = MemoryImage::new("ntfs.img", data);

    let entries: Vec<_> = MetadataExtractor::new()
        .extract(&image, FilesystemKind::Ntfs)
        .collect();

    let errors: Vec<_> = entries.iter().filter_map(|e| e.as_ref().err()).collect();
    assert_eq!(errors.len(), 1);
    assert!(matches!(
        errors[0],
        FileSystemError::CorruptedEntry { entry: 6, .. }
    ));
    let paths: Vec<&str> = entries
        .iter()
        .filter_map(|e| e.as_ref().ok())
        .map(|r| r.path.as_str())
        .collect();
    assert!(paths.contains(&"/secret.bin"));
    assert!(!paths.contains(&"/report.txt"));
}

#[test]
fn test_ext_entry_locations_inside_inode_table() {
    let image = MemoryImage::new("ext.img", ext2_image());
    let records = records_of(&image, FilesystemKind::Ext);
    let table = ByteRange::with_len(5 * 1024, 32 * 128).unwrap();

    assert!(!records.is_empty());
    for record in &records {
        assert!(table.contains(record.entry_location.start()));
        assert_eq!(record.entry_location.len(), 128);
    }
}

#[test]
fn test_fat_deleted_entry_recovered() {
    let image = MemoryImage::new("fat.img", fat12_image());
    assert_eq!(MetadataExtractor::new().detect(&image), Some(FilesystemKind::Fat));

    let records = records_of(&image, FilesystemKind::Fat);

    let live = find(&records, "/HELLO.TXT");
    assert_eq!(live.allocation, AllocationStatus::Allocated);
    assert_eq!(
        live.timestamps.modified,
        Some(Utc.with_ymd_and_hms(2024, 3, 15, 10, 30, 0).unwrap())
    );
    assert_eq!(content_of(&image, live), FAT_LIVE_CONTENT);

    let deleted = find(&records, "/_OTES.TXT");
    assert_eq!(deleted.allocation, AllocationStatus::Unallocated);
    assert!(deleted.timestamps.deleted.is_none());
    assert_eq!(content_of(&image, deleted), FAT_DELETED_CONTENT);

    assert!(records.iter().all(|r| r.name() != "EVIDENCE"));
}

#[rstest]
#[case::fat(fat12_image(), 0x01, FilesystemKind::Fat)]
#[case::ext(ext2_image(), 0x83, FilesystemKind::Ext)]
fn test_partitioned_disk_volumes(
    #[case] volume: Vec<u8>,
    #[case] partition_type: u8,
    #[case] kind: FilesystemKind,
) {
    let image = MemoryImage::new("disk.img", mbr_disk(&volume, partition_type, 128));
    let extractor = MetadataExtractor::new();
    assert_eq!(extractor.detect(&image), None);

    let discovery = extractor.discover_volumes(&image);

    assert!(discovery.warnings.is_empty());
    assert_eq!(discovery.volumes.len(), 1);
    let found = &discovery.volumes[0];
    assert_eq!(found.kind, Some(kind));
    assert_eq!(found.range.start(), 128 * SECTOR as u64);

    let records: Vec<MetadataRecord> = extractor
        .extract_volume(&image, found)
        .filter_map(Result::ok)
        .collect();
    assert!(records.iter().any(|r| r.is_deleted()));
    for record in &records {
        assert!(found.range.contains(record.entry_location.start()));
        for extent in &record.data_extents {
            assert!(found.range.contains(extent.start()));
        }
    }
}

#[test]
fn test_unrecognized_volume_yields_nothing() {
    let image = MemoryImage::new("blank.img", vec![0u8; 64 * 1024]);
    let extractor = MetadataExtractor::new();

    assert_eq!(extractor.detect(&image), None);
    let discovery = extractor.discover_volumes(&image);
    assert_eq!(discovery.parseable().count(), 0);
}

// ============================================================================
// Catalog Store Tests
// ============================================================================

#[test]
fn test_catalog_with_metadata_round_trips() {
    let dir = TempDir::new().unwrap();
    let image = MemoryImage::new("ext.img", ext2_image());
    let catalog = EvidenceCatalog::new("ext.img");
    for record in records_of(&image, FilesystemKind::Ext) {
        let content = content_of(&image, &record);
        catalog
            .ingest(
                evidentia::domain::entities::Artifact::Metadata(record),
                content,
                evidentia::domain::entities::Component::MetadataExtractor {
                    filesystem: FilesystemKind::Ext,
                },
            )
            .unwrap();
    }
    let snapshot = catalog.finalize();
    let path = dir.path().join("catalog.json");
    let store = JsonCatalogStore::new();

    store.save(&snapshot, &path).unwrap();
    assert_eq!(store.load(&path).unwrap(), snapshot);
}

#[test]
fn test_tampered_catalog_rejected() {
    let dir = TempDir::new().unwrap();
    let image = MemoryImage::new("fat.img", fat12_image());
    let catalog = EvidenceCatalog::new("fat.img");
    let live = records_of(&image, FilesystemKind::Fat)
        .into_iter()
        .find(|r| r.path == "/HELLO.TXT")
        .unwrap();
    let content = content_of(&image, &live);
    catalog
        .ingest(
            evidentia::domain::entities::Artifact::Metadata(live),
            content,
            evidentia::domain::entities::Component::MetadataExtractor {
                filesystem: FilesystemKind::Fat,
            },
        )
        .unwrap();
    let path = dir.path().join("catalog.json");
    let store = JsonCatalogStore::new();
    store.save(&catalog.finalize(), &path).unwrap();

    // Content is stored hex encoded; "hello" starts with 0x68
    let text = std::fs::read_to_string(&path).unwrap();
    let tampered = text.replacen("68656c6c6f", "6a656c6c6f", 1);
    assert_ne!(text, tampered);
    std::fs::write(&path, tampered).unwrap();

    assert!(matches!(
        store.load(&path),
        Err(CatalogStoreError::Integrity { .. })
    ));
}
