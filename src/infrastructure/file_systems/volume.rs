//! Volume-relative reads shared by the filesystem parsers
//!
//! Parsers work in volume offsets; everything they report is translated back
//! to image offsets here.

use crate::domain::entities::ByteRange;
use crate::domain::repositories::{FileSystemError, ImageSource};
use byteorder::{LittleEndian, ReadBytesExt};
use chrono::{DateTime, NaiveDate, Utc};
use std::io::Cursor;

/// A window of an image holding one filesystem
#[derive(Clone, Copy)]
pub(crate) struct VolumeReader<'a> {
    source: &'a dyn ImageSource,
    range: ByteRange,
}

impl<'a> VolumeReader<'a> {
    pub fn new(source: &'a dyn ImageSource, range: ByteRange) -> Self {
        Self { source, range }
    }

    pub fn range(&self) -> ByteRange {
        self.range
    }

    pub fn len(&self) -> u64 {
        self.range.len()
    }

    /// Reads exactly `length` bytes at a volume offset
    pub fn read(&self, offset: u64, length: usize) -> Result<Vec<u8>, FileSystemError> {
        let fits = offset
            .checked_add(length as u64)
            .is_some_and(|end| end <= self.range.len());
        if !fits {
            return Err(FileSystemError::ReadError {
                offset: self.range.start().saturating_add(offset),
                message: format!("read of {length} bytes runs past the volume end"),
            });
        }
        let absolute = self.range.start() + offset;
        self.source
            .read_exact_at(absolute, length)
            .map_err(|e| FileSystemError::ReadError {
                offset: absolute,
                message: e.to_string(),
            })
    }

    /// Image range for a volume-relative extent, clipped to the volume
    pub fn extent(&self, offset: u64, length: u64) -> Option<ByteRange> {
        let start = self.range.start().checked_add(offset)?;
        let end = start.checked_add(length)?.min(self.range.end());
        ByteRange::new(start, end)
    }

    /// Image range of `count` units of `unit` bytes starting at unit `index`
    pub fn units(
        &self,
        index: u64,
        count: u64,
        unit: u64,
    ) -> Result<Option<ByteRange>, FileSystemError> {
        Ok(self.extent(scaled(index, unit)?, scaled(count, unit)?))
    }
}

/// `index * unit` for on-disk block and cluster numbers
pub(crate) fn scaled(index: u64, unit: u64) -> Result<u64, FileSystemError> {
    index.checked_mul(unit).ok_or_else(|| {
        FileSystemError::CorruptedMetadata(format!(
            "unit {index} of {unit} bytes lies beyond any addressable offset"
        ))
    })
}

fn field_error(what: &str, offset: usize, e: std::io::Error) -> FileSystemError {
    FileSystemError::CorruptedMetadata(format!("{what} at {offset:#x}: {e}"))
}

pub(crate) fn le_u8(data: &[u8], offset: usize) -> Result<u8, FileSystemError> {
    let mut cursor = Cursor::new(data);
    cursor.set_position(offset as u64);
    cursor.read_u8().map_err(|e| field_error("u8", offset, e))
}

pub(crate) fn le_u16(data: &[u8], offset: usize) -> Result<u16, FileSystemError> {
    let mut cursor = Cursor::new(data);
    cursor.set_position(offset as u64);
    cursor
        .read_u16::<LittleEndian>()
        .map_err(|e| field_error("u16", offset, e))
}

pub(crate) fn le_u32(data: &[u8], offset: usize) -> Result<u32, FileSystemError> {
    let mut cursor = Cursor::new(data);
    cursor.set_position(offset as u64);
    cursor
        .read_u32::<LittleEndian>()
        .map_err(|e| field_error("u32", offset, e))
}

pub(crate) fn le_u64(data: &[u8], offset: usize) -> Result<u64, FileSystemError> {
    let mut cursor = Cursor::new(data);
    cursor.set_position(offset as u64);
    cursor
        .read_u64::<LittleEndian>()
        .map_err(|e| field_error("u64", offset, e))
}

/// Seconds since the Unix epoch; zero means unset
pub(crate) fn unix_time(seconds: u32) -> Option<DateTime<Utc>> {
    if seconds == 0 {
        return None;
    }
    DateTime::from_timestamp(seconds as i64, 0)
}

/// Windows FILETIME (100 ns ticks since 1601-01-01); zero means unset
pub(crate) fn filetime(ticks: u64) -> Option<DateTime<Utc>> {
    const EPOCH_DIFFERENCE_SECS: i64 = 11_644_473_600;
    if ticks == 0 {
        return None;
    }
    let seconds = (ticks / 10_000_000) as i64 - EPOCH_DIFFERENCE_SECS;
    let nanos = ((ticks % 10_000_000) * 100) as u32;
    DateTime::from_timestamp(seconds, nanos)
}

/// FAT packed date and time, read as UTC; zero date means unset
pub(crate) fn fat_time(date: u16, time: u16) -> Option<DateTime<Utc>> {
    if date == 0 {
        return None;
    }
    let year = 1980 + (date >> 9) as i32;
    let month = ((date >> 5) & 0x0F) as u32;
    let day = (date & 0x1F) as u32;
    let hour = (time >> 11) as u32;
    let minute = ((time >> 5) & 0x3F) as u32;
    let second = ((time & 0x1F) * 2) as u32;
    NaiveDate::from_ymd_opt(year, month, day)?
        .and_hms_opt(hour, minute, second)
        .map(|naive| naive.and_utc())
}

/// Merges touching extents in order
pub(crate) fn coalesce(extents: Vec<ByteRange>) -> Vec<ByteRange> {
    let mut merged: Vec<ByteRange> = Vec::with_capacity(extents.len());
    for extent in extents {
        match merged.last_mut() {
            Some(last) if last.end() == extent.start() => *last = last.span(&extent),
            _ => merged.push(extent),
        }
    }
    merged
}

/// Trims extents so they cover at most `size` bytes
pub(crate) fn truncate_extents(extents: Vec<ByteRange>, size: u64) -> Vec<ByteRange> {
    let mut remaining = size;
    let mut out = Vec::with_capacity(extents.len());
    for extent in extents {
        if remaining == 0 {
            break;
        }
        let take = extent.len().min(remaining);
        if let Some(range) = ByteRange::with_len(extent.start(), take) {
            out.push(range);
        }
        remaining -= take;
    }
    out
}
