//! Image source trait
//!
//! Defines the read-only, block-addressable view over a disk image.
//! Container formats (raw, expert witness) hide behind this interface so the
//! carver and the filesystem parsers never see segment boundaries or
//! compression.

use crate::domain::entities::{ImageFormat, ImageInfo, SegmentDescriptor};
use std::io;
use thiserror::Error;

/// Errors that can occur when opening or reading a disk image
#[derive(Error, Debug)]
pub enum ImageError {
    /// Container signature or header does not match the format
    #[error("Format error: {0}")]
    Format(String),

    /// Leading bytes match no known container and no format was given
    #[error("Ambiguous image format for {0}: pass an explicit format")]
    Ambiguous(String),

    #[error("Image not found: {0}")]
    NotFound(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Invalid offset: {offset} exceeds image size {image_size}")]
    InvalidOffset { offset: u64, image_size: u64 },

    #[error("Read error at offset {offset}: {message}")]
    Read { offset: u64, message: String },
}

impl ImageError {
    /// Whether the error condemns the whole image rather than one read
    pub fn is_format_error(&self) -> bool {
        matches!(self, ImageError::Format(_) | ImageError::Ambiguous(_) | ImageError::NotFound(_))
    }
}

/// Read-only, block-addressable view over a disk image
///
/// Implementations must be safe to share between worker threads: every
/// method takes `&self`, and reads never mutate the image.
///
/// # Example
///
/// ```ignore
/// let image = open_image(&[PathBuf::from("disk.E01")], None)?;
/// let boot = image.read_block(0, 512)?;
/// assert_eq!(image.total_size() % 512, 0);
/// ```
pub trait ImageSource: Send + Sync {
    /// Describes the opened image
    fn info(&self) -> &ImageInfo;

    /// Reads up to `length` bytes at a logical offset
    ///
    /// Reads extending past the end of the image are truncated. Fails with
    /// [`ImageError::InvalidOffset`] when `offset` is at or beyond the end.
    fn read_block(&self, offset: u64, length: usize) -> Result<Vec<u8>, ImageError>;

    /// Total addressable logical size in bytes
    fn total_size(&self) -> u64 {
        self.info().total_size
    }

    /// Sector size in bytes
    fn block_size(&self) -> u32 {
        self.info().block_size
    }

    fn format(&self) -> ImageFormat {
        self.info().format
    }

    /// Ordered physical segments backing the image
    fn segments(&self) -> &[SegmentDescriptor] {
        &self.info().segments
    }

    /// Reads exactly `length` bytes or fails
    fn read_exact_at(&self, offset: u64, length: usize) -> Result<Vec<u8>, ImageError> {
        let data = self.read_block(offset, length)?;
        if data.len() < length {
            return Err(ImageError::Read {
                offset,
                message: format!("short read: {} of {} bytes", data.len(), length),
            });
        }
        Ok(data)
    }
}

/// Validates a read request against the image size
///
/// Returns the number of bytes that can actually be read.
pub fn clamp_read(offset: u64, length: usize, image_size: u64) -> Result<usize, ImageError> {
    if offset >= image_size {
        return Err(ImageError::InvalidOffset { offset, image_size });
    }
    let available = image_size - offset;
    Ok((length as u64).min(available) as usize)
}
