//! Image source implementations
//!
//! Concrete container readers behind the `ImageSource` trait, plus format
//! auto-detection from leading bytes.

pub mod ewf;
mod raw;
pub mod segments;

pub use ewf::EwfImage;
pub use raw::RawImage;

use crate::domain::entities::ImageFormat;
use crate::domain::repositories::{ImageError, ImageSource};
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::info;

/// Bytes inspected for auto-detection (covers an ext superblock magic)
const SNIFF_SIZE: usize = 2048;

/// What the leading bytes of a file say about its container
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Sniffed {
    Ewf,
    Ewf2,
    /// Disk or volume structures visible at the start: a bare raw image
    RawStructures,
    Unknown,
}

fn sniff(path: &Path) -> Result<Sniffed, ImageError> {
    let mut file = File::open(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => ImageError::NotFound(path.display().to_string()),
        _ => ImageError::Io(e),
    })?;
    let mut head = Vec::with_capacity(SNIFF_SIZE);
    file.by_ref().take(SNIFF_SIZE as u64).read_to_end(&mut head)?;

    if head.starts_with(&ewf::EWF_SIGNATURE) {
        return Ok(Sniffed::Ewf);
    }
    if head.starts_with(&ewf::EWF2_SIGNATURE) {
        return Ok(Sniffed::Ewf2);
    }
    let boot_signature = head.get(510..512) == Some(&[0x55, 0xAA][..]);
    let ext_magic = head.get(1080..1082) == Some(&[0x53, 0xEF][..]);
    if boot_signature || ext_magic {
        return Ok(Sniffed::RawStructures);
    }
    Ok(Sniffed::Unknown)
}

/// Detects the container format of `path` from its leading bytes
///
/// Fails with [`ImageError::Ambiguous`] when nothing identifies the file;
/// callers must then pass a format explicitly.
pub fn detect_format(path: &Path) -> Result<ImageFormat, ImageError> {
    match sniff(path)? {
        Sniffed::Ewf => Ok(ImageFormat::Ewf),
        Sniffed::Ewf2 => Err(ImageError::Format(
            "EWF2 (Ex01) containers are not supported".into(),
        )),
        Sniffed::RawStructures => Ok(ImageFormat::Raw),
        Sniffed::Unknown if segments::is_split_raw(path) => Ok(ImageFormat::Raw),
        Sniffed::Unknown => Err(ImageError::Ambiguous(path.display().to_string())),
    }
}

/// Opens an image from one path (segments discovered) or an ordered list
///
/// With `format` set, the leading bytes must agree with it; a raw declaration
/// is accepted for any file that does not carry an EWF signature.
pub fn open_image(
    paths: &[PathBuf],
    format: Option<ImageFormat>,
) -> Result<Box<dyn ImageSource>, ImageError> {
    let first = paths
        .first()
        .ok_or_else(|| ImageError::NotFound("no image path given".into()))?;

    let resolved = match (format, sniff(first)?) {
        (_, Sniffed::Ewf2) => {
            return Err(ImageError::Format(
                "EWF2 (Ex01) containers are not supported".into(),
            ));
        }
        (Some(ImageFormat::Raw), Sniffed::Ewf) => {
            return Err(ImageError::Format(format!(
                "{} was declared raw but carries an EWF signature",
                first.display()
            )));
        }
        (Some(ImageFormat::Ewf), Sniffed::RawStructures | Sniffed::Unknown) => {
            return Err(ImageError::Format(format!(
                "{} has no EWF signature",
                first.display()
            )));
        }
        (Some(declared), _) => declared,
        (None, _) => detect_format(first)?,
    };

    info!(image = %first.display(), format = %resolved, "opening image");

    let source: Box<dyn ImageSource> = match (resolved, paths.len()) {
        (ImageFormat::Ewf, 1) => Box::new(EwfImage::open(first)?),
        (ImageFormat::Ewf, _) => Box::new(EwfImage::open_segments(paths)?),
        (ImageFormat::Raw, 1) => Box::new(RawImage::open(first)?),
        (ImageFormat::Raw, _) => Box::new(RawImage::open_segments(paths)?),
    };
    Ok(source)
}
