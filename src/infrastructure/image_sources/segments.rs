//! Segment file discovery
//!
//! Finds the remaining files of a multi-part image from its first segment:
//! numbered raw splits (`disk.001`, `disk.002`, ...) and expert-witness
//! segments (`disk.E01` ... `disk.E99`, `disk.EAA` ... `disk.ZZZ`).

use std::path::{Path, PathBuf};

/// Upper bound on segments searched for, far beyond any real acquisition
const MAX_SEGMENTS: usize = 14_971;

/// Returns the extension's numeric value if it is a zero-padded split number
fn split_number(path: &Path) -> Option<(u32, usize)> {
    let ext = path.extension()?.to_str()?;
    if ext.len() < 3 || !ext.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    Some((ext.parse().ok()?, ext.len()))
}

/// Whether the path looks like the first file of a numbered raw split
pub fn is_split_raw(path: &Path) -> bool {
    matches!(split_number(path), Some((1, _)))
}

/// Lists `path` and the numbered raw segments following it
pub fn discover_raw_segments(path: &Path) -> Vec<PathBuf> {
    let mut segments = vec![path.to_path_buf()];
    let Some((first, width)) = split_number(path) else {
        return segments;
    };

    for number in (first + 1)..(first + MAX_SEGMENTS as u32) {
        let next = path.with_extension(format!("{number:0width$}"));
        if !next.is_file() {
            break;
        }
        segments.push(next);
    }
    segments
}

/// Extension of the `index`th (1-based) expert-witness segment
///
/// `E01..E99` first, then `EAA..EZZ`, `FAA..FZZ` and so on up to `ZZZ`.
fn ewf_extension(index: usize, lowercase: bool) -> Option<String> {
    let ext = if index < 100 {
        format!("E{index:02}")
    } else {
        let k = index - 100;
        let first = b'E' as usize + k / (26 * 26);
        if first > b'Z' as usize {
            return None;
        }
        let second = b'A' as usize + (k / 26) % 26;
        let third = b'A' as usize + k % 26;
        [first as u8 as char, second as u8 as char, third as u8 as char]
            .iter()
            .collect()
    };
    Some(if lowercase { ext.to_ascii_lowercase() } else { ext })
}

/// Lists `path` and the expert-witness segments following it
pub fn discover_ewf_segments(path: &Path) -> Vec<PathBuf> {
    let mut segments = vec![path.to_path_buf()];
    let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
        return segments;
    };
    if !ext.eq_ignore_ascii_case("e01") {
        return segments;
    }
    let lowercase = ext.starts_with('e');

    for index in 2..MAX_SEGMENTS {
        let Some(next_ext) = ewf_extension(index, lowercase) else {
            break;
        };
        let next = path.with_extension(next_ext);
        if !next.is_file() {
            break;
        }
        segments.push(next);
    }
    segments
}

/// File name used as the image identifier in provenance
pub fn image_identifier(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_ewf_extension_sequence() {
        assert_eq!(ewf_extension(1, false).as_deref(), Some("E01"));
        assert_eq!(ewf_extension(99, false).as_deref(), Some("E99"));
        assert_eq!(ewf_extension(100, false).as_deref(), Some("EAA"));
        assert_eq!(ewf_extension(101, true).as_deref(), Some("eab"));
        assert_eq!(ewf_extension(100 + 26 * 26, false).as_deref(), Some("FAA"));
    }

    #[test]
    fn test_discover_raw_segments_stops_at_gap() {
        let dir = TempDir::new().unwrap();
        for ext in ["001", "002", "004"] {
            fs::write(dir.path().join(format!("disk.{ext}")), b"x").unwrap();
        }
        let found = discover_raw_segments(&dir.path().join("disk.001"));
        assert_eq!(found.len(), 2);
        assert!(found[1].ends_with("disk.002"));
    }

    #[test]
    fn test_discover_ewf_segments() {
        let dir = TempDir::new().unwrap();
        for ext in ["E01", "E02", "E03"] {
            fs::write(dir.path().join(format!("case.{ext}")), b"x").unwrap();
        }
        let found = discover_ewf_segments(&dir.path().join("case.E01"));
        assert_eq!(found.len(), 3);
        assert!(found[2].ends_with("case.E03"));
    }

    #[test]
    fn test_single_file_is_its_own_segment() {
        let path = Path::new("/evidence/disk.dd");
        assert_eq!(discover_raw_segments(path), vec![path.to_path_buf()]);
        assert!(!is_split_raw(path));
        assert!(is_split_raw(Path::new("/evidence/disk.001")));
    }
}
