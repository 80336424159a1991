//! NTFS filesystem parser
//!
//! NTFS keeps every file's metadata in the Master File Table (MFT); deleted
//! files keep their FILE record until it is reused.

mod parser;

pub use parser::NtfsParser;
