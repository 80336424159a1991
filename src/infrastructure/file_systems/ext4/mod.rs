//! ext2/3/4 filesystem parser
//!
//! Reads inode tables directly, so released inodes keep their timestamps,
//! sizes and (when not wiped) block maps.

mod parser;

pub use parser::ExtParser;
