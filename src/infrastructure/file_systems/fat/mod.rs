//! FAT12/16/32 filesystem parser

mod parser;

pub use parser::FatParser;
