//! Repository traits (interfaces)
//!
//! These traits define the contracts for external dependencies.
//! They follow the Dependency Inversion Principle (DIP) from SOLID.

mod catalog_store;
mod file_system;
mod image_source;

pub use catalog_store::{CatalogStore, CatalogStoreError};
pub use file_system::{FileSystemError, FileSystemParser, MetadataStream};
pub use image_source::{ImageError, ImageSource, clamp_read};
