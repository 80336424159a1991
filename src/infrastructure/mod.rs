//! Infrastructure layer
//!
//! Concrete implementations of the domain repositories: container readers,
//! filesystem parsers and catalog persistence.

pub mod file_systems;
pub mod image_sources;
pub mod persistence;
