//! Application layer
//!
//! Use cases and application services that orchestrate domain logic.

pub mod dto;
mod extract_image;

pub use extract_image::ExtractionPipeline;
