//! Forensic image ingestion, signature carving and filesystem metadata
//! extraction.
//!
//! An [`ExtractionPipeline`] opens a raw or EWF image, carves files by
//! signature across parallel block-range partitions, walks the NTFS, ext
//! and FAT volumes it finds (deleted entries included) and folds every
//! artifact into a deduplicating, hash-verified evidence catalog.
//!
//! ```ignore
//! use evidentia::{ExtractionPipeline, JsonCatalogStore, PipelineOptions};
//!
//! let pipeline = ExtractionPipeline::new(PipelineOptions::default());
//! let report = pipeline.run(&[PathBuf::from("disk.E01")], None)?;
//! println!("{}", report.summary());
//! report.save(&JsonCatalogStore::new(), Path::new("catalog.json"))?;
//! ```

pub mod application;
pub mod domain;
pub mod infrastructure;

pub use application::ExtractionPipeline;
pub use application::dto::{OptionsError, PipelineOptions, RunReport};
pub use domain::entities::{
    ByteRange, EvidenceRecord, FileType, ImageFormat, ImageInfo, MetadataRecord, RunState,
    RunSummary,
};
pub use domain::repositories::{CatalogStore, ImageError, ImageSource};
pub use domain::services::{CancellationToken, CatalogSnapshot, EvidenceCatalog};
pub use infrastructure::image_sources::open_image;
pub use infrastructure::persistence::JsonCatalogStore;
