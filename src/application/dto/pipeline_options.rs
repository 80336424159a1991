//! Pipeline options DTO

use crate::domain::entities::FileType;
use crate::domain::services::carver::DEFAULT_WINDOW_SIZE;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Errors raised while loading or validating options
#[derive(Error, Debug)]
pub enum OptionsError {
    #[error("Chunk size must be greater than zero")]
    ZeroChunkSize,

    #[error("Partition count must be greater than zero")]
    ZeroPartitions,

    #[error("Worker thread count must be greater than zero")]
    ZeroWorkers,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid options file: {0}")]
    Parse(String),
}

/// Options for one extraction run
///
/// Deserializes with `#[serde(default)]`, so an options file only needs the
/// fields it changes.
///
/// # Example
///
/// ```
/// use evidentia::application::dto::PipelineOptions;
/// use evidentia::domain::entities::FileType;
///
/// let options = PipelineOptions::default()
///     .with_types(vec![FileType::Jpeg])
///     .with_partitions(4)
///     .sequential();
/// assert!(options.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineOptions {
    /// File types to carve (empty = every registered type)
    pub file_types: Vec<FileType>,
    /// Bytes examined per carving read
    pub chunk_size: usize,
    /// Threads in the run's worker pool
    pub worker_threads: usize,
    /// Number of block-range partitions the image is split into
    pub partitions: usize,
    /// Per-read timeout in milliseconds after which a partition gives up
    pub read_timeout_ms: Option<u64>,
    /// Whether volumes are examined and their metadata extracted
    pub extract_metadata: bool,
    /// Whether stored acquisition hashes are recomputed
    pub verify_acquisition: bool,
    /// Cap on bytes read for one metadata record's content
    pub max_extract_bytes: u64,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        let workers = num_cpus::get().max(1);
        Self {
            file_types: Vec::new(),
            chunk_size: DEFAULT_WINDOW_SIZE,
            worker_threads: workers,
            partitions: workers,
            read_timeout_ms: None,
            extract_metadata: true,
            verify_acquisition: false,
            max_extract_bytes: 256 * 1024 * 1024,
        }
    }
}

impl PipelineOptions {
    /// Loads options from a JSON file and validates them
    pub fn from_json_file(path: &Path) -> Result<Self, OptionsError> {
        let raw = std::fs::read(path)?;
        let options: Self =
            serde_json::from_slice(&raw).map_err(|e| OptionsError::Parse(e.to_string()))?;
        options.validate()?;
        Ok(options)
    }

    /// Sets the file types to carve
    pub fn with_types(mut self, types: Vec<FileType>) -> Self {
        self.file_types = types;
        self
    }

    /// Sets the carving read size
    pub fn with_chunk_size(mut self, size: usize) -> Self {
        self.chunk_size = size;
        self
    }

    /// Sets the worker pool size
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.worker_threads = workers;
        self
    }

    /// Sets the number of carving partitions
    pub fn with_partitions(mut self, partitions: usize) -> Self {
        self.partitions = partitions;
        self
    }

    /// Sets the per-read timeout
    ///
    /// Measured after each carving read completes; a read that blocks
    /// forever still blocks its partition.
    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout_ms = Some(timeout.as_millis() as u64);
        self
    }

    /// Runs partitions one at a time, in address order
    pub fn sequential(mut self) -> Self {
        self.worker_threads = 1;
        self
    }

    /// Skips volume discovery and metadata extraction
    pub fn without_metadata(mut self) -> Self {
        self.extract_metadata = false;
        self
    }

    /// Recomputes stored acquisition hashes during the run
    pub fn verify_acquisition(mut self) -> Self {
        self.verify_acquisition = true;
        self
    }

    pub fn read_timeout(&self) -> Option<Duration> {
        self.read_timeout_ms.map(Duration::from_millis)
    }

    /// Rejects option values no run can use
    pub fn validate(&self) -> Result<(), OptionsError> {
        if self.chunk_size == 0 {
            return Err(OptionsError::ZeroChunkSize);
        }
        if self.partitions == 0 {
            return Err(OptionsError::ZeroPartitions);
        }
        if self.worker_threads == 0 {
            return Err(OptionsError::ZeroWorkers);
        }
        Ok(())
    }
}
