//! Extract image use case
//!
//! Coordinates one extraction run: opens the image, fans carving out over
//! block-range partitions and metadata extraction out over volumes, then
//! finalizes the catalog.

use crate::application::dto::{PipelineOptions, RunReport};
use crate::domain::entities::{
    Artifact, ByteRange, Component, FailureReason, ImageFormat, MetadataRecord, RunState,
    RunWarning, UnscannedRange, UnscannedReason, WarningKind,
};
use crate::domain::repositories::{ImageError, ImageSource};
use crate::domain::services::{
    CancellationToken, CarvingEngine, PartitionScan, RunContext, ScanStop, SignatureRegistry,
    verify_acquisition,
};
use crate::infrastructure::file_systems::{MetadataExtractor, Volume};
use crate::infrastructure::image_sources::open_image;
use anyhow::{Context, Result};
use parking_lot::Mutex;
use rayon::prelude::*;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// How one carving partition ended, as far as the run state cares
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PartitionOutcome {
    Committed,
    /// Cancelled mid-scan; nothing from it was ingested
    Discarded,
    /// Not a single byte of the partition could be read
    Lost,
}

/// Extraction pipeline use case
///
/// One pipeline runs one image at a time; use separate pipelines for
/// concurrent runs. Each run starts a fresh lifecycle at `Idle`.
///
/// # Example
///
/// ```ignore
/// let pipeline = ExtractionPipeline::new(PipelineOptions::default());
/// let report = pipeline.run(&[PathBuf::from("disk.E01")], None)?;
/// report.save(&JsonCatalogStore::new(), Path::new("catalog.json"))?;
/// ```
pub struct ExtractionPipeline {
    options: PipelineOptions,
    registry: Arc<SignatureRegistry>,
    cancel: CancellationToken,
    state: Mutex<RunState>,
}

impl ExtractionPipeline {
    /// Creates a pipeline with the default signature table
    pub fn new(options: PipelineOptions) -> Self {
        let registry = SignatureRegistry::default_signatures().with_types(&options.file_types);
        Self {
            options,
            registry: Arc::new(registry),
            cancel: CancellationToken::new(),
            state: Mutex::new(RunState::Idle),
        }
    }

    /// Replaces the signature table
    ///
    /// The option's type filter is applied to `registry` as well.
    pub fn with_registry(mut self, registry: SignatureRegistry) -> Self {
        self.registry = Arc::new(registry.with_types(&self.options.file_types));
        self
    }

    /// Token that cancels the run from another thread
    ///
    /// A cancellation applies to the run in progress, or to the next run
    /// when none is. The token is rearmed when that run ends, so the
    /// pipeline can be reused afterwards.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn state(&self) -> RunState {
        self.state.lock().clone()
    }

    pub fn options(&self) -> &PipelineOptions {
        &self.options
    }

    /// Opens the image at `paths` and runs the extraction
    ///
    /// Fails only when the options are invalid or the image cannot be
    /// opened; the underlying [`ImageError`] can be recovered with
    /// `downcast_ref`. Everything after opening is reported in the
    /// returned [`RunReport`].
    pub fn run(&self, paths: &[PathBuf], format: Option<ImageFormat>) -> Result<RunReport> {
        self.options.validate().context("Invalid pipeline options")?;
        let started = Instant::now();
        self.begin();

        let opened = open_image(paths, format);
        let source: Arc<dyn ImageSource> = match opened {
            Ok(source) => Arc::from(source),
            Err(error) => return Err(self.open_failed(error, paths)),
        };
        Ok(self.execute(source, started))
    }

    /// Runs the extraction over an image that is already open
    pub fn run_source(&self, source: Arc<dyn ImageSource>) -> RunReport {
        let started = Instant::now();
        self.begin();
        self.execute(source, started)
    }

    fn begin(&self) {
        *self.state.lock() = RunState::Idle;
        self.transition(RunState::Opening);
    }

    fn open_failed(&self, error: ImageError, paths: &[PathBuf]) -> anyhow::Error {
        warn!(%error, "image could not be opened");
        self.cancel.reset();
        self.transition(RunState::Failed(FailureReason::Open(error.to_string())));
        let shown = paths
            .first()
            .map(|p| p.display().to_string())
            .unwrap_or_default();
        anyhow::Error::new(error).context(format!("Failed to open image {shown}"))
    }

    /// Moves the run to `next`, rejecting transitions the lifecycle forbids
    fn transition(&self, next: RunState) -> bool {
        let mut state = self.state.lock();
        let current: &RunState = &state;
        if !current.can_transition_to(&next) {
            warn!(from = %current, to = %next, "illegal run state transition rejected");
            return false;
        }
        info!(from = %current, to = %next, "run state changed");
        *state = next;
        true
    }

    fn execute(&self, source: Arc<dyn ImageSource>, started: Instant) -> RunReport {
        let image = source.info().clone();
        info!(
            image = %image.identifier,
            format = %image.format,
            size = image.total_size,
            "image opened"
        );
        self.transition(RunState::Scanning);

        let context = RunContext::with_registry(
            image.identifier.clone(),
            self.cancel.clone(),
            Arc::clone(&self.registry),
        );
        let source = source.as_ref();

        let outcomes = match rayon::ThreadPoolBuilder::new()
            .num_threads(self.options.worker_threads)
            .thread_name(|index| format!("evidentia-worker-{index}"))
            .build()
        {
            Ok(pool) => pool.install(|| self.scan(source, &context)),
            Err(error) => {
                warn!(%error, "worker pool unavailable, using the global pool");
                self.scan(source, &context)
            }
        };

        let storage_lost =
            !outcomes.is_empty() && outcomes.iter().all(|o| *o == PartitionOutcome::Lost);
        let state = if context.is_cancelled() {
            RunState::Failed(FailureReason::Cancelled)
        } else if storage_lost {
            RunState::Failed(FailureReason::StorageLost)
        } else {
            self.transition(RunState::Finalizing);
            RunState::Done
        };

        let snapshot = context.catalog().finalize();
        self.cancel.reset();
        self.transition(state.clone());

        let duration = started.elapsed();
        info!(
            image = %image.identifier,
            state = %state,
            records = snapshot.len(),
            elapsed_ms = duration.as_millis() as u64,
            "extraction finished"
        );

        RunReport {
            state,
            snapshot,
            image,
            duration,
        }
    }

    /// Carving and metadata extraction side by side in the current pool
    fn scan(&self, source: &dyn ImageSource, context: &RunContext) -> Vec<PartitionOutcome> {
        let (outcomes, ()) = rayon::join(
            || self.carve(source, context),
            || {
                self.extract_metadata(source, context);
                self.verify(source, context);
            },
        );
        outcomes
    }

    fn carve(&self, source: &dyn ImageSource, context: &RunContext) -> Vec<PartitionOutcome> {
        let Some(full) = source.info().full_range() else {
            return Vec::new();
        };
        let partitions = full.split(self.options.partitions, source.block_size() as u64);
        context.catalog().set_partitions(partitions.len());
        info!(partitions = partitions.len(), "carving started");

        let engine = CarvingEngine::new(Arc::clone(&self.registry))
            .with_window_size(self.options.chunk_size)
            .with_read_timeout(self.options.read_timeout());
        let carve_one = |(index, range): (usize, &ByteRange)| {
            let scan = engine.scan(source, *range, context.cancellation());
            commit_partition(source, context, index, scan)
        };

        if self.options.worker_threads > 1 {
            partitions.par_iter().enumerate().map(carve_one).collect()
        } else {
            partitions.iter().enumerate().map(carve_one).collect()
        }
    }

    fn extract_metadata(&self, source: &dyn ImageSource, context: &RunContext) {
        if !self.options.extract_metadata {
            return;
        }
        let catalog = context.catalog();
        let extractor = MetadataExtractor::new();
        let discovery = extractor.discover_volumes(source);

        for error in &discovery.warnings {
            catalog.record_warning(RunWarning::new(WarningKind::Parse, None, error.to_string()));
        }
        if discovery.parseable().next().is_none() {
            info!("no supported filesystem found");
            catalog.record_warning(RunWarning::new(
                WarningKind::NoFilesystem,
                None,
                "no filesystem metadata available",
            ));
        }

        let extract_one = |volume: &Volume| {
            let records = self.extract_volume(source, context, &extractor, volume);
            catalog.record_volume(volume.summary(records));
        };
        if self.options.worker_threads > 1 {
            discovery.volumes.par_iter().for_each(extract_one);
        } else {
            discovery.volumes.iter().for_each(extract_one);
        }
    }

    /// Streams one volume into the catalog, returning the records ingested
    fn extract_volume(
        &self,
        source: &dyn ImageSource,
        context: &RunContext,
        extractor: &MetadataExtractor,
        volume: &Volume,
    ) -> usize {
        let Some(filesystem) = volume.kind else {
            return 0;
        };
        let catalog = context.catalog();
        let component = Component::MetadataExtractor { filesystem };
        let mut ingested = 0;

        debug!(index = volume.index, %filesystem, range = %volume.range, "extracting volume");
        for entry in extractor.extract_volume(source, volume) {
            if context.is_cancelled() {
                debug!(index = volume.index, "metadata extraction cancelled");
                break;
            }
            let record = match entry {
                Ok(record) => record,
                Err(error) => {
                    catalog.record_warning(RunWarning::new(
                        WarningKind::Parse,
                        Some(volume.range),
                        error.to_string(),
                    ));
                    continue;
                }
            };
            let Some(content) = self.read_content(source, context, &record) else {
                debug!(index = volume.index, path = %record.path, "record dropped on cancellation");
                break;
            };
            match catalog.ingest(Artifact::Metadata(record), content, component) {
                Ok(_) => ingested += 1,
                Err(error) => warn!(%error, "metadata record not ingested"),
            }
        }

        info!(index = volume.index, %filesystem, records = ingested, "volume extracted");
        ingested
    }

    /// Reads a record's data extents, up to the extraction cap
    ///
    /// Read failures are recorded and leave the content short, which the
    /// catalog flags as incomplete. Returns `None` when the run is cancelled
    /// before the content is complete.
    fn read_content(
        &self,
        source: &dyn ImageSource,
        context: &RunContext,
        record: &MetadataRecord,
    ) -> Option<Vec<u8>> {
        let limit = record.logical_size.min(self.options.max_extract_bytes);
        let mut content = Vec::new();

        'extents: for extent in &record.data_extents {
            let mut offset = extent.start();
            while offset < extent.end() && (content.len() as u64) < limit {
                if context.is_cancelled() {
                    return None;
                }
                let wanted = (extent.end() - offset)
                    .min(limit - content.len() as u64)
                    .min(self.options.chunk_size as u64) as usize;
                match source.read_block(offset, wanted) {
                    Ok(data) if !data.is_empty() => {
                        offset += data.len() as u64;
                        content.extend_from_slice(&data);
                    }
                    Ok(_) => break 'extents,
                    Err(error) => {
                        context.catalog().record_warning(RunWarning::new(
                            WarningKind::Io,
                            ByteRange::new(offset, extent.end()),
                            format!("content of {} unreadable: {error}", record.path),
                        ));
                        break 'extents;
                    }
                }
            }
        }
        Some(content)
    }

    fn verify(&self, source: &dyn ImageSource, context: &RunContext) {
        if !self.options.verify_acquisition {
            return;
        }
        let catalog = context.catalog();
        match verify_acquisition(source, context.cancellation()) {
            Ok(Some(checks)) => {
                for check in checks {
                    if !check.matches() {
                        warn!(algorithm = ?check.algorithm, "acquisition hash mismatch");
                        catalog.record_warning(RunWarning::new(
                            WarningKind::Integrity,
                            None,
                            format!(
                                "stored {:?} acquisition hash {} does not match computed {}",
                                check.algorithm, check.expected, check.computed
                            ),
                        ));
                    }
                    catalog.record_acquisition_check(check);
                }
            }
            Ok(None) => debug!("acquisition verification cancelled"),
            Err(error) => catalog.record_warning(RunWarning::new(
                WarningKind::Io,
                None,
                format!("acquisition verification failed: {error}"),
            )),
        }
    }
}

/// Ingests what a finished partition scan staged
///
/// A cancelled partition ingests nothing and is reported unscanned as a
/// whole.
fn commit_partition(
    source: &dyn ImageSource,
    context: &RunContext,
    index: usize,
    scan: PartitionScan,
) -> PartitionOutcome {
    let catalog = context.catalog();

    if scan.stop == ScanStop::Cancelled {
        info!(
            partition = index,
            staged = scan.candidates.len(),
            "partition cancelled, staged candidates discarded"
        );
        catalog.record_unscanned(UnscannedRange {
            range: scan.partition,
            reason: UnscannedReason::Cancelled,
        });
        return PartitionOutcome::Discarded;
    }

    let lost = scan.lost_all_coverage();
    for warning in scan.warnings {
        catalog.record_warning(warning);
    }
    for unscanned in scan.unscanned {
        catalog.record_unscanned(unscanned);
    }
    catalog.add_bytes_scanned(scan.bytes_scanned);

    let component = Component::Carver { partition: index };
    let mut ingested = 0usize;
    for candidate in scan.candidates {
        let range = candidate.range();
        let content = match source.read_block(range.start(), range.len() as usize) {
            Ok(content) => content,
            Err(error) => {
                catalog.record_warning(RunWarning::new(
                    WarningKind::Io,
                    Some(range),
                    format!("carved {} unreadable: {error}", candidate.file_type()),
                ));
                continue;
            }
        };
        match catalog.ingest(Artifact::Carved(candidate), content, component) {
            Ok(_) => ingested += 1,
            Err(error) => warn!(%error, "carved candidate not ingested"),
        }
    }

    if lost {
        warn!(partition = index, range = %scan.partition, "partition lost to read errors");
        return PartitionOutcome::Lost;
    }
    info!(
        partition = index,
        range = %scan.partition,
        candidates = ingested,
        "partition committed"
    );
    PartitionOutcome::Committed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_pipeline_is_idle() {
        let pipeline = ExtractionPipeline::new(PipelineOptions::default());
        assert_eq!(pipeline.state(), RunState::Idle);
        assert!(!pipeline.cancellation_token().is_cancelled());
    }

    #[test]
    fn test_open_failure_is_reported() {
        let pipeline = ExtractionPipeline::new(PipelineOptions::default());
        let error = pipeline
            .run(&[PathBuf::from("/nonexistent/evidence.E01")], None)
            .unwrap_err();

        assert!(error.downcast_ref::<ImageError>().is_some());
        assert!(matches!(
            pipeline.state(),
            RunState::Failed(FailureReason::Open(_))
        ));
    }

    #[test]
    fn test_illegal_transition_rejected() {
        let pipeline = ExtractionPipeline::new(PipelineOptions::default());
        assert!(!pipeline.transition(RunState::Done));
        assert_eq!(pipeline.state(), RunState::Idle);
        assert!(pipeline.transition(RunState::Opening));
    }

    #[test]
    fn test_invalid_options_fail_before_opening() {
        let pipeline = ExtractionPipeline::new(PipelineOptions::default().with_partitions(0));
        assert!(pipeline.run(&[PathBuf::from("disk.img")], None).is_err());
        assert_eq!(pipeline.state(), RunState::Idle);
    }
}
