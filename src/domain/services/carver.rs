//! Carving engine service
//!
//! Streams one partition of an image through the signature registry and
//! reconstructs candidate file extents from header and footer matches.
//!
//! All decisions are made on absolute image offsets. A partition opens
//! candidates only for headers that start inside it, and keeps reading past
//! its end until those candidates close, so the candidates produced by any
//! partitioning of the image are the same as for one sequential scan.

use crate::domain::entities::{
    ByteRange, CarveCandidate, CloseReason, FileType, FooterPolicy, RunWarning, UnscannedRange,
    UnscannedReason, WarningKind,
};
use crate::domain::repositories::ImageSource;
use crate::domain::services::run_context::CancellationToken;
use crate::domain::services::signature_registry::{PatternHit, PatternRole, SignatureRegistry};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Default scan window (4 MiB)
pub const DEFAULT_WINDOW_SIZE: usize = 4 * 1024 * 1024;

/// How a partition scan ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanStop {
    /// The partition and every candidate it opened were fully processed
    Completed,
    /// The cancellation token fired before a read
    Cancelled,
    /// A read exceeded the partition timeout at this offset
    TimedOut { at: u64 },
}

/// Everything one partition scan produced
#[derive(Debug, Clone)]
pub struct PartitionScan {
    pub partition: ByteRange,
    /// Candidates in non-decreasing start order
    pub candidates: Vec<CarveCandidate>,
    pub unscanned: Vec<UnscannedRange>,
    pub warnings: Vec<RunWarning>,
    /// Bytes of the owned range examined
    pub bytes_scanned: u64,
    /// Window reads that failed
    pub failed_reads: usize,
    pub stop: ScanStop,
}

impl PartitionScan {
    fn new(partition: ByteRange) -> Self {
        Self {
            partition,
            candidates: Vec::new(),
            unscanned: Vec::new(),
            warnings: Vec::new(),
            bytes_scanned: 0,
            failed_reads: 0,
            stop: ScanStop::Completed,
        }
    }

    /// True when no byte of the owned range could be read
    pub fn lost_all_coverage(&self) -> bool {
        self.bytes_scanned == 0 && self.failed_reads > 0
    }
}

/// A candidate still seeking its footer
#[derive(Debug, Clone)]
struct OpenCandidate {
    signature: usize,
    file_type: FileType,
    start: u64,
    header_len: u64,
    footer_len: u64,
    /// `start + max_size`, the last offset the file may end at
    limit: u64,
    policy: FooterPolicy,
    last_footer_end: Option<u64>,
    ambiguous: bool,
}

impl OpenCandidate {
    /// Whether a footer starting at or after `offset` could still close it
    fn can_close_from(&self, offset: u64) -> bool {
        offset.saturating_add(self.footer_len) <= self.limit
    }
}

/// Per-partition carving state machine
struct CarveState<'a> {
    registry: &'a SignatureRegistry,
    owned: ByteRange,
    total: u64,
    open: Vec<OpenCandidate>,
    closed: Vec<CarveCandidate>,
}

impl<'a> CarveState<'a> {
    fn new(registry: &'a SignatureRegistry, owned: ByteRange, total: u64) -> Self {
        Self {
            registry,
            owned,
            total,
            open: Vec::new(),
            closed: Vec::new(),
        }
    }

    fn handle(&mut self, offset: u64, hit: PatternHit) {
        self.expire_before(offset);
        match hit.role {
            PatternRole::Footer => self.on_footer(offset, hit.signature),
            PatternRole::Header => self.on_header(offset, hit.signature),
        }
    }

    fn on_footer(&mut self, offset: u64, signature: usize) {
        let Some(sig) = self.registry.signature(signature) else {
            return;
        };
        let Some(position) = self.open.iter().position(|c| {
            c.file_type == sig.file_type()
                && self.registry.signature(c.signature).and_then(|s| s.footer()) == sig.footer()
        }) else {
            return;
        };

        let candidate = &mut self.open[position];
        if offset < candidate.start + candidate.header_len || !candidate.can_close_from(offset) {
            return;
        }
        let end = offset + candidate.footer_len;
        match candidate.policy {
            FooterPolicy::FirstFooter => {
                let candidate = self.open.remove(position);
                self.emit(candidate, end, CloseReason::Footer);
            }
            FooterPolicy::LastFooter => candidate.last_footer_end = Some(end),
        }
    }

    fn on_header(&mut self, offset: u64, signature: usize) {
        let Some(sig) = self.registry.signature(signature) else {
            return;
        };
        let file_type = sig.file_type();

        // Fragmentation heuristic: a second header of the same type before
        // any footer ends the earlier candidate just before it.
        if let Some(position) = self.open.iter().position(|c| c.file_type == file_type) {
            let previous = self.open.remove(position);
            self.emit(previous, offset, CloseReason::NextHeader);
        }

        if !self.owned.contains(offset) {
            return;
        }

        let mut ambiguous = false;
        for other in self.open.iter_mut().filter(|c| c.start == offset) {
            other.ambiguous = true;
            ambiguous = true;
        }

        self.open.push(OpenCandidate {
            signature,
            file_type,
            start: offset,
            header_len: sig.header().len() as u64,
            footer_len: sig.footer_len(),
            limit: offset.saturating_add(sig.max_size()),
            policy: sig.footer_policy(),
            last_footer_end: None,
            ambiguous,
        });
    }

    /// Closes candidates that no footer at or after `offset` could close
    fn expire_before(&mut self, offset: u64) {
        let mut index = 0;
        while index < self.open.len() {
            if self.open[index].can_close_from(offset) {
                index += 1;
            } else {
                let candidate = self.open.remove(index);
                let limit = candidate.limit;
                self.emit(candidate, limit, CloseReason::MaxSize);
            }
        }
    }

    fn close_all(&mut self, at: u64, reason: CloseReason) {
        for candidate in std::mem::take(&mut self.open) {
            self.emit(candidate, at, reason);
        }
    }

    fn emit(&mut self, candidate: OpenCandidate, end: u64, reason: CloseReason) {
        let (end, reason) = match candidate.last_footer_end {
            Some(footer_end) => (footer_end, CloseReason::Footer),
            None if end >= self.total => (self.total, reason_at_end(reason)),
            None => (end, reason),
        };
        if let Some(range) = ByteRange::new(candidate.start, end) {
            self.closed.push(
                CarveCandidate::new(candidate.file_type, range, reason)
                    .with_ambiguity(candidate.ambiguous),
            );
        }
    }

    fn is_idle(&self) -> bool {
        self.open.is_empty()
    }

    fn into_candidates(mut self) -> Vec<CarveCandidate> {
        self.closed
            .sort_by_key(|c| (c.range().start(), c.file_type(), c.range().end()));
        self.closed
    }
}

/// A bound cut short by the image end is reported as end of image
fn reason_at_end(reason: CloseReason) -> CloseReason {
    match reason {
        CloseReason::MaxSize => CloseReason::EndOfImage,
        other => other,
    }
}

/// Signature carving engine
///
/// Stateless between calls: every scan owns its own state machine, so one
/// engine can serve many worker threads at once.
#[derive(Debug, Clone)]
pub struct CarvingEngine {
    registry: Arc<SignatureRegistry>,
    window_size: usize,
    read_timeout: Option<Duration>,
}

impl CarvingEngine {
    /// Creates an engine over a signature registry
    pub fn new(registry: Arc<SignatureRegistry>) -> Self {
        Self {
            registry,
            window_size: DEFAULT_WINDOW_SIZE,
            read_timeout: None,
        }
    }

    /// Sets the number of new bytes examined per read
    pub fn with_window_size(mut self, window_size: usize) -> Self {
        self.window_size = window_size.max(1);
        self
    }

    /// Sets the per-read timeout after which the partition gives up
    ///
    /// The elapsed time is checked once `read_block` returns, so a read that
    /// never returns is never timed out. The bytes of the slow read are
    /// dropped and reported unscanned with the rest of the owned range.
    pub fn with_read_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.read_timeout = timeout;
        self
    }

    pub fn registry(&self) -> &SignatureRegistry {
        &self.registry
    }

    /// Bytes each window shares with the next one
    pub fn overlap(&self) -> usize {
        self.registry.longest_pattern().saturating_sub(1)
    }

    /// Scans the partition `owned` of `source`
    ///
    /// Never fails: unreadable windows become unscanned ranges and warnings,
    /// and every candidate opened is emitted, truncated if need be.
    pub fn scan(
        &self,
        source: &dyn ImageSource,
        owned: ByteRange,
        cancel: &CancellationToken,
    ) -> PartitionScan {
        let total = source.total_size();
        let overlap = self.overlap();
        let mut result = PartitionScan::new(owned);
        let mut state = CarveState::new(&self.registry, owned, total);
        let mut position = owned.start();

        debug!(partition = %owned, "carving partition");

        while position < total && (position < owned.end() || !state.is_idle()) {
            if cancel.is_cancelled() {
                result.stop = ScanStop::Cancelled;
                return result;
            }

            let started = Instant::now();
            let read = source.read_block(position, self.window_size + overlap);

            if let Some(limit) = self.read_timeout {
                if started.elapsed() > limit {
                    warn!(offset = position, ?limit, "partition read timed out");
                    state.close_all(position, CloseReason::ReadFailure);
                    if let Some(rest) = ByteRange::new(position, owned.end()) {
                        result.unscanned.push(UnscannedRange {
                            range: rest,
                            reason: UnscannedReason::Timeout,
                        });
                        result.warnings.push(RunWarning::new(
                            WarningKind::Timeout,
                            Some(rest),
                            format!("read at {position:#x} exceeded {limit:?}"),
                        ));
                    }
                    result.stop = ScanStop::TimedOut { at: position };
                    break;
                }
            }

            match read {
                Ok(data) if !data.is_empty() => {
                    let reaches_end = position + data.len() as u64 >= total;
                    let step = if reaches_end || data.len() <= overlap {
                        data.len()
                    } else {
                        data.len() - overlap
                    };

                    for hit in self.registry.find_all(&data) {
                        if hit.offset >= step {
                            break;
                        }
                        state.handle(position + hit.offset as u64, hit);
                    }

                    let next = position + step as u64;
                    if position < owned.end() {
                        result.bytes_scanned += next.min(owned.end()) - position;
                    }
                    position = next;
                    state.expire_before(position);
                }
                Ok(_) => break,
                Err(error) => {
                    let next = (position + self.window_size as u64).min(total);
                    warn!(offset = position, %error, "window read failed");
                    result.failed_reads += 1;
                    state.close_all(position, CloseReason::ReadFailure);
                    let failed = ByteRange::new(position, next).and_then(|r| r.intersect(&owned));
                    if let Some(failed) = failed {
                        result.unscanned.push(UnscannedRange {
                            range: failed,
                            reason: UnscannedReason::ReadError,
                        });
                        result.warnings.push(RunWarning::new(
                            WarningKind::Io,
                            Some(failed),
                            error.to_string(),
                        ));
                    }
                    position = next;
                }
            }
        }

        if result.stop == ScanStop::Completed {
            state.close_all(total, CloseReason::EndOfImage);
        }
        result.candidates = state.into_candidates();

        debug!(
            partition = %owned,
            candidates = result.candidates.len(),
            scanned = result.bytes_scanned,
            "partition carved"
        );
        result
    }
}
