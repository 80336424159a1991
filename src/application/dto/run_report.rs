//! Run report DTO

use crate::domain::entities::{FileType, ImageInfo, RunState, WarningKind};
use crate::domain::repositories::CatalogStore;
use crate::domain::services::CatalogSnapshot;
use anyhow::{Context, Result};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

/// Outcome of one extraction run
#[derive(Debug, Clone)]
pub struct RunReport {
    /// Terminal state of the run
    pub state: RunState,
    /// Finalized catalog, including the run summary
    pub snapshot: CatalogSnapshot,
    /// The image the run read
    pub image: ImageInfo,
    /// Wall time from open to finalize
    pub duration: Duration,
}

impl RunReport {
    /// True when the run reached `Done`
    pub fn is_success(&self) -> bool {
        self.state == RunState::Done
    }

    /// Record counts per file type
    pub fn records_by_type(&self) -> HashMap<FileType, usize> {
        let mut counts = HashMap::new();
        for record in self.snapshot.iter() {
            *counts.entry(record.file_type()).or_insert(0) += 1;
        }
        counts
    }

    /// Writes the catalog through `store`, returning the bytes written
    pub fn save(&self, store: &dyn CatalogStore, path: &Path) -> Result<u64> {
        store
            .save(&self.snapshot, path)
            .with_context(|| format!("Failed to save catalog to {}", path.display()))
    }

    /// Returns a summary string
    pub fn summary(&self) -> String {
        let summary = self.snapshot.summary();
        let mut text = format!(
            "Run {} for {}: {} records from {} bytes in {:.2}s\n",
            self.state,
            self.image.identifier,
            self.snapshot.len(),
            summary.bytes_scanned,
            self.duration.as_secs_f64()
        );

        let mut by_type: Vec<_> = self.records_by_type().into_iter().collect();
        by_type.sort_by_key(|(file_type, _)| *file_type);
        for (file_type, count) in by_type {
            text.push_str(&format!("  {file_type}: {count}\n"));
        }

        if !summary.unscanned.is_empty() {
            text.push_str(&format!(
                "  unscanned: {} bytes in {} ranges\n",
                summary.unscanned_bytes(),
                summary.unscanned.len()
            ));
        }
        for kind in [
            WarningKind::Io,
            WarningKind::Parse,
            WarningKind::Integrity,
            WarningKind::Timeout,
            WarningKind::NoFilesystem,
        ] {
            let count = summary.warnings_of(kind).count();
            if count > 0 {
                text.push_str(&format!("  {kind:?} warnings: {count}\n"));
            }
        }
        text
    }
}
