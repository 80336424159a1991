//! Run context
//!
//! The explicitly owned state of one analysis run. Every component call
//! receives it by reference; nothing lives in globals, so independent runs
//! can execute side by side.

use super::catalog::EvidenceCatalog;
use super::signature_registry::SignatureRegistry;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Cooperative cancellation flag shared between a caller and a run
///
/// Components check it between block reads.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation; idempotent
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Clears a previous cancellation so the token can serve another run
    pub fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// State owned by one extraction run
#[derive(Debug)]
pub struct RunContext {
    image_id: String,
    catalog: EvidenceCatalog,
    cancel: CancellationToken,
}

impl RunContext {
    pub fn new(image_id: impl Into<String>, cancel: CancellationToken) -> Self {
        let image_id = image_id.into();
        Self {
            catalog: EvidenceCatalog::new(image_id.clone()),
            image_id,
            cancel,
        }
    }

    /// Creates a context whose catalog types content with `registry`
    pub fn with_registry(
        image_id: impl Into<String>,
        cancel: CancellationToken,
        registry: Arc<SignatureRegistry>,
    ) -> Self {
        let image_id = image_id.into();
        Self {
            catalog: EvidenceCatalog::with_classifier(image_id.clone(), registry),
            image_id,
            cancel,
        }
    }

    pub fn image_id(&self) -> &str {
        &self.image_id
    }

    pub fn catalog(&self) -> &EvidenceCatalog {
        &self.catalog
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}
