//! Acquisition hash verification
//!
//! Recomputes the media hashes an acquisition tool stored in the container
//! and compares them, so the examiner can show the image read is the image
//! that was acquired.

use super::run_context::CancellationToken;
use crate::domain::entities::{AcquisitionCheck, HashAlgorithm};
use crate::domain::repositories::{ImageError, ImageSource};
use md5::Md5;
use sha1::Sha1;
use sha2::Digest;
use tracing::info;

const VERIFY_BLOCK_SIZE: usize = 1024 * 1024;

/// Recomputes every stored acquisition hash over the logical media
///
/// Returns an empty list when the container stores no hashes, and `None`
/// when cancelled before the media was fully read.
pub fn verify_acquisition(
    source: &dyn ImageSource,
    cancel: &CancellationToken,
) -> Result<Option<Vec<AcquisitionCheck>>, ImageError> {
    let stored = &source.info().acquisition.acquisition_hashes;
    if stored.is_empty() {
        return Ok(Some(Vec::new()));
    }

    let wants = |algorithm| stored.iter().any(|h| h.algorithm == algorithm);
    let mut md5 = wants(HashAlgorithm::Md5).then(Md5::new);
    let mut sha1 = wants(HashAlgorithm::Sha1).then(Sha1::new);

    let total = source.total_size();
    let mut offset = 0u64;
    while offset < total {
        if cancel.is_cancelled() {
            return Ok(None);
        }
        let block = source.read_block(offset, VERIFY_BLOCK_SIZE)?;
        if let Some(hasher) = md5.as_mut() {
            hasher.update(&block);
        }
        if let Some(hasher) = sha1.as_mut() {
            hasher.update(&block);
        }
        offset += block.len() as u64;
    }

    let computed_md5 = md5.map(|h| hex::encode(h.finalize()));
    let computed_sha1 = sha1.map(|h| hex::encode(h.finalize()));

    let checks: Vec<AcquisitionCheck> = stored
        .iter()
        .filter_map(|hash| {
            let computed = match hash.algorithm {
                HashAlgorithm::Md5 => computed_md5.clone()?,
                HashAlgorithm::Sha1 => computed_sha1.clone()?,
            };
            Some(AcquisitionCheck {
                algorithm: hash.algorithm,
                expected: hash.digest.clone(),
                computed,
            })
        })
        .collect();

    for check in &checks {
        info!(
            algorithm = ?check.algorithm,
            matches = check.matches(),
            "acquisition hash verified"
        );
    }
    Ok(Some(checks))
}
