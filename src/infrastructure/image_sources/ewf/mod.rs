//! Expert Witness Format (EWF v1, `.E01`) support

mod cache;
mod handle;
mod sections;

pub use handle::EwfImage;
pub use sections::{EWF_SIGNATURE, EWF2_SIGNATURE, adler32};
