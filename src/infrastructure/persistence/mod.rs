//! Catalog persistence
//!
//! Stores finalized catalogs so reporting can happen in a separate process.

mod json_catalog_store;

pub use json_catalog_store::{CATALOG_FORMAT_VERSION, JsonCatalogStore};
