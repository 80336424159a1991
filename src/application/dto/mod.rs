//! Data Transfer Objects

mod pipeline_options;
mod run_report;

pub use pipeline_options::{OptionsError, PipelineOptions};
pub use run_report::RunReport;
