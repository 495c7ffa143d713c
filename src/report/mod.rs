//! Report construction, persistence, and the analysis history list.

pub mod builder;
pub mod history;

pub use builder::{build_report, chart_path, persist, report_path};
