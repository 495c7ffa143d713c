//! Review aggregation and statistics.
//!
//! This module folds per-review classifier judgments into the summary
//! statistics that make up a report.

pub mod aggregator;

pub use aggregator::{AggregateError, Aggregator};
