//! Global Aggregation
//!
//! Folds the stored per-chunk metrics into the dataset-wide statistic. The
//! average is rebuilt as the row-weighted mean of chunk means, which equals the
//! true mean whenever each chunk's `(avg_price, rows_processed)` pair is exact.

pub mod aggregator;

pub use aggregator::{Aggregator, GlobalAggregate, aggregate_store};

#[cfg(test)]
mod tests;
