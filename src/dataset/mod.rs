//! Dataset Access
//!
//! The coordinator only needs two things from the dataset: how many rows it has
//! and the `(price, quantity)` pairs of a row range. `Dataset` captures exactly
//! that; `load_csv` builds the in-memory implementation from a CSV file.

pub mod loader;
pub mod types;

pub use loader::{InMemoryDataset, load_csv, load_csv_reader, resolve_columns};
pub use types::{ColumnAliases, SaleRecord};

use crate::planner::RowRange;

pub trait Dataset: Send + Sync {
    fn row_count(&self) -> u64;

    /// Rows `range.start..range.end`, clamped to the dataset.
    fn slice(&self, range: RowRange) -> Vec<SaleRecord>;
}

#[cfg(test)]
mod tests;
