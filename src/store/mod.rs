//! Result Storage Module
//!
//! The durable, idempotent sink for per-chunk partial metrics.
//!
//! ## Core Concepts
//! - **Upsert**: Rows are keyed by `(worker_id, chunk_id)`; a redelivered result
//!   overwrites its own row, so duplicates never change the aggregate.
//! - **Durability**: `SqliteResultStore` survives restarts so a run can resume
//!   from the chunks already completed.
//! - **Plan binding**: A database remembers the chunk plan it was filled under.
//! - **Retry**: Writes from connection handlers go through `upsert_with_retry`.
//!
//! Engines implement the synchronous `ResultStore` trait; async callers hop to
//! the blocking pool through the helpers in `retry`.

pub mod memory;
pub mod retry;
pub mod sqlite;
pub mod types;

pub use memory::MemoryResultStore;
pub use retry::{RetryPolicy, scan_blocking, upsert_with_retry};
pub use sqlite::SqliteResultStore;
pub use types::*;

use crate::error::{Result, StoreError};
use crate::planner::ChunkId;
use std::collections::BTreeSet;

pub trait ResultStore: Send + Sync {
    /// Insert-or-overwrite keyed by `(worker_id, chunk_id)`.
    fn upsert(&self, row: &ResultRow) -> Result<(), StoreError>;

    /// Every stored row, in no particular order.
    fn scan(&self) -> Result<Vec<ResultRow>, StoreError>;

    /// Records `plan` on first use; afterwards fails with a configuration
    /// error if the stored plan differs.
    fn bind_plan(&self, plan: PlanFingerprint) -> Result<()>;

    /// Distinct chunk ids that have at least one stored result.
    fn completed_chunks(&self) -> Result<BTreeSet<ChunkId>, StoreError> {
        Ok(self
            .scan()?
            .into_iter()
            .map(|row| row.result.chunk_id)
            .collect())
    }
}
