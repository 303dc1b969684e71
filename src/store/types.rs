use crate::planner::ChunkId;
use crate::scheduler::LeaseEpoch;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Self-declared identity of a worker process, sent in HELLO.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WorkerId(pub String);

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Partial statistics over one chunk.
///
/// `avg_price` must be the exact mean of the chunk's valid prices and
/// `rows_processed` their exact count; the global mean is rebuilt from the pair.
/// A chunk without valid prices reports zeros everywhere.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct ChunkMetrics {
    pub rows_processed: u64,
    pub total_sales: f64,
    pub min_price: f64,
    pub max_price: f64,
    pub avg_price: f64,
}

impl ChunkMetrics {
    /// Internal consistency check applied to metrics received from the network.
    pub fn check(&self, max_rows: u64) -> Result<(), String> {
        let values = [self.total_sales, self.min_price, self.max_price, self.avg_price];
        if values.iter().any(|v| !v.is_finite()) {
            return Err("non-finite value".to_string());
        }
        if self.rows_processed > max_rows {
            return Err(format!(
                "{} rows processed but the chunk has {}",
                self.rows_processed, max_rows
            ));
        }
        if self.rows_processed > 0 && self.min_price > self.max_price {
            return Err(format!(
                "min {} above max {}",
                self.min_price, self.max_price
            ));
        }
        Ok(())
    }
}

/// A worker's report for one chunk, keyed by `(worker_id, chunk_id)`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkerResult {
    pub worker_id: WorkerId,
    pub chunk_id: ChunkId,
    pub metrics: ChunkMetrics,
}

/// A `WorkerResult` as persisted, with its audit columns.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResultRow {
    pub result: WorkerResult,
    /// Lease under which the result was accepted.
    pub lease_epoch: LeaseEpoch,
    pub inserted_at_ms: u64,
}

impl ResultRow {
    pub fn new(result: WorkerResult, lease_epoch: LeaseEpoch) -> Self {
        Self {
            result,
            lease_epoch,
            inserted_at_ms: now_ms(),
        }
    }

    pub fn key(&self) -> (WorkerId, ChunkId) {
        (self.result.worker_id.clone(), self.result.chunk_id)
    }
}

/// Identifies the chunk plan a results database was filled under.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlanFingerprint {
    pub total_rows: u64,
    pub chunk_count: u32,
}

/// Current system time in milliseconds.
pub fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or_default()
}
