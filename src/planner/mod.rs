//! Chunk Planning
//!
//! Splits a dataset of `R` rows into `N` contiguous row ranges once, at startup.
//! Ranges differ in length by at most one row: the first `R mod N` chunks carry
//! the extra rows. The resulting chunk set never changes during a run.

pub mod types;

pub use types::{Chunk, ChunkId, RowRange};

use crate::error::ConfigError;

pub struct ChunkPlanner {
    total_rows: u64,
    chunk_count: u32,
}

impl ChunkPlanner {
    /// Fails when `chunk_count` is zero or larger than `total_rows`.
    pub fn new(total_rows: u64, chunk_count: u32) -> Result<Self, ConfigError> {
        if chunk_count == 0 {
            return Err(ConfigError::ZeroChunks);
        }
        if u64::from(chunk_count) > total_rows {
            return Err(ConfigError::ChunksExceedRows {
                chunks: u64::from(chunk_count),
                rows: total_rows,
            });
        }
        Ok(Self {
            total_rows,
            chunk_count,
        })
    }

    pub fn total_rows(&self) -> u64 {
        self.total_rows
    }

    pub fn chunk_count(&self) -> u32 {
        self.chunk_count
    }

    /// Builds the full chunk set, ids `0..N` in range order.
    pub fn plan(&self) -> Vec<Chunk> {
        let n = u64::from(self.chunk_count);
        let base = self.total_rows / n;
        let remainder = self.total_rows % n;

        let mut chunks = Vec::with_capacity(self.chunk_count as usize);
        let mut start = 0u64;
        for index in 0..self.chunk_count {
            let size = base + u64::from(u64::from(index) < remainder);
            let end = start + size;
            chunks.push(Chunk {
                id: ChunkId(index),
                range: RowRange { start, end },
            });
            start = end;
        }

        tracing::debug!(
            "Planned {} chunks over {} rows ({} base rows, {} chunks with one extra)",
            self.chunk_count,
            self.total_rows,
            base,
            remainder
        );

        chunks
    }
}

/// Shorthand for `ChunkPlanner::new(rows, chunks)?.plan()`.
pub fn plan_chunks(total_rows: u64, chunk_count: u32) -> Result<Vec<Chunk>, ConfigError> {
    Ok(ChunkPlanner::new(total_rows, chunk_count)?.plan())
}
