use super::ResultStore;
use super::types::{PlanFingerprint, ResultRow, WorkerId};
use crate::error::{ConfigError, Result, StoreError};
use crate::planner::ChunkId;

use dashmap::DashMap;
use parking_lot::Mutex;

/// Non-durable engine. Same upsert semantics as the SQLite engine; everything
/// is lost with the process.
#[derive(Default)]
pub struct MemoryResultStore {
    rows: DashMap<(WorkerId, ChunkId), ResultRow>,
    plan: Mutex<Option<PlanFingerprint>>,
}

impl MemoryResultStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

impl ResultStore for MemoryResultStore {
    fn upsert(&self, row: &ResultRow) -> Result<(), StoreError> {
        self.rows.insert(row.key(), row.clone());
        Ok(())
    }

    fn scan(&self) -> Result<Vec<ResultRow>, StoreError> {
        Ok(self.rows.iter().map(|entry| entry.value().clone()).collect())
    }

    fn bind_plan(&self, plan: PlanFingerprint) -> Result<()> {
        let mut bound = self.plan.lock();
        let current = *bound;
        match current {
            None => {
                *bound = Some(plan);
                Ok(())
            }
            Some(stored) if stored == plan => Ok(()),
            Some(stored) => Err(ConfigError::PlanMismatch {
                stored_rows: stored.total_rows,
                stored_chunks: stored.chunk_count,
                rows: plan.total_rows,
                chunks: plan.chunk_count,
            }
            .into()),
        }
    }
}
