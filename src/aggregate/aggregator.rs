use crate::error::StoreError;
use crate::planner::ChunkId;
use crate::store::{ResultRow, ResultStore, scan_blocking};

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Final answer of a run. Price statistics are `None` when no row had a price.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GlobalAggregate {
    pub total_rows: u64,
    pub total_sales: f64,
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
    pub avg_price: Option<f64>,
    /// Distinct chunks that contributed.
    pub chunks_reported: usize,
    /// Stored rows ignored because another row already represents their chunk.
    pub superseded_rows: usize,
    /// Expected chunks with no stored result (empty unless an expectation was set).
    pub missing_chunks: Vec<ChunkId>,
}

#[derive(Debug, Clone, Default)]
pub struct Aggregator {
    expected_chunks: Option<u32>,
}

impl Aggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reports chunks `0..count` absent from the input in `missing_chunks`.
    pub fn with_expected_chunks(count: u32) -> Self {
        Self {
            expected_chunks: Some(count),
        }
    }

    /// One row per chunk id.
    ///
    /// When a chunk was reported more than once (a reassigned lease whose first
    /// holder still delivered), the row with the highest lease epoch wins, then
    /// the latest insertion, then the smallest worker id.
    pub fn canonical_rows(rows: &[ResultRow]) -> BTreeMap<ChunkId, &ResultRow> {
        let mut canonical: BTreeMap<ChunkId, &ResultRow> = BTreeMap::new();
        for row in rows {
            canonical
                .entry(row.result.chunk_id)
                .and_modify(|current| {
                    if precedence(row, *current) == Ordering::Greater {
                        *current = row;
                    }
                })
                .or_insert(row);
        }
        canonical
    }

    pub fn aggregate(&self, rows: &[ResultRow]) -> GlobalAggregate {
        let canonical = Self::canonical_rows(rows);

        let mut total_rows = 0u64;
        let mut total_sales = 0.0f64;
        let mut weighted_sum = 0.0f64;
        let mut min_price: Option<f64> = None;
        let mut max_price: Option<f64> = None;

        for row in canonical.values() {
            let metrics = &row.result.metrics;
            total_rows += metrics.rows_processed;
            total_sales += metrics.total_sales;

            // Empty chunks report zeros, which are not prices.
            if metrics.rows_processed == 0 {
                continue;
            }
            weighted_sum += metrics.avg_price * metrics.rows_processed as f64;
            min_price = Some(min_price.map_or(metrics.min_price, |m| m.min(metrics.min_price)));
            max_price = Some(max_price.map_or(metrics.max_price, |m| m.max(metrics.max_price)));
        }

        let avg_price = (total_rows > 0).then(|| weighted_sum / total_rows as f64);

        let missing_chunks = match self.expected_chunks {
            Some(count) => (0..count)
                .map(ChunkId)
                .filter(|id| !canonical.contains_key(id))
                .collect(),
            None => Vec::new(),
        };

        GlobalAggregate {
            total_rows,
            total_sales,
            min_price,
            max_price,
            avg_price,
            chunks_reported: canonical.len(),
            superseded_rows: rows.len() - canonical.len(),
            missing_chunks,
        }
    }
}

/// Reads every row from `store` on the blocking pool and aggregates it.
pub async fn aggregate_store(
    store: Arc<dyn ResultStore>,
    aggregator: &Aggregator,
) -> Result<GlobalAggregate, StoreError> {
    let rows = scan_blocking(store).await?;
    Ok(aggregator.aggregate(&rows))
}

fn precedence(a: &ResultRow, b: &ResultRow) -> Ordering {
    a.lease_epoch
        .cmp(&b.lease_epoch)
        .then(a.inserted_at_ms.cmp(&b.inserted_at_ms))
        .then(b.result.worker_id.cmp(&a.result.worker_id))
}
