//! Aggregator Tests
//!
//! ## Test Scopes
//! - **Scenario**: the two-chunk, prices 1..10 run.
//! - **Exactness**: weighted mean of chunk means equals the true mean.
//! - **Deduplication**: duplicate and superseded rows count once.

#[cfg(test)]
mod tests {
    use crate::aggregate::{Aggregator, aggregate_store};
    use crate::dataset::SaleRecord;
    use crate::planner::ChunkId;
    use crate::scheduler::LeaseEpoch;
    use crate::store::{
        ChunkMetrics, MemoryResultStore, ResultRow, ResultStore, WorkerId, WorkerResult,
    };
    use crate::worker::compute_metrics;
    use proptest::prelude::*;
    use std::sync::Arc;

    fn row_for(worker: &str, chunk: u32, epoch: u64, prices: &[f64]) -> ResultRow {
        let records: Vec<SaleRecord> = prices.iter().map(|p| SaleRecord::new(*p, 1.0)).collect();
        ResultRow::new(
            WorkerResult {
                worker_id: WorkerId(worker.to_string()),
                chunk_id: ChunkId(chunk),
                metrics: compute_metrics(&records),
            },
            LeaseEpoch(epoch),
        )
    }

    // ============================================================
    // SCENARIO
    // ============================================================

    #[test]
    fn test_two_chunk_scenario() {
        let rows = vec![
            row_for("A", 0, 1, &[1.0, 2.0, 3.0, 4.0, 5.0]),
            row_for("B", 1, 2, &[6.0, 7.0, 8.0, 9.0, 10.0]),
        ];
        assert_eq!(rows[0].result.metrics.avg_price, 3.0);
        assert_eq!(rows[1].result.metrics.avg_price, 8.0);

        let agg = Aggregator::with_expected_chunks(2).aggregate(&rows);

        assert_eq!(agg.total_rows, 10);
        assert_eq!(agg.avg_price, Some(5.5));
        assert_eq!(agg.min_price, Some(1.0));
        assert_eq!(agg.max_price, Some(10.0));
        assert_eq!(agg.total_sales, 55.0);
        assert_eq!(agg.chunks_reported, 2);
        assert!(agg.missing_chunks.is_empty());
    }

    #[test]
    fn test_unequal_chunks_are_weighted() {
        // Means 1.0 (1 row) and 4.0 (3 rows): unweighted 2.5, true 3.25.
        let rows = vec![
            row_for("A", 0, 1, &[1.0]),
            row_for("B", 1, 2, &[3.0, 4.0, 5.0]),
        ];

        let agg = Aggregator::new().aggregate(&rows);

        assert_eq!(agg.avg_price, Some(3.25));
    }

    // ============================================================
    // DEDUPLICATION
    // ============================================================

    #[tokio::test]
    async fn test_duplicate_upserts_leave_aggregate_unchanged() {
        let store = Arc::new(MemoryResultStore::new());
        let a = row_for("A", 0, 1, &[1.0, 2.0, 3.0]);
        let b = row_for("B", 1, 2, &[4.0, 5.0]);

        store.upsert(&a).unwrap();
        store.upsert(&b).unwrap();
        let once = aggregate_store(store.clone(), &Aggregator::new()).await.unwrap();

        store.upsert(&a).unwrap();
        store.upsert(&b).unwrap();
        let twice = aggregate_store(store.clone(), &Aggregator::new()).await.unwrap();

        assert_eq!(once, twice);
        assert_eq!(twice.total_rows, 5);
    }

    #[test]
    fn test_reassigned_chunk_counted_once() {
        // Worker A's lease on chunk 0 expired; B re-leased it (epoch 3) and
        // A's late result (epoch 1) also made it into the store.
        let late = row_for("A", 0, 1, &[1.0, 2.0, 3.0, 4.0, 5.0]);
        let fresh = row_for("B", 0, 3, &[1.0, 2.0, 3.0, 4.0, 5.0]);
        let other = row_for("B", 1, 2, &[6.0, 7.0, 8.0, 9.0, 10.0]);

        let agg = Aggregator::with_expected_chunks(2).aggregate(&[late, fresh, other]);

        assert_eq!(agg.total_rows, 10);
        assert_eq!(agg.avg_price, Some(5.5));
        assert_eq!(agg.superseded_rows, 1);
    }

    #[test]
    fn test_canonical_row_prefers_highest_epoch() {
        let late = row_for("A", 0, 1, &[1.0]);
        let fresh = row_for("B", 0, 7, &[1.0]);
        let rows = vec![fresh.clone(), late];

        let canonical = Aggregator::canonical_rows(&rows);

        assert_eq!(canonical[&ChunkId(0)].result.worker_id, WorkerId("B".into()));
    }

    // ============================================================
    // EDGE CASES
    // ============================================================

    #[test]
    fn test_empty_chunk_does_not_pollute_min_max() {
        let empty = ResultRow::new(
            WorkerResult {
                worker_id: WorkerId("A".into()),
                chunk_id: ChunkId(0),
                metrics: ChunkMetrics {
                    rows_processed: 0,
                    total_sales: 0.0,
                    min_price: 0.0,
                    max_price: 0.0,
                    avg_price: 0.0,
                },
            },
            LeaseEpoch(1),
        );
        let rows = vec![empty, row_for("B", 1, 2, &[5.0, 7.0])];

        let agg = Aggregator::new().aggregate(&rows);

        assert_eq!(agg.min_price, Some(5.0));
        assert_eq!(agg.max_price, Some(7.0));
        assert_eq!(agg.avg_price, Some(6.0));
    }

    #[test]
    fn test_no_rows() {
        let agg = Aggregator::with_expected_chunks(3).aggregate(&[]);

        assert_eq!(agg.total_rows, 0);
        assert_eq!(agg.avg_price, None);
        assert_eq!(agg.min_price, None);
        assert_eq!(agg.missing_chunks, vec![ChunkId(0), ChunkId(1), ChunkId(2)]);
    }

    // ============================================================
    // EXACTNESS PROPERTY
    // ============================================================

    proptest! {
        #[test]
        fn weighted_mean_matches_true_mean(
            chunks in proptest::collection::vec(
                proptest::collection::vec(0.01f64..10_000.0, 1..40),
                1..20,
            )
        ) {
            let rows: Vec<ResultRow> = chunks
                .iter()
                .enumerate()
                .map(|(i, prices)| row_for("w", i as u32, i as u64 + 1, prices))
                .collect();

            let all: Vec<f64> = chunks.iter().flatten().copied().collect();
            let true_mean = all.iter().sum::<f64>() / all.len() as f64;
            let true_min = all.iter().copied().fold(f64::INFINITY, f64::min);
            let true_max = all.iter().copied().fold(f64::NEG_INFINITY, f64::max);

            let agg = Aggregator::new().aggregate(&rows);

            prop_assert_eq!(agg.total_rows, all.len() as u64);
            let avg = agg.avg_price.unwrap();
            prop_assert!((avg - true_mean).abs() <= 1e-9 * true_mean.abs().max(1.0));
            prop_assert_eq!(agg.min_price, Some(true_min));
            prop_assert_eq!(agg.max_price, Some(true_max));
        }
    }
}
