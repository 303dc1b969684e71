//! SQLite result engine.
//!
//! One connection guarded by a mutex; SQLite's own transactions give each
//! upsert atomicity and the WAL journal gives durability across restarts.

use super::ResultStore;
use super::types::{ChunkMetrics, PlanFingerprint, ResultRow, WorkerId, WorkerResult};
use crate::error::{ConfigError, Result, StoreError};
use crate::planner::ChunkId;
use crate::scheduler::LeaseEpoch;

use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension, params};
use std::path::Path;
use std::time::Duration;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const SCHEMA_SQL: &str = "
    CREATE TABLE IF NOT EXISTS worker_results (
        worker_id      TEXT    NOT NULL,
        chunk_id       INTEGER NOT NULL,
        rows_processed INTEGER NOT NULL,
        total_sales    REAL    NOT NULL,
        min_price      REAL    NOT NULL,
        max_price      REAL    NOT NULL,
        avg_price      REAL    NOT NULL,
        lease_epoch    INTEGER NOT NULL,
        inserted_at_ms INTEGER NOT NULL,
        PRIMARY KEY (worker_id, chunk_id)
    );

    CREATE TABLE IF NOT EXISTS run_plan (
        id          INTEGER PRIMARY KEY CHECK (id = 1),
        total_rows  INTEGER NOT NULL,
        chunk_count INTEGER NOT NULL
    );
";

const UPSERT_SQL: &str = "
    INSERT INTO worker_results (
        worker_id, chunk_id, rows_processed, total_sales,
        min_price, max_price, avg_price, lease_epoch, inserted_at_ms
    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
    ON CONFLICT(worker_id, chunk_id) DO UPDATE SET
        rows_processed = excluded.rows_processed,
        total_sales    = excluded.total_sales,
        min_price      = excluded.min_price,
        max_price      = excluded.max_price,
        avg_price      = excluded.avg_price,
        lease_epoch    = excluded.lease_epoch,
        inserted_at_ms = excluded.inserted_at_ms
";

const SCAN_SQL: &str = "
    SELECT worker_id, chunk_id, rows_processed, total_sales,
           min_price, max_price, avg_price, lease_epoch, inserted_at_ms
    FROM worker_results
";

pub struct SqliteResultStore {
    conn: Mutex<Connection>,
}

impl SqliteResultStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode = WAL;")?;
        Self::bootstrap(conn)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::bootstrap(Connection::open_in_memory()?)
    }

    fn bootstrap(conn: Connection) -> Result<Self, StoreError> {
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.execute_batch(SCHEMA_SQL)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn map_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ResultRow> {
        Ok(ResultRow {
            result: WorkerResult {
                worker_id: WorkerId(row.get(0)?),
                chunk_id: ChunkId(row.get(1)?),
                metrics: ChunkMetrics {
                    rows_processed: row.get::<_, i64>(2)? as u64,
                    total_sales: row.get(3)?,
                    min_price: row.get(4)?,
                    max_price: row.get(5)?,
                    avg_price: row.get(6)?,
                },
            },
            lease_epoch: LeaseEpoch(row.get::<_, i64>(7)? as u64),
            inserted_at_ms: row.get::<_, i64>(8)? as u64,
        })
    }
}

impl ResultStore for SqliteResultStore {
    fn upsert(&self, row: &ResultRow) -> Result<(), StoreError> {
        let result = &row.result;
        let metrics = &result.metrics;

        self.conn.lock().execute(
            UPSERT_SQL,
            params![
                result.worker_id.0,
                result.chunk_id.0,
                metrics.rows_processed as i64,
                metrics.total_sales,
                metrics.min_price,
                metrics.max_price,
                metrics.avg_price,
                row.lease_epoch.0 as i64,
                row.inserted_at_ms as i64,
            ],
        )?;

        tracing::debug!(
            "Upserted result for chunk {} from {}",
            result.chunk_id,
            result.worker_id
        );
        Ok(())
    }

    fn scan(&self) -> Result<Vec<ResultRow>, StoreError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(SCAN_SQL)?;
        let rows = stmt
            .query_map([], Self::map_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    fn bind_plan(&self, plan: PlanFingerprint) -> Result<()> {
        let conn = self.conn.lock();

        let stored: Option<(i64, i64)> = conn
            .query_row(
                "SELECT total_rows, chunk_count FROM run_plan WHERE id = 1",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()
            .map_err(StoreError::from)?;

        match stored {
            None => {
                conn.execute(
                    "INSERT INTO run_plan (id, total_rows, chunk_count) VALUES (1, ?1, ?2)",
                    params![plan.total_rows as i64, plan.chunk_count],
                )
                .map_err(StoreError::from)?;
                Ok(())
            }
            Some((rows, chunks))
                if rows as u64 == plan.total_rows && chunks == i64::from(plan.chunk_count) =>
            {
                Ok(())
            }
            Some((rows, chunks)) => Err(ConfigError::PlanMismatch {
                stored_rows: rows as u64,
                stored_chunks: chunks as u32,
                rows: plan.total_rows,
                chunks: plan.chunk_count,
            }
            .into()),
        }
    }
}
