//! Coordinator Runtime
//!
//! Startup order matters: every check that can fail runs before the listener
//! is bound, so a misconfigured run never accepts a worker.
//!
//! 1. Validate the configuration and plan the chunks.
//! 2. Make sure the largest chunk fits in one frame.
//! 3. Open the result store and bind it to the plan.
//! 4. Mark chunks already stored as Done (resume after restart).
//!
//! `run_on` then serves until every chunk is Done (or the caller interrupts)
//! and folds the stored results into the global aggregate.

use super::ServerState;
use super::listener::{Shutdown, bind_listener, serve};
use super::status;
use crate::aggregate::{Aggregator, GlobalAggregate, aggregate_store};
use crate::config::ServerConfig;
use crate::dataset::Dataset;
use crate::error::{ConfigError, Result};
use crate::planner::ChunkPlanner;
use crate::protocol::ChunkPayload;
use crate::scheduler::{JobQueue, QueueProgress};
use crate::store::{MemoryResultStore, PlanFingerprint, ResultStore, SqliteResultStore};

use anyhow::Context;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    Completed(GlobalAggregate),
    /// Interrupted before every chunk was Done; nothing was aggregated.
    Interrupted(QueueProgress),
}

pub struct Coordinator {
    config: ServerConfig,
    shared: Arc<ServerState>,
}

impl Coordinator {
    /// Plans the run over `dataset` and opens the store named by `config.db_path`.
    pub fn prepare(config: ServerConfig, dataset: Arc<dyn Dataset>) -> Result<Self> {
        config.validate()?;

        let store: Arc<dyn ResultStore> = if config.uses_memory_store() {
            tracing::warn!("Using the in-memory result store; results will not survive a restart");
            Arc::new(MemoryResultStore::new())
        } else {
            Arc::new(SqliteResultStore::open(&config.db_path)?)
        };

        Self::with_store(config, dataset, store)
    }

    /// Same as `prepare` with a caller-provided store.
    pub fn with_store(
        config: ServerConfig,
        dataset: Arc<dyn Dataset>,
        store: Arc<dyn ResultStore>,
    ) -> Result<Self> {
        config.validate()?;

        let planner = ChunkPlanner::new(dataset.row_count(), config.chunk_count)?;
        let chunks = planner.plan();

        let largest = chunks
            .iter()
            .map(|chunk| chunk.range.len())
            .max()
            .unwrap_or_default();
        let needed = ChunkPayload::encoded_len_bound(largest);
        if needed > config.max_frame_bytes as u64 {
            return Err(ConfigError::Invalid {
                name: "max_frame_bytes",
                reason: format!(
                    "a chunk of {} rows may need {} bytes, limit is {}; raise the limit or the chunk count",
                    largest, needed, config.max_frame_bytes
                ),
            }
            .into());
        }

        store.bind_plan(PlanFingerprint {
            total_rows: planner.total_rows(),
            chunk_count: planner.chunk_count(),
        })?;

        let queue = Arc::new(JobQueue::new(chunks, config.lease_timeout));
        let restored = queue.restore_completed(store.completed_chunks()?);
        if restored > 0 {
            tracing::info!(
                "Resuming: {} of {} chunks already have results",
                restored,
                planner.chunk_count()
            );
        }

        tracing::info!(
            "Planned {} chunks over {} rows",
            planner.chunk_count(),
            planner.total_rows()
        );

        let shared = Arc::new(ServerState {
            queue,
            store,
            dataset,
            max_frame_bytes: config.max_frame_bytes,
            idle_timeout: config.idle_timeout,
            store_retry: config.store_retry,
        });

        Ok(Self { config, shared })
    }

    pub fn shared(&self) -> Arc<ServerState> {
        self.shared.clone()
    }

    pub fn queue(&self) -> Arc<JobQueue> {
        self.shared.queue.clone()
    }

    /// Binds the worker listener on the configured host and port.
    pub async fn bind(&self) -> anyhow::Result<TcpListener> {
        let addr = tokio::net::lookup_host((self.config.host.as_str(), self.config.port))
            .await
            .with_context(|| format!("failed to resolve {}", self.config.host))?
            .next()
            .with_context(|| format!("{} resolved to no address", self.config.host))?;

        let listener = bind_listener(addr, self.config.backlog)
            .with_context(|| format!("failed to bind {}", addr))?;
        tracing::info!("Listening for workers on {}", listener.local_addr()?);
        Ok(listener)
    }

    pub async fn run(self, interrupt: impl Future<Output = ()>) -> anyhow::Result<RunOutcome> {
        let listener = self.bind().await?;
        Ok(self.run_on(listener, interrupt).await?)
    }

    /// Serves workers on `listener` until every chunk is Done or `interrupt` resolves.
    pub async fn run_on(
        self,
        listener: TcpListener,
        interrupt: impl Future<Output = ()>,
    ) -> Result<RunOutcome> {
        let queue = self.shared.queue.clone();

        let reaper = queue.clone().spawn_reaper(self.config.reaper_interval);
        let reporter = spawn_progress_reporter(queue.clone(), self.config.progress_interval);
        let status_server = match self.config.status_addr {
            Some(addr) => Some(status::spawn(addr, self.shared.clone()).await.map_err(|e| {
                ConfigError::Invalid {
                    name: "status_addr",
                    reason: e.to_string(),
                }
            })?),
            None => None,
        };

        let shutdown = async {
            tokio::select! {
                _ = queue.wait_all_done() => Shutdown::Completed,
                _ = interrupt => Shutdown::Interrupted,
            }
        };
        let cause = serve(listener, self.shared.clone(), shutdown).await;

        reaper.abort();
        reporter.abort();
        if let Some(handle) = status_server {
            handle.abort();
        }

        if cause == Shutdown::Interrupted && !queue.all_done() {
            let progress = queue.progress();
            tracing::warn!(
                "Interrupted with {}/{} chunks done; completed results stay in the store",
                progress.done,
                progress.total
            );
            return Ok(RunOutcome::Interrupted(progress));
        }

        let aggregator = Aggregator::with_expected_chunks(self.config.chunk_count);
        let aggregate = aggregate_store(self.shared.store.clone(), &aggregator).await?;
        tracing::info!(
            "All {} chunks done: {} rows, total sales {:.2}",
            aggregate.chunks_reported,
            aggregate.total_rows,
            aggregate.total_sales
        );

        Ok(RunOutcome::Completed(aggregate))
    }
}

/// Logs queue progress every `interval`.
fn spawn_progress_reporter(queue: Arc<JobQueue>, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);

        loop {
            ticker.tick().await;
            let progress = queue.progress();
            tracing::info!(
                "Progress: {}/{} done, {} in flight, {} pending",
                progress.done,
                progress.total,
                progress.in_flight,
                progress.pending
            );
            if progress.is_complete() {
                break;
            }
        }
    })
}
