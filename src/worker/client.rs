use super::metrics::compute_metrics;
use crate::config::WorkerConfig;
use crate::protocol::{FrameCodec, Message};
use crate::store::{WorkerId, WorkerResult};

use anyhow::{Context, Result, bail};
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio_util::codec::Framed;

/// What one worker session accomplished.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerSummary {
    pub chunks_processed: usize,
    pub rows_processed: u64,
}

pub struct Worker {
    config: WorkerConfig,
}

impl Worker {
    pub fn new(config: WorkerConfig) -> Self {
        Self { config }
    }

    pub fn worker_id(&self) -> WorkerId {
        WorkerId(self.config.worker_id.clone())
    }

    /// Connects to the configured coordinator and works until NO_JOB.
    pub async fn run(&self) -> Result<WorkerSummary> {
        let stream = TcpStream::connect(&self.config.server)
            .await
            .with_context(|| format!("failed to connect to {}", self.config.server))?;
        stream.set_nodelay(true)?;

        tracing::info!("Worker {} connected to {}", self.config.worker_id, self.config.server);
        self.run_on(stream).await
    }

    /// Runs the protocol over an already established stream.
    pub async fn run_on<S>(&self, stream: S) -> Result<WorkerSummary>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let mut framed = Framed::new(stream, FrameCodec::new(self.config.max_frame_bytes));
        let worker_id = self.worker_id();
        let mut summary = WorkerSummary::default();

        framed
            .send(Message::Hello {
                worker_id: worker_id.clone(),
            })
            .await?;

        loop {
            framed.send(Message::GetJob).await?;

            let reply = tokio::time::timeout(self.config.io_timeout, framed.next())
                .await
                .context("timed out waiting for the coordinator")?;

            let message = match reply {
                Some(message) => message?,
                None => bail!("coordinator closed the connection"),
            };

            match message {
                Message::NoJob => {
                    tracing::info!("No more jobs, worker {} finishing", worker_id);
                    break;
                }
                Message::Job { chunk_id, payload } => {
                    let metrics = compute_metrics(&payload.rows);
                    tracing::debug!(
                        "Chunk {} processed: {} rows, avg {:.4}",
                        chunk_id,
                        metrics.rows_processed,
                        metrics.avg_price
                    );

                    framed
                        .send(Message::from_result(WorkerResult {
                            worker_id: worker_id.clone(),
                            chunk_id,
                            metrics,
                        }))
                        .await?;

                    summary.chunks_processed += 1;
                    summary.rows_processed += metrics.rows_processed;
                }
                other => bail!("unexpected {} from coordinator", other.kind()),
            }
        }

        // The coordinator releases leases on close anyway; BYE just makes it graceful.
        if let Err(e) = framed.send(Message::Bye).await {
            tracing::debug!("Failed to send BYE: {}", e);
        }

        Ok(summary)
    }
}
