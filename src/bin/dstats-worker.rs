use clap::Parser;
use distributed_stats::config::{DEFAULT_IDLE_TIMEOUT, DEFAULT_MAX_FRAME_BYTES, WorkerConfig};
use distributed_stats::worker::Worker;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Pulls chunks from a coordinator and reports their statistics until none are left.
#[derive(Debug, Parser)]
#[command(name = "dstats-worker", version)]
struct Args {
    /// Coordinator address as `host:port`.
    #[arg(long, env = "DSTATS_SERVER", default_value = "127.0.0.1:5000")]
    server: String,

    /// Identity sent in HELLO; defaults to `worker-<pid>`.
    #[arg(long, env = "DSTATS_WORKER_ID")]
    worker_id: Option<String>,

    #[arg(long, env = "DSTATS_MAX_FRAME_BYTES", default_value_t = DEFAULT_MAX_FRAME_BYTES)]
    max_frame_bytes: usize,

    #[arg(long, env = "DSTATS_IO_TIMEOUT_SECS", default_value_t = DEFAULT_IDLE_TIMEOUT.as_secs())]
    io_timeout_secs: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let worker_id = args
        .worker_id
        .unwrap_or_else(|| format!("worker-{}", std::process::id()));

    let config = WorkerConfig {
        max_frame_bytes: args.max_frame_bytes,
        io_timeout: Duration::from_secs(args.io_timeout_secs),
        ..WorkerConfig::new(args.server, worker_id)
    };

    let summary = Worker::new(config).run().await?;
    tracing::info!(
        "Done: {} chunks, {} rows processed",
        summary.chunks_processed,
        summary.rows_processed
    );

    Ok(())
}
