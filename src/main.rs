use clap::Parser;
use distributed_stats::config::{
    DEFAULT_BACKLOG, DEFAULT_CHUNKS, DEFAULT_DB_PATH, DEFAULT_HOST, DEFAULT_IDLE_TIMEOUT,
    DEFAULT_LEASE_TIMEOUT, DEFAULT_MAX_FRAME_BYTES, DEFAULT_PORT, DEFAULT_PROGRESS_INTERVAL,
    DEFAULT_REAPER_INTERVAL, ServerConfig,
};
use distributed_stats::dataset::{ColumnAliases, load_csv};
use distributed_stats::server::{Coordinator, RunOutcome};
use distributed_stats::store::RetryPolicy;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Splits a sales CSV into chunks, serves them to workers and prints the global statistics.
#[derive(Debug, Parser)]
#[command(name = "dstats-coordinator", version)]
struct Args {
    /// CSV file with the sales data.
    #[arg(long, env = "DSTATS_DATASET")]
    dataset: PathBuf,

    #[arg(long, env = "DSTATS_HOST", default_value = DEFAULT_HOST)]
    host: String,

    #[arg(long, env = "DSTATS_PORT", default_value_t = DEFAULT_PORT)]
    port: u16,

    #[arg(long, env = "DSTATS_BACKLOG", default_value_t = DEFAULT_BACKLOG)]
    backlog: u32,

    /// Number of chunks the dataset is split into.
    #[arg(long, env = "DSTATS_CHUNKS", default_value_t = DEFAULT_CHUNKS)]
    chunks: u32,

    /// Results database; `:memory:` keeps results in memory only.
    #[arg(long, env = "DSTATS_DB", default_value = DEFAULT_DB_PATH)]
    db: PathBuf,

    #[arg(long, env = "DSTATS_MAX_FRAME_BYTES", default_value_t = DEFAULT_MAX_FRAME_BYTES)]
    max_frame_bytes: usize,

    #[arg(long, env = "DSTATS_IDLE_TIMEOUT_SECS", default_value_t = DEFAULT_IDLE_TIMEOUT.as_secs())]
    idle_timeout_secs: u64,

    #[arg(long, env = "DSTATS_LEASE_TIMEOUT_SECS", default_value_t = DEFAULT_LEASE_TIMEOUT.as_secs())]
    lease_timeout_secs: u64,

    #[arg(long, env = "DSTATS_REAPER_INTERVAL_MS", default_value_t = DEFAULT_REAPER_INTERVAL.as_millis() as u64)]
    reaper_interval_ms: u64,

    #[arg(long, env = "DSTATS_PROGRESS_INTERVAL_SECS", default_value_t = DEFAULT_PROGRESS_INTERVAL.as_secs())]
    progress_interval_secs: u64,

    #[arg(long, env = "DSTATS_STORE_RETRY_ATTEMPTS", default_value_t = 5)]
    store_retry_attempts: usize,

    #[arg(long, env = "DSTATS_STORE_RETRY_BASE_MS", default_value_t = 150)]
    store_retry_base_ms: u64,

    /// Comma-separated header names tried for the price column.
    #[arg(long, env = "DSTATS_PRICE_COLUMNS", value_delimiter = ',')]
    price_columns: Vec<String>,

    /// Comma-separated header names tried for the quantity column.
    #[arg(long, env = "DSTATS_QUANTITY_COLUMNS", value_delimiter = ',')]
    quantity_columns: Vec<String>,

    /// Serve `/status` and `/aggregate` over HTTP on this address.
    #[arg(long, env = "DSTATS_STATUS_ADDR")]
    status_addr: Option<SocketAddr>,
}

impl Args {
    fn to_config(&self) -> ServerConfig {
        let defaults = ColumnAliases::default();
        let aliases = ColumnAliases {
            price: non_empty_or(&self.price_columns, defaults.price),
            quantity: non_empty_or(&self.quantity_columns, defaults.quantity),
        };

        ServerConfig {
            host: self.host.clone(),
            port: self.port,
            backlog: self.backlog,
            chunk_count: self.chunks,
            db_path: self.db.clone(),
            max_frame_bytes: self.max_frame_bytes,
            idle_timeout: Duration::from_secs(self.idle_timeout_secs),
            lease_timeout: Duration::from_secs(self.lease_timeout_secs),
            reaper_interval: Duration::from_millis(self.reaper_interval_ms),
            progress_interval: Duration::from_secs(self.progress_interval_secs),
            store_retry: RetryPolicy {
                attempts: self.store_retry_attempts,
                base_delay: Duration::from_millis(self.store_retry_base_ms),
                ..RetryPolicy::default()
            },
            aliases,
            status_addr: self.status_addr,
        }
    }
}

fn non_empty_or(values: &[String], fallback: Vec<String>) -> Vec<String> {
    if values.is_empty() {
        fallback
    } else {
        values.to_vec()
    }
}

async fn interrupted() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("Ctrl-C received, shutting down"),
        Err(e) => {
            tracing::error!("Cannot listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let config = args.to_config();
    config.validate()?;

    tracing::info!("Loading dataset from {}", args.dataset.display());
    let dataset = load_csv(&args.dataset, &config.aliases)?;

    let coordinator = Coordinator::prepare(config, Arc::new(dataset))?;
    tracing::info!("Press Ctrl+C to shutdown");

    match coordinator.run(interrupted()).await? {
        RunOutcome::Completed(aggregate) => {
            println!("{}", serde_json::to_string_pretty(&aggregate)?);
        }
        RunOutcome::Interrupted(progress) => {
            tracing::warn!(
                "Run incomplete ({}/{} chunks); restart with the same database to resume",
                progress.done,
                progress.total
            );
        }
    }

    Ok(())
}
