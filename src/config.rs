//! Runtime configuration for the coordinator and the worker.
//!
//! Both structs carry the defaults the binaries fall back to; `main.rs` and
//! `bin/dstats-worker.rs` overlay command line and `DSTATS_*` environment values.

use crate::dataset::ColumnAliases;
use crate::error::ConfigError;
use crate::store::RetryPolicy;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 5000;
pub const DEFAULT_BACKLOG: u32 = 128;
pub const DEFAULT_CHUNKS: u32 = 100;
pub const DEFAULT_DB_PATH: &str = "results.sqlite";
pub const DEFAULT_MAX_FRAME_BYTES: usize = 64 * 1024 * 1024;
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(300);
pub const DEFAULT_LEASE_TIMEOUT: Duration = Duration::from_secs(120);
pub const DEFAULT_REAPER_INTERVAL: Duration = Duration::from_secs(1);
pub const DEFAULT_PROGRESS_INTERVAL: Duration = Duration::from_secs(5);

/// Smallest frame limit accepted; anything lower could not carry a HELLO.
const MIN_FRAME_BYTES: usize = 1024;

/// Path value selecting the non-durable in-memory result store.
pub const MEMORY_DB: &str = ":memory:";

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub backlog: u32,
    /// Number of chunks the dataset is split into.
    pub chunk_count: u32,
    pub db_path: PathBuf,
    pub max_frame_bytes: usize,
    /// A connection silent for longer than this is closed and its leases released.
    pub idle_timeout: Duration,
    /// A lease not completed within this window is reaped back to Pending.
    pub lease_timeout: Duration,
    pub reaper_interval: Duration,
    pub progress_interval: Duration,
    pub store_retry: RetryPolicy,
    pub aliases: ColumnAliases,
    /// Optional HTTP address for `/status` and `/aggregate`.
    pub status_addr: Option<SocketAddr>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            backlog: DEFAULT_BACKLOG,
            chunk_count: DEFAULT_CHUNKS,
            db_path: PathBuf::from(DEFAULT_DB_PATH),
            max_frame_bytes: DEFAULT_MAX_FRAME_BYTES,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            lease_timeout: DEFAULT_LEASE_TIMEOUT,
            reaper_interval: DEFAULT_REAPER_INTERVAL,
            progress_interval: DEFAULT_PROGRESS_INTERVAL,
            store_retry: RetryPolicy::default(),
            aliases: ColumnAliases::default(),
            status_addr: None,
        }
    }
}

impl ServerConfig {
    /// Rejects settings the server cannot run with. Checked before the dataset is loaded.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.chunk_count == 0 {
            return Err(ConfigError::ZeroChunks);
        }
        if self.backlog == 0 {
            return Err(invalid("backlog", "must be positive"));
        }
        if self.max_frame_bytes < MIN_FRAME_BYTES {
            return Err(invalid(
                "max_frame_bytes",
                format!("must be at least {MIN_FRAME_BYTES}"),
            ));
        }
        if self.max_frame_bytes > u32::MAX as usize {
            return Err(invalid("max_frame_bytes", "must fit a 4-byte length prefix"));
        }
        if self.idle_timeout.is_zero() {
            return Err(invalid("idle_timeout", "must be positive"));
        }
        if self.lease_timeout.is_zero() {
            return Err(invalid("lease_timeout", "must be positive"));
        }
        if self.reaper_interval.is_zero() {
            return Err(invalid("reaper_interval", "must be positive"));
        }
        if self.store_retry.attempts == 0 {
            return Err(invalid("store_retry.attempts", "must be at least 1"));
        }
        if self.aliases.price.is_empty() || self.aliases.quantity.is_empty() {
            return Err(invalid("aliases", "price and quantity need at least one alias"));
        }
        Ok(())
    }

    pub fn uses_memory_store(&self) -> bool {
        self.db_path.as_os_str() == MEMORY_DB
    }
}

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub server: String,
    pub worker_id: String,
    pub max_frame_bytes: usize,
    /// Bound on a single request/response exchange with the coordinator.
    pub io_timeout: Duration,
}

impl WorkerConfig {
    pub fn new(server: impl Into<String>, worker_id: impl Into<String>) -> Self {
        Self {
            server: server.into(),
            worker_id: worker_id.into(),
            max_frame_bytes: DEFAULT_MAX_FRAME_BYTES,
            io_timeout: DEFAULT_IDLE_TIMEOUT,
        }
    }
}

fn invalid(name: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        name,
        reason: reason.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(ServerConfig::default().validate().is_ok());
    }

    #[test]
    fn test_zero_chunks_rejected() {
        let config = ServerConfig {
            chunk_count: 0,
            ..ServerConfig::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::ZeroChunks)));
    }

    #[test]
    fn test_tiny_frame_limit_rejected() {
        let config = ServerConfig {
            max_frame_bytes: 16,
            ..ServerConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("max_frame_bytes"));
    }

    #[test]
    fn test_memory_store_selected_by_path() {
        let config = ServerConfig {
            db_path: PathBuf::from(MEMORY_DB),
            ..ServerConfig::default()
        };
        assert!(config.uses_memory_store());
        assert!(!ServerConfig::default().uses_memory_store());
    }
}
