//! Error taxonomy.
//!
//! Each variant family maps to one recovery policy:
//! - **`ProtocolError`**: the offending connection is closed and its leases released.
//! - **`ConfigError`**: fatal at startup, the listener is never bound.
//! - **`StoreError`**: retried with backoff, then the connection is closed.
//!
//! Lease timeouts have no error type; they are recovered silently by the reaper.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("frame of {len} bytes exceeds the {max} byte limit")]
    FrameTooLarge { len: usize, max: usize },

    #[error("malformed frame: {0}")]
    Malformed(String),

    #[error("unsupported protocol version {found} (expected {expected})")]
    UnsupportedVersion { found: u16, expected: u16 },

    #[error("unexpected {kind} while {state}")]
    UnexpectedMessage { kind: &'static str, state: &'static str },

    #[error("worker identity mismatch: hello={hello} result={result}")]
    IdentityMismatch { hello: String, result: String },

    #[error("chunk {0} was never leased on this connection")]
    UnknownLease(u32),

    #[error("inconsistent metrics for chunk {chunk_id}: {reason}")]
    InvalidMetrics { chunk_id: u32, reason: String },

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("chunk count must be positive")]
    ZeroChunks,

    #[error("chunk count {chunks} exceeds row count {rows}")]
    ChunksExceedRows { chunks: u64, rows: u64 },

    #[error("no {role} column found among {available:?}")]
    MissingColumn {
        role: &'static str,
        available: Vec<String>,
    },

    #[error(
        "results database belongs to a different plan \
         (stored {stored_rows} rows / {stored_chunks} chunks, requested {rows} rows / {chunks} chunks)"
    )]
    PlanMismatch {
        stored_rows: u64,
        stored_chunks: u32,
        rows: u64,
        chunks: u32,
    },

    #[error("failed to load dataset: {0}")]
    Dataset(String),

    #[error("invalid setting {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("store task panicked or was cancelled: {0}")]
    Join(String),

    #[error("store write failed after {attempts} attempts: {last}")]
    RetriesExhausted { attempts: usize, last: String },
}

/// Everything that can end a connection handler.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
