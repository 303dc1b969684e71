//! Distributed Sales Statistics Library
//!
//! A coordinator splits a sales dataset into row-range chunks and hands them to
//! workers over TCP. Workers compute per-chunk partial statistics and send them
//! back; once every chunk is reported the coordinator folds the partials into
//! the dataset-wide total, min, max and exact mean.
//!
//! ## Architecture Modules
//!
//! - **`planner`**: Splits `R` rows into `N` contiguous, near-equal chunks.
//! - **`scheduler`**: The `JobQueue`. Lease-based chunk lifecycle with epochs,
//!   release on disconnect and expiry of stuck leases.
//! - **`protocol`**: Versioned, length-prefixed bincode messages and their codec.
//! - **`server`**: Per-connection state machine, accept loop, coordinator runtime
//!   and the optional HTTP status endpoint.
//! - **`store`**: Idempotent result storage (SQLite for durability, memory for tests).
//! - **`aggregate`**: Row-weighted merge of per-chunk metrics.
//! - **`dataset`**: CSV loading and column resolution.
//! - **`worker`**: The worker side: metric computation and the client loop.
//! - **`config`** / **`error`**: Settings with defaults, and the error taxonomy.

pub mod aggregate;
pub mod config;
pub mod dataset;
pub mod error;
pub mod planner;
pub mod protocol;
pub mod scheduler;
pub mod server;
pub mod store;
pub mod worker;
