//! Worker Client
//!
//! The pull side of the protocol: connect, introduce yourself, then keep asking
//! for chunks until the coordinator answers NO_JOB.
//!
//! ## Submodules
//! - **`metrics`**: Partial statistics over one chunk's rows.
//! - **`client`**: The connection loop (HELLO -> GET_JOB / RESULT ... -> BYE).

pub mod client;
pub mod metrics;

pub use client::{Worker, WorkerSummary};
pub use metrics::compute_metrics;
