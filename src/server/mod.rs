//! Coordinator Server
//!
//! Everything between the TCP socket and the scheduling/storage layers.
//!
//! ## Submodules
//! - **`handler`**: The per-connection protocol state machine.
//! - **`listener`**: Socket setup and the accept loop.
//! - **`coordinator`**: Startup, background tasks, and the end-of-run aggregate.
//! - **`status`**: Optional HTTP endpoints exposing progress and the live aggregate.

pub mod coordinator;
pub mod handler;
pub mod listener;
pub mod status;

pub use coordinator::{Coordinator, RunOutcome};
pub use handler::{ConnectionHandler, HandlerState, Reply, handle_connection};
pub use listener::{Shutdown, bind_listener, serve};

use crate::dataset::Dataset;
use crate::scheduler::JobQueue;
use crate::store::{ResultStore, RetryPolicy};

use std::sync::Arc;
use std::time::Duration;

/// Shared by every connection handler and the status endpoints.
pub struct ServerState {
    pub queue: Arc<JobQueue>,
    pub store: Arc<dyn ResultStore>,
    pub dataset: Arc<dyn Dataset>,
    pub max_frame_bytes: usize,
    pub idle_timeout: Duration,
    pub store_retry: RetryPolicy,
}
