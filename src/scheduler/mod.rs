//! Chunk Scheduling Module
//!
//! Owns the chunk lifecycle state machine. Workers **pull** chunks; a chunk is
//! handed out under a **lease** that ends in one of three ways:
//! 1. **Completion**: the worker's result is stored and the chunk becomes `Done`.
//! 2. **Release**: the connection drops, so its chunks return to `Pending`.
//! 3. **Expiry**: the lease deadline passes and the reaper returns the chunk to `Pending`.
//!
//! Every lease carries a `LeaseEpoch`. A late result from a superseded lease is
//! fenced out instead of completing the chunk a second time.
//!
//! ## Submodules
//! - **`types`**: Chunk status, leases, epochs and progress counters.
//! - **`queue`**: The `JobQueue`, the single serialization point for scheduling.

pub mod queue;
pub mod types;

pub use queue::JobQueue;
pub use types::*;
