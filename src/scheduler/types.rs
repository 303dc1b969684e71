use crate::planner::{Chunk, ChunkId};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Instant;

/// Identity of one accepted TCP connection; the owner of leases.
///
/// A worker reconnecting gets a fresh `ConnectionId`, so leases never survive
/// the connection that took them.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct ConnectionId(pub String);

impl ConnectionId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Queue-wide monotonic lease counter. Each grant gets a value never issued before.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LeaseEpoch(pub u64);

/// Temporary ownership of an InFlight chunk.
#[derive(Debug, Clone, PartialEq)]
pub struct Lease {
    pub owner: ConnectionId,
    pub epoch: LeaseEpoch,
    /// Past this instant the reaper returns the chunk to Pending.
    pub deadline: Instant,
}

/// Lifecycle state of a chunk. Only `InFlight` carries a lease.
#[derive(Debug, Clone, PartialEq)]
pub enum ChunkStatus {
    Pending,
    InFlight(Lease),
    Done,
}

impl ChunkStatus {
    pub fn name(&self) -> &'static str {
        match self {
            ChunkStatus::Pending => "pending",
            ChunkStatus::InFlight(_) => "in_flight",
            ChunkStatus::Done => "done",
        }
    }
}

/// What the queue keeps per chunk.
#[derive(Debug, Clone)]
pub struct ChunkEntry {
    pub chunk: Chunk,
    pub status: ChunkStatus,
    /// Epoch of the most recent grant, kept after the lease is lost.
    pub last_epoch: Option<LeaseEpoch>,
}

/// Result of a successful `lease`.
#[derive(Debug, Clone, PartialEq)]
pub struct LeasedChunk {
    pub chunk: Chunk,
    pub epoch: LeaseEpoch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompleteOutcome {
    /// The chunk moved to Done.
    Completed,
    /// Duplicate completion; nothing changed.
    AlreadyDone,
    /// The epoch was superseded by a later grant (or the chunk is unknown).
    Stale,
}

/// Answer of the pre-write fence check on a reported result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fence {
    Current,
    AlreadyDone,
    Superseded,
}

/// Counts per status; published on every transition.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct QueueProgress {
    pub total: usize,
    pub pending: usize,
    pub in_flight: usize,
    pub done: usize,
}

impl QueueProgress {
    pub fn is_complete(&self) -> bool {
        self.done == self.total
    }
}

/// Why a connection's leases were handed back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseReason {
    Goodbye,
    Disconnected,
    IdleTimeout,
    ProtocolError,
    StoreFailure,
}

impl fmt::Display for ReleaseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            ReleaseReason::Goodbye => "goodbye",
            ReleaseReason::Disconnected => "disconnected",
            ReleaseReason::IdleTimeout => "idle timeout",
            ReleaseReason::ProtocolError => "protocol error",
            ReleaseReason::StoreFailure => "store failure",
        };
        f.write_str(reason)
    }
}
