use crate::dataset::SaleRecord;
use crate::planner::{ChunkId, RowRange};
use crate::store::{ChunkMetrics, WorkerId, WorkerResult};
use serde::{Deserialize, Serialize};

pub const PROTOCOL_VERSION: u16 = 1;

/// Rows of one chunk, shipped inside JOB.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChunkPayload {
    pub range: RowRange,
    pub rows: Vec<SaleRecord>,
}

impl ChunkPayload {
    /// Upper bound of the encoded JOB frame body for a chunk of `rows` rows.
    pub fn encoded_len_bound(rows: u64) -> u64 {
        // Two Option<f64> per row (tag + 8 bytes each) plus envelope, tags and range.
        rows * 18 + 64
    }
}

/// Every message either side may send.
///
/// - `Hello` / `GetJob` / `Result` / `Bye`: worker -> coordinator.
/// - `Job` / `NoJob`: coordinator -> worker.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum Message {
    Hello {
        worker_id: WorkerId,
    },

    GetJob,

    Job {
        chunk_id: ChunkId,
        payload: ChunkPayload,
    },

    NoJob,

    Result {
        worker_id: WorkerId,
        chunk_id: ChunkId,
        metrics: ChunkMetrics,
    },

    Bye,
}

impl Message {
    pub fn kind(&self) -> &'static str {
        match self {
            Message::Hello { .. } => "HELLO",
            Message::GetJob => "GET_JOB",
            Message::Job { .. } => "JOB",
            Message::NoJob => "NO_JOB",
            Message::Result { .. } => "RESULT",
            Message::Bye => "BYE",
        }
    }

    pub fn from_result(result: WorkerResult) -> Self {
        Message::Result {
            worker_id: result.worker_id,
            chunk_id: result.chunk_id,
            metrics: result.metrics,
        }
    }
}

/// Versioned frame body.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Envelope {
    pub version: u16,
    pub message: Message,
}

impl Envelope {
    pub fn new(message: Message) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            message,
        }
    }
}
