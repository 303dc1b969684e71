//! Connection Handler
//!
//! One handler per accepted connection. It owns the connection's leases and
//! turns each decoded message into queue and store operations:
//!
//! ```text
//! AwaitingHello --HELLO--> AwaitingRequest <--> Dispatching
//!       |                        |
//!       +------ error / BYE / EOF / idle ------> Closed
//! ```
//!
//! Whatever closes the connection, every chunk still leased to it goes back to
//! Pending.

use super::ServerState;
use crate::error::{Error, ProtocolError};
use crate::planner::ChunkId;
use crate::protocol::{ChunkPayload, FrameCodec, Message};
use crate::scheduler::{CompleteOutcome, ConnectionId, Fence, LeaseEpoch, ReleaseReason};
use crate::store::{ChunkMetrics, ResultRow, WorkerId, WorkerResult, upsert_with_retry};

use futures_util::{SinkExt, StreamExt};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::Framed;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerState {
    AwaitingHello,
    AwaitingRequest,
    Dispatching,
    Closed,
}

impl HandlerState {
    pub fn name(&self) -> &'static str {
        match self {
            HandlerState::AwaitingHello => "awaiting HELLO",
            HandlerState::AwaitingRequest => "awaiting a request",
            HandlerState::Dispatching => "dispatching",
            HandlerState::Closed => "closed",
        }
    }
}

/// What the connection loop does after a message was dispatched.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Send(Message),
    /// RESULT and HELLO get no application-level acknowledgement.
    Silent,
    Close,
}

pub struct ConnectionHandler {
    id: ConnectionId,
    state: HandlerState,
    worker_id: Option<WorkerId>,
    /// Leases granted on this connection and not yet answered by a RESULT.
    leases: HashMap<ChunkId, LeaseEpoch>,
    /// Chunks whose lease was already answered by a RESULT on this connection.
    answered: HashSet<ChunkId>,
    shared: Arc<ServerState>,
}

impl ConnectionHandler {
    pub fn new(id: ConnectionId, shared: Arc<ServerState>) -> Self {
        Self {
            id,
            state: HandlerState::AwaitingHello,
            worker_id: None,
            leases: HashMap::new(),
            answered: HashSet::new(),
            shared,
        }
    }

    pub fn id(&self) -> &ConnectionId {
        &self.id
    }

    pub fn state(&self) -> HandlerState {
        self.state
    }

    pub fn worker_id(&self) -> Option<&WorkerId> {
        self.worker_id.as_ref()
    }

    /// Chunks this connection holds, lowest id first.
    pub fn held_chunks(&self) -> Vec<ChunkId> {
        let mut held: Vec<ChunkId> = self.leases.keys().copied().collect();
        held.sort();
        held
    }

    /// Applies one inbound message.
    ///
    /// `Err` means the connection must be closed: protocol errors for
    /// out-of-state or inconsistent messages, store errors once the write
    /// retries are spent.
    pub async fn dispatch(&mut self, message: Message) -> Result<Reply, Error> {
        match (self.state, message) {
            (HandlerState::AwaitingHello, Message::Hello { worker_id }) => {
                tracing::info!("Worker {} said hello", worker_id);
                self.worker_id = Some(worker_id);
                self.state = HandlerState::AwaitingRequest;
                Ok(Reply::Silent)
            }

            (HandlerState::AwaitingRequest, Message::GetJob) => {
                self.state = HandlerState::Dispatching;
                let reply = self.dispatch_job();
                self.state = HandlerState::AwaitingRequest;
                Ok(reply)
            }

            (
                HandlerState::AwaitingRequest,
                Message::Result {
                    worker_id,
                    chunk_id,
                    metrics,
                },
            ) => {
                self.state = HandlerState::Dispatching;
                self.accept_result(worker_id, chunk_id, metrics).await?;
                self.state = HandlerState::AwaitingRequest;
                Ok(Reply::Silent)
            }

            (HandlerState::AwaitingRequest, Message::Bye) => {
                self.state = HandlerState::Closed;
                Ok(Reply::Close)
            }

            (state, message) => Err(ProtocolError::UnexpectedMessage {
                kind: message.kind(),
                state: state.name(),
            }
            .into()),
        }
    }

    fn dispatch_job(&mut self) -> Reply {
        let Some(leased) = self.shared.queue.lease(&self.id) else {
            tracing::debug!("Nothing pending, answering NO_JOB");
            return Reply::Send(Message::NoJob);
        };

        // Sliced outside the queue lock.
        let rows = self.shared.dataset.slice(leased.chunk.range);
        self.leases.insert(leased.chunk.id, leased.epoch);

        tracing::debug!(
            "Dispatching chunk {} ({} rows, epoch {})",
            leased.chunk.id,
            rows.len(),
            leased.epoch.0
        );

        Reply::Send(Message::Job {
            chunk_id: leased.chunk.id,
            payload: ChunkPayload {
                range: leased.chunk.range,
                rows,
            },
        })
    }

    async fn accept_result(
        &mut self,
        worker_id: WorkerId,
        chunk_id: ChunkId,
        metrics: ChunkMetrics,
    ) -> Result<(), Error> {
        if let Some(hello) = &self.worker_id
            && hello != &worker_id
        {
            return Err(ProtocolError::IdentityMismatch {
                hello: hello.0.clone(),
                result: worker_id.0,
            }
            .into());
        }

        let Some(epoch) = self.leases.get(&chunk_id).copied() else {
            if self.answered.contains(&chunk_id) {
                tracing::warn!(
                    "Dropping repeated result for chunk {} from {}",
                    chunk_id,
                    worker_id
                );
                return Ok(());
            }
            return Err(ProtocolError::UnknownLease(chunk_id.0).into());
        };

        let max_rows = self
            .shared
            .queue
            .chunk(chunk_id)
            .map(|chunk| chunk.range.len())
            .unwrap_or_default();
        metrics
            .check(max_rows)
            .map_err(|reason| ProtocolError::InvalidMetrics {
                chunk_id: chunk_id.0,
                reason,
            })?;

        // The lease is answered whatever happens next.
        self.leases.remove(&chunk_id);
        self.answered.insert(chunk_id);

        match self.shared.queue.fence(chunk_id, epoch) {
            Fence::Current => {}
            Fence::AlreadyDone => {
                tracing::warn!(
                    "Dropping result for chunk {} from {}: chunk already done",
                    chunk_id,
                    worker_id
                );
                return Ok(());
            }
            Fence::Superseded => {
                tracing::warn!(
                    "Dropping result for chunk {} from {}: lease epoch {} superseded",
                    chunk_id,
                    worker_id,
                    epoch.0
                );
                return Ok(());
            }
        }

        let row = ResultRow::new(
            WorkerResult {
                worker_id,
                chunk_id,
                metrics,
            },
            epoch,
        );
        if let Err(e) =
            upsert_with_retry(self.shared.store.clone(), row, self.shared.store_retry).await
        {
            tracing::error!("Failed to store result for chunk {}: {}", chunk_id, e);
            // Keep the lease so closing the connection requeues the chunk.
            self.leases.insert(chunk_id, epoch);
            self.answered.remove(&chunk_id);
            return Err(e.into());
        }

        match self.shared.queue.complete(chunk_id, &self.id, epoch) {
            CompleteOutcome::Completed | CompleteOutcome::AlreadyDone => {}
            CompleteOutcome::Stale => {
                // Superseded between the fence and the write; the aggregate
                // keeps one row per chunk.
                tracing::warn!(
                    "Result for chunk {} stored under superseded epoch {}",
                    chunk_id,
                    epoch.0
                );
            }
        }

        Ok(())
    }

    /// Moves to Closed and hands every lease of this connection back to the queue.
    pub fn close(&mut self, reason: ReleaseReason) -> Vec<ChunkId> {
        self.state = HandlerState::Closed;
        self.leases.clear();
        self.answered.clear();

        let released = self.shared.queue.release(&self.id);
        if released.is_empty() {
            tracing::info!("Connection closed ({})", reason);
        } else {
            tracing::info!(
                "Connection closed ({}), requeued chunks {:?}",
                reason,
                released.iter().map(|id| id.0).collect::<Vec<_>>()
            );
        }
        released
    }
}

/// Drives one connection until it closes and returns why it closed.
pub async fn handle_connection<S>(
    stream: S,
    id: ConnectionId,
    shared: Arc<ServerState>,
) -> ReleaseReason
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut framed = Framed::new(stream, FrameCodec::new(shared.max_frame_bytes));
    let idle_timeout = shared.idle_timeout;
    let mut handler = ConnectionHandler::new(id, shared);

    let reason = loop {
        let next = match tokio::time::timeout(idle_timeout, framed.next()).await {
            Ok(next) => next,
            Err(_) => break ReleaseReason::IdleTimeout,
        };

        let message = match next {
            None => break ReleaseReason::Disconnected,
            Some(Ok(message)) => message,
            Some(Err(ProtocolError::Io(e))) => {
                tracing::debug!("Read failed: {}", e);
                break ReleaseReason::Disconnected;
            }
            Some(Err(e)) => {
                tracing::warn!("Protocol error: {}", e);
                break ReleaseReason::ProtocolError;
            }
        };

        tracing::debug!("Received {}", message.kind());

        match handler.dispatch(message).await {
            Ok(Reply::Send(reply)) => {
                if let Err(e) = framed.send(reply).await {
                    tracing::warn!("Failed to send reply: {}", e);
                    break ReleaseReason::Disconnected;
                }
            }
            Ok(Reply::Silent) => {}
            Ok(Reply::Close) => break ReleaseReason::Goodbye,
            Err(Error::Store(e)) => {
                tracing::error!("Closing connection after store failure: {}", e);
                break ReleaseReason::StoreFailure;
            }
            Err(e) => {
                tracing::warn!("Protocol error: {}", e);
                break ReleaseReason::ProtocolError;
            }
        }
    };

    handler.close(reason);
    reason
}
