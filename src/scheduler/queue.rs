//! Job Queue
//!
//! Tracks the lifecycle of every chunk and which connection holds its lease.
//! All state sits behind one mutex: every scheduling decision (lease, complete,
//! release, reap) is a short bookkeeping critical section, and nothing else in
//! the process mutates chunk state.
//!
//! ## Responsibilities
//! - **Leasing**: Hands out the lowest-id Pending chunk and stamps it with a fresh epoch.
//! - **Completion**: Moves a chunk to Done, tolerating duplicate notices.
//! - **Release**: Returns every chunk held by a lost connection to Pending.
//! - **Expiry**: Reaps leases whose deadline passed (at-least-once semantics).
//! - **Progress**: Publishes status counts on a `watch` channel.

use super::types::*;
use crate::planner::{Chunk, ChunkId};

use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;

pub struct JobQueue {
    state: Mutex<QueueState>,
    lease_timeout: Duration,
    progress: watch::Sender<QueueProgress>,
}

struct QueueState {
    entries: BTreeMap<ChunkId, ChunkEntry>,
    /// Pending ids, ordered so the lowest id is leased first.
    pending: BTreeSet<ChunkId>,
    in_flight: usize,
    done: usize,
    next_epoch: u64,
}

impl QueueState {
    fn progress(&self) -> QueueProgress {
        QueueProgress {
            total: self.entries.len(),
            pending: self.pending.len(),
            in_flight: self.in_flight,
            done: self.done,
        }
    }

    fn entry_mut(&mut self, chunk_id: ChunkId) -> Option<&mut ChunkEntry> {
        self.entries.get_mut(&chunk_id)
    }

    /// InFlight -> Pending. Caller guarantees the chunk is InFlight.
    fn requeue(&mut self, chunk_id: ChunkId) {
        if let Some(entry) = self.entry_mut(chunk_id) {
            entry.status = ChunkStatus::Pending;
        }
        self.in_flight -= 1;
        self.pending.insert(chunk_id);
    }
}

impl JobQueue {
    /// Builds the queue with every chunk Pending.
    pub fn new(chunks: Vec<Chunk>, lease_timeout: Duration) -> Self {
        let entries: BTreeMap<ChunkId, ChunkEntry> = chunks
            .into_iter()
            .map(|chunk| {
                let entry = ChunkEntry {
                    chunk,
                    status: ChunkStatus::Pending,
                    last_epoch: None,
                };
                (entry.chunk.id, entry)
            })
            .collect();
        let pending: BTreeSet<ChunkId> = entries.keys().copied().collect();

        let state = QueueState {
            entries,
            pending,
            in_flight: 0,
            done: 0,
            next_epoch: 1,
        };
        let (progress, _) = watch::channel(state.progress());

        Self {
            state: Mutex::new(state),
            lease_timeout,
            progress,
        }
    }

    pub fn lease_timeout(&self) -> Duration {
        self.lease_timeout
    }

    /// Leases the lowest-id Pending chunk to `owner`.
    ///
    /// Returns `None` when nothing is Pending, even if chunks are still
    /// InFlight on other connections.
    pub fn lease(&self, owner: &ConnectionId) -> Option<LeasedChunk> {
        self.lease_at(owner, Instant::now())
    }

    pub fn lease_at(&self, owner: &ConnectionId, now: Instant) -> Option<LeasedChunk> {
        let mut state = self.state.lock();

        let chunk_id = state.pending.first().copied()?;
        let epoch = LeaseEpoch(state.next_epoch);
        let deadline = now + self.lease_timeout;

        // Counters move only once the entry is known to exist.
        let entry = state.entry_mut(chunk_id)?;
        entry.status = ChunkStatus::InFlight(Lease {
            owner: owner.clone(),
            epoch,
            deadline,
        });
        entry.last_epoch = Some(epoch);
        let chunk = entry.chunk.clone();

        state.pending.remove(&chunk_id);
        state.next_epoch += 1;
        state.in_flight += 1;

        self.publish(&state);
        drop(state);

        tracing::debug!("Leased chunk {} to {} (epoch {})", chunk_id, owner, epoch.0);
        Some(LeasedChunk { chunk, epoch })
    }

    /// Checks, without changing anything, whether a result stamped with
    /// `epoch` may still complete `chunk_id`.
    pub fn fence(&self, chunk_id: ChunkId, epoch: LeaseEpoch) -> Fence {
        let state = self.state.lock();
        let Some(entry) = state.entries.get(&chunk_id) else {
            return Fence::Superseded;
        };
        match &entry.status {
            ChunkStatus::Done => Fence::AlreadyDone,
            _ if entry.last_epoch == Some(epoch) => Fence::Current,
            _ => Fence::Superseded,
        }
    }

    /// Marks `chunk_id` Done on behalf of the lease `(owner, epoch)`.
    ///
    /// Accepted while the lease is still the chunk's latest grant: either the
    /// chunk is InFlight under it, or it was reaped back to Pending and not
    /// leased again since. Already-Done chunks are left untouched.
    pub fn complete(
        &self,
        chunk_id: ChunkId,
        owner: &ConnectionId,
        epoch: LeaseEpoch,
    ) -> CompleteOutcome {
        let mut state = self.state.lock();

        let Some(entry) = state.entry_mut(chunk_id) else {
            return CompleteOutcome::Stale;
        };

        let was_in_flight = match &entry.status {
            ChunkStatus::Done => return CompleteOutcome::AlreadyDone,
            ChunkStatus::InFlight(lease) if lease.epoch == epoch && &lease.owner == owner => true,
            ChunkStatus::Pending if entry.last_epoch == Some(epoch) => false,
            _ => return CompleteOutcome::Stale,
        };

        entry.status = ChunkStatus::Done;
        if was_in_flight {
            state.in_flight -= 1;
        } else {
            state.pending.remove(&chunk_id);
        }
        state.done += 1;

        self.publish(&state);
        let progress = state.progress();
        drop(state);

        tracing::info!(
            "Chunk {} done ({}/{})",
            chunk_id,
            progress.done,
            progress.total
        );
        CompleteOutcome::Completed
    }

    /// Returns every chunk InFlight under `owner` to Pending.
    pub fn release(&self, owner: &ConnectionId) -> Vec<ChunkId> {
        let mut state = self.state.lock();

        let held: Vec<ChunkId> = state
            .entries
            .values()
            .filter_map(|entry| match &entry.status {
                ChunkStatus::InFlight(lease) if &lease.owner == owner => Some(entry.chunk.id),
                _ => None,
            })
            .collect();

        for chunk_id in &held {
            state.requeue(*chunk_id);
        }
        if !held.is_empty() {
            self.publish(&state);
        }

        held
    }

    /// Returns expired leases to Pending; yields `(chunk, previous owner)` pairs.
    pub fn reap_expired(&self) -> Vec<(ChunkId, ConnectionId)> {
        self.reap_expired_at(Instant::now())
    }

    pub fn reap_expired_at(&self, now: Instant) -> Vec<(ChunkId, ConnectionId)> {
        let mut state = self.state.lock();

        let expired: Vec<(ChunkId, ConnectionId)> = state
            .entries
            .values()
            .filter_map(|entry| match &entry.status {
                ChunkStatus::InFlight(lease) if lease.deadline <= now => {
                    Some((entry.chunk.id, lease.owner.clone()))
                }
                _ => None,
            })
            .collect();

        for (chunk_id, _) in &expired {
            state.requeue(*chunk_id);
        }
        if !expired.is_empty() {
            self.publish(&state);
        }

        expired
    }

    /// Marks chunks Done from results that survived a restart.
    /// Unknown ids are ignored. Returns how many chunks changed.
    pub fn restore_completed(&self, chunk_ids: impl IntoIterator<Item = ChunkId>) -> usize {
        let mut state = self.state.lock();
        let mut restored = 0;

        for chunk_id in chunk_ids {
            let Some(entry) = state.entry_mut(chunk_id) else {
                continue;
            };
            if entry.status != ChunkStatus::Pending {
                continue;
            }
            entry.status = ChunkStatus::Done;
            state.pending.remove(&chunk_id);
            state.done += 1;
            restored += 1;
        }

        if restored > 0 {
            self.publish(&state);
        }
        restored
    }

    pub fn all_done(&self) -> bool {
        self.progress().is_complete()
    }

    pub fn progress(&self) -> QueueProgress {
        self.state.lock().progress()
    }

    pub fn status(&self, chunk_id: ChunkId) -> Option<ChunkStatus> {
        let state = self.state.lock();
        state
            .entries
            .get(&chunk_id)
            .map(|entry| entry.status.clone())
    }

    pub fn chunk(&self, chunk_id: ChunkId) -> Option<Chunk> {
        let state = self.state.lock();
        state
            .entries
            .get(&chunk_id)
            .map(|entry| entry.chunk.clone())
    }

    pub fn subscribe(&self) -> watch::Receiver<QueueProgress> {
        self.progress.subscribe()
    }

    /// Resolves once every chunk is Done.
    pub async fn wait_all_done(&self) {
        let mut rx = self.progress.subscribe();
        // The sender lives as long as `self`, so the channel cannot close here.
        let _ = rx.wait_for(QueueProgress::is_complete).await;
    }

    /// Spawns the background task that reaps expired leases every `interval`.
    pub fn spawn_reaper(self: Arc<Self>, interval: Duration) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;

                for (chunk_id, owner) in self.reap_expired() {
                    tracing::info!(
                        "Lease on chunk {} held by {} expired, requeued",
                        chunk_id,
                        owner
                    );
                }

                if self.all_done() {
                    tracing::debug!("All chunks done, lease reaper stopping");
                    break;
                }
            }
        })
    }

    fn publish(&self, state: &QueueState) {
        self.progress.send_replace(state.progress());
    }
}
