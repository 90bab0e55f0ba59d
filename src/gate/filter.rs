//! Replication checkpoint filter core.

use crate::checkpoint::Checkpoint;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Fire-and-forget output seam for released messages.
///
/// Ordering across publishes is guaranteed only if the caller serializes
/// them; the filter does (single-writer).
pub trait Publisher<M>: Send {
    fn publish(&self, message: M);
}

impl<M: Send> Publisher<M> for crossbeam_channel::Sender<M> {
    fn publish(&self, message: M) {
        // A disconnected bus means the downstream is gone; nothing to do.
        let _ = self.send(message);
    }
}

/// Gates visibility of commit notifications on confirmed replication.
///
/// Messages are buffered keyed by commit position and released once the
/// checkpoint has reached them, lowest position first, arrival order within
/// a position. The buffer is unbounded and fail-open: retention is correct
/// because the replication protocol guarantees eventual advancement. Buffer
/// depth is exposed through [`CheckpointFilter::depth_gauge`].
///
/// The reconciliation skip check compares the checkpoint against the last
/// value reconciled with *equality*, not direction. A checkpoint regression
/// therefore leaves already-buffered higher positions parked until the value
/// climbs back past them, and a retreat-then-hold is invisible to the cheap
/// path. See `tests/filter.rs` for the pinned behavior.
///
/// Not thread-safe on its own: commit and tick handling must never run
/// concurrently. [`super::FilterWorker`] provides the owning thread.
pub struct CheckpointFilter<M, P: Publisher<M>> {
    checkpoint: Arc<dyn Checkpoint>,
    output: P,
    pending: BTreeMap<i64, Vec<M>>,
    last_checkpoint: i64,
    depth: Arc<AtomicUsize>,
}

impl<M, P: Publisher<M>> CheckpointFilter<M, P> {
    pub fn new(checkpoint: Arc<dyn Checkpoint>, output: P) -> Self {
        CheckpointFilter {
            checkpoint,
            output,
            pending: BTreeMap::new(),
            last_checkpoint: 0,
            depth: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Buffer a commit notification for `commit_position`, then reconcile.
    pub fn on_event_committed(&mut self, message: M, commit_position: i64) {
        self.pending
            .entry(commit_position)
            .or_default()
            .push(message);
        self.depth.fetch_add(1, Ordering::Relaxed);
        self.reconcile();
    }

    /// Periodic reconciliation against the checkpoint.
    pub fn on_tick(&mut self) {
        self.reconcile();
    }

    /// Number of buffered messages awaiting release.
    pub fn pending_len(&self) -> usize {
        self.pending.values().map(Vec::len).sum()
    }

    /// Shared gauge mirroring [`CheckpointFilter::pending_len`], readable
    /// from other threads.
    pub fn depth_gauge(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.depth)
    }

    fn reconcile(&mut self) {
        let chk = self.checkpoint.read_non_flushed();
        if chk == self.last_checkpoint {
            return;
        }
        self.last_checkpoint = chk;

        // Everything at or below the checkpoint is releasable; BTreeMap
        // iteration gives it back in increasing position order.
        let keep = self.pending.split_off(&chk.saturating_add(1));
        let release = std::mem::replace(&mut self.pending, keep);
        if release.is_empty() {
            return;
        }

        let mut released = 0usize;
        for (_, bucket) in release {
            released += bucket.len();
            for message in bucket {
                self.output.publish(message);
            }
        }
        self.depth.fetch_sub(released, Ordering::Relaxed);
        debug!(checkpoint = chk, released, "released gated commit notifications");
    }
}
