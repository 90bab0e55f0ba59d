//! Replication checkpoint contract.

use std::sync::atomic::{AtomicI64, Ordering};

/// A best-effort read of the replication checkpoint: the highest position
/// confirmed durably replicated and thus safe to expose to readers.
///
/// Reads are side-effect-free, infallible, and safe to call at high
/// frequency. The value is non-decreasing under normal operation; see
/// [`crate::gate::CheckpointFilter`] for what happens when it is not.
pub trait Checkpoint: Send + Sync {
    /// Current checkpoint value, without forcing a flush.
    fn read_non_flushed(&self) -> i64;
}

/// Atomic in-memory checkpoint, for tests and single-process embedding.
#[derive(Debug, Default)]
pub struct InMemoryCheckpoint(AtomicI64);

impl InMemoryCheckpoint {
    pub fn new(value: i64) -> Self {
        InMemoryCheckpoint(AtomicI64::new(value))
    }

    /// Advance (or retreat) the checkpoint.
    pub fn write(&self, value: i64) {
        self.0.store(value, Ordering::SeqCst);
    }
}

impl Checkpoint for InMemoryCheckpoint {
    fn read_non_flushed(&self) -> i64 {
        self.0.load(Ordering::SeqCst)
    }
}
