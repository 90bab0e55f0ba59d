//! Replication checkpoint gate.
//!
//! Commit notifications for locally appended events must not become visible
//! before the positions they carry are durably replicated. The gate buffers
//! them keyed by commit position and releases them, in position order, as
//! the replication checkpoint advances. No message is ever dropped.
//!
//! [`CheckpointFilter`] is the single-writer core; [`FilterWorker`] hosts it
//! on a dedicated thread with a self-rescheduling reconciliation tick.

mod filter;
mod worker;

pub use filter::{CheckpointFilter, Publisher};
pub use worker::{FilterWorker, GateHandle};
