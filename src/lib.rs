//! # Waterline
//!
//! The consistency/visibility layer of a distributed append-only event log.
//! Writers commit events into a global ordered log; replication confirms, at
//! its own pace, which positions are durable. Consumers must never observe
//! an event before it is durably replicated, yet the commit pipeline
//! notifies interested components immediately on local commit.
//!
//! ## Core Pieces
//!
//! - **Checkpoint gate** ([`gate`]): buffers event-committed notifications
//!   keyed by position and releases them, in position order, once the
//!   replication checkpoint has caught up. No message is ever dropped.
//! - **Catch-up subscriptions** ([`subscriptions`]): replay history from an
//!   arbitrary position and transition seamlessly to a live push feed, with
//!   strictly increasing positions and neither gaps nor duplicates —
//!   including across log tails that are committed but not yet visible.
//!
//! ## Example
//!
//! ```ignore
//! use waterline::{Checkpoint, FilterWorker, InMemoryCheckpoint};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! let checkpoint = Arc::new(InMemoryCheckpoint::default());
//! let (bus, released) = crossbeam_channel::unbounded();
//! let gate = FilterWorker::spawn(checkpoint.clone(), bus, Duration::from_millis(100));
//!
//! gate.event_committed(notification, commit_position);
//! // ... released carries it once the checkpoint reaches commit_position
//! ```

pub mod checkpoint;
pub mod error;
pub mod gate;
pub mod subscriptions;
pub mod types;

// Re-exports
pub use checkpoint::{Checkpoint, InMemoryCheckpoint};
pub use error::{HandlerError, ReadError, Result, SubscribeError};
pub use gate::{CheckpointFilter, FilterWorker, GateHandle, Publisher};
pub use subscriptions::{
    AllEventsSlice, CatchUpSettings, CatchUpSubscription, DropReason, DroppedHandler,
    EventHandler, FeedDropHandler, LiveBackend, LiveHandler, LiveSubscription, LogReader, Phase,
    PushHandler, RetryPolicy, SubscriptionHandlers,
};
pub use types::*;
