//! Catch-up subscription configuration and lifecycle types.

use crate::error::{HandlerError, SubscribeError};
use crate::types::ResolvedEvent;
use std::sync::Arc;

/// Retry policy for transient forward-read failures.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RetryPolicy {
    /// Retry up to this many times, then drop with
    /// [`DropReason::ReadFailure`].
    Limited(u32),
    /// Retry forever.
    Unbounded,
}

/// Configuration for a catch-up subscription.
#[derive(Clone, Debug)]
pub struct CatchUpSettings {
    /// Events per forward read during catch-up.
    /// Default: 500
    pub read_batch_size: usize,

    /// Max live events buffered before the handoff completes; exceeding it
    /// drops the subscription rather than silently discarding events.
    /// Default: 10_000
    pub max_live_queue_len: usize,

    /// Resolve link events on reads and pushes.
    pub resolve_link_tos: bool,

    /// Retry policy for transient read failures. Default: Limited(5)
    pub read_retry: RetryPolicy,

    /// Max *consecutive zero-progress* empty reads tolerated before the
    /// subscription drops with a read failure. `None` = unbounded.
    ///
    /// Empty reads that still advance the cursor never count: they are the
    /// normal shape of a log tail that is committed but not yet replicated.
    pub max_empty_pages: Option<usize>,
}

impl Default for CatchUpSettings {
    fn default() -> Self {
        Self {
            read_batch_size: 500,
            max_live_queue_len: 10_000,
            resolve_link_tos: false,
            read_retry: RetryPolicy::Limited(5),
            max_empty_pages: None,
        }
    }
}

/// Why a subscription terminated.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DropReason {
    /// The owner called `stop()`.
    UserInitiated,
    /// Forward reads failed and the retry policy was exhausted.
    ReadFailure,
    /// The consumer's event handler returned an error.
    HandlerFailure,
    /// The server terminated the live feed.
    ServerError,
    /// The connection to the backend closed.
    ConnectionClosed,
    /// The live buffer exceeded its bound before the handoff completed.
    LiveBufferOverflow,
}

/// Per-event delivery callback. Invoked exactly once per delivered event,
/// from the read loop during catch-up and from the push path once live —
/// never concurrently with itself. A returned error is fatal to the
/// subscription.
pub type EventHandler = Arc<dyn Fn(&ResolvedEvent) -> Result<(), HandlerError> + Send + Sync>;

/// Fires exactly once, when the subscription transitions to live delivery.
pub type LiveHandler = Box<dyn FnOnce() + Send>;

/// Fires exactly once, on termination, with the reason and optional cause.
pub type DroppedHandler = Box<dyn FnOnce(DropReason, Option<SubscribeError>) + Send>;

/// The lifecycle callbacks supplied at construction.
pub struct SubscriptionHandlers {
    pub on_event: EventHandler,
    pub on_live: LiveHandler,
    pub on_dropped: DroppedHandler,
}

impl SubscriptionHandlers {
    /// Handlers with no-op lifecycle callbacks.
    pub fn new(on_event: EventHandler) -> Self {
        Self {
            on_event,
            on_live: Box::new(|| {}),
            on_dropped: Box::new(|_, _| {}),
        }
    }

    pub fn with_on_live(mut self, on_live: impl FnOnce() + Send + 'static) -> Self {
        self.on_live = Box::new(on_live);
        self
    }

    pub fn with_on_dropped(
        mut self,
        on_dropped: impl FnOnce(DropReason, Option<SubscribeError>) + Send + 'static,
    ) -> Self {
        self.on_dropped = Box::new(on_dropped);
        self
    }
}
