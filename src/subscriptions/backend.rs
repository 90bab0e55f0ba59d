//! External contracts: the storage reader and the live feed backend.

use crate::error::{ReadError, SubscribeError};
use crate::types::{Position, ResolvedEvent};
use std::sync::Arc;

/// One page of a forward read over the global log.
#[derive(Clone, Debug)]
pub struct AllEventsSlice {
    /// Position the read started from.
    pub from_position: Position,

    /// Where the next read should start. Must be >= `from_position`, even
    /// when `events` is empty.
    pub next_position: Position,

    /// Events in the page, in position order. A zero-event page is *not*
    /// end of log: the requested range may hold events that are committed
    /// locally but not yet replicated, and thus not visible to readers.
    pub events: Vec<ResolvedEvent>,
}

/// Paginated forward reads over the log.
pub trait LogReader: Send + Sync {
    fn read_all_forward(
        &self,
        from: Position,
        max_count: usize,
        resolve_link_tos: bool,
    ) -> Result<AllEventsSlice, ReadError>;
}

/// Push callback for live events. Invoked from the backend's own execution
/// context, in arrival order.
pub type PushHandler = Arc<dyn Fn(ResolvedEvent) + Send + Sync>;

/// Invoked once when the backend terminates the feed.
pub type FeedDropHandler = Arc<dyn Fn(SubscribeError) + Send + Sync>;

/// An established live feed.
pub struct LiveSubscription {
    /// The confirmation position: what was live at subscribe time.
    pub last_position: Position,
    unsubscribe: Option<Box<dyn FnOnce() + Send>>,
}

impl LiveSubscription {
    pub fn new(last_position: Position, unsubscribe: impl FnOnce() + Send + 'static) -> Self {
        LiveSubscription {
            last_position,
            unsubscribe: Some(Box::new(unsubscribe)),
        }
    }

    /// Release the feed. Idempotent; also runs on drop.
    pub fn unsubscribe(&mut self) {
        if let Some(f) = self.unsubscribe.take() {
            f();
        }
    }
}

impl Drop for LiveSubscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

/// Live push feed over the log.
pub trait LiveBackend: Send + Sync {
    /// Establish the feed. Blocks until the backend confirms (which may take
    /// arbitrarily long); pushes begin arriving via `on_event` as soon as the
    /// feed opens, possibly before this returns.
    fn subscribe_to_all(
        &self,
        on_event: PushHandler,
        on_dropped: FeedDropHandler,
    ) -> Result<LiveSubscription, SubscribeError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_unsubscribe_runs_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let mut sub = LiveSubscription::new(Position::new(10, 10), move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        sub.unsubscribe();
        sub.unsubscribe();
        drop(sub);

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
