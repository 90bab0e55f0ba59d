//! Catch-up subscriptions over the replicated log.
//!
//! A catch-up subscription starts at an arbitrary position, replays all
//! historical (replicated) events via forward reads, and hands off to a live
//! push feed with no gap and no duplicate. The hard case is the log tail:
//! events that exist locally but are not yet replicated make forward reads
//! return empty pages even though the position counter keeps moving, so an
//! empty page must never be treated as end of log.
//!
//! # Example
//!
//! ```ignore
//! let handlers = SubscriptionHandlers::new(Arc::new(|event| {
//!     println!("got {} at {}", event.original_event_number(), event.original_position());
//!     Ok(())
//! }))
//! .with_on_live(|| println!("live!"))
//! .with_on_dropped(|reason, cause| println!("dropped: {:?} {:?}", reason, cause));
//!
//! let sub = CatchUpSubscription::start(reader, backend, None, CatchUpSettings::default(), handlers);
//! // ... later
//! sub.stop();
//! ```

mod backend;
mod catchup;
mod types;

pub use backend::{AllEventsSlice, FeedDropHandler, LiveBackend, LiveSubscription, LogReader, PushHandler};
pub use catchup::{CatchUpSubscription, Phase};
pub use types::{
    CatchUpSettings, DropReason, DroppedHandler, EventHandler, LiveHandler, RetryPolicy,
    SubscriptionHandlers,
};
