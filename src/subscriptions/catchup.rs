//! Catch-up subscription: replay history from a position, then hand off to
//! the live feed with no gap and no duplicate.
//!
//! The read loop runs on a dedicated worker thread with at most one read in
//! flight; the live feed is opened exactly once, concurrently, and pushes
//! buffer until the handoff completes. Position is the sole ordering key,
//! and reads are the single source of truth for advancing the delivered
//! watermark, so the live feed can never reorder relative to history.

use crate::error::{ReadError, SubscribeError};
use crate::subscriptions::backend::{
    AllEventsSlice, FeedDropHandler, LiveBackend, LiveSubscription, LogReader, PushHandler,
};
use crate::subscriptions::types::{
    CatchUpSettings, DropReason, DroppedHandler, EventHandler, LiveHandler, RetryPolicy,
    SubscriptionHandlers,
};
use crate::types::{Position, ResolvedEvent};
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Subscription lifecycle phase.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    /// Replaying history via forward reads.
    Reading,
    /// Reads can make no further progress and the live feed has not yet
    /// reported its confirmation position.
    AwaitingLiveConfirmation,
    /// Delivering buffered live events not covered by reads.
    Draining,
    /// Delivering directly from the live feed.
    Live,
    /// Terminal.
    Dropped,
}

/// State shared between the read loop and the live-push callback. Phase
/// transitions must be observed consistently by both, so everything lives
/// behind one mutex.
struct Shared {
    phase: Phase,
    /// Highest position delivered to the handler; deliveries must exceed it.
    last_delivered: Option<Position>,
    /// Pushes received before the handoff completes.
    live_buffer: VecDeque<ResolvedEvent>,
    /// The live feed's subscribe-time position, once reported.
    confirmation: Option<Position>,
}

/// A subscription that replays history from a start position and then
/// continues with live events, transparently to the consumer.
///
/// Created with [`CatchUpSubscription::start`]; terminated by
/// [`CatchUpSubscription::stop`], by any fatal error, or by the backend
/// dropping the feed. The dropped callback fires exactly once either way.
pub struct CatchUpSubscription {
    state: Mutex<Shared>,
    /// Wakes the read loop when the confirmation (or a drop) arrives.
    confirmed: Condvar,
    /// First drop trigger wins; everything after is a no-op.
    dropped: AtomicBool,
    start_from: Option<Position>,
    settings: CatchUpSettings,
    on_event: EventHandler,
    on_live: Mutex<Option<LiveHandler>>,
    on_dropped: Mutex<Option<DroppedHandler>>,
    feed: Mutex<Option<LiveSubscription>>,
}

impl CatchUpSubscription {
    /// Start a subscription from `from` (`None` = beginning of log).
    ///
    /// Events strictly after `from` are delivered; an event at exactly
    /// `from` is considered already seen by the caller.
    pub fn start(
        reader: Arc<dyn LogReader>,
        backend: Arc<dyn LiveBackend>,
        from: Option<Position>,
        settings: CatchUpSettings,
        handlers: SubscriptionHandlers,
    ) -> Arc<CatchUpSubscription> {
        let sub = Arc::new(CatchUpSubscription {
            state: Mutex::new(Shared {
                phase: Phase::Reading,
                last_delivered: from,
                live_buffer: VecDeque::new(),
                confirmation: None,
            }),
            confirmed: Condvar::new(),
            dropped: AtomicBool::new(false),
            start_from: from,
            settings,
            on_event: handlers.on_event,
            on_live: Mutex::new(Some(handlers.on_live)),
            on_dropped: Mutex::new(Some(handlers.on_dropped)),
            feed: Mutex::new(None),
        });

        // Open the live feed exactly once, concurrently with the read loop.
        {
            let sub = Arc::clone(&sub);
            thread::Builder::new()
                .name("catchup-live-feed".into())
                .spawn(move || sub.open_live_feed(backend))
                .expect("failed to spawn catchup-live-feed thread");
        }
        {
            let sub = Arc::clone(&sub);
            thread::Builder::new()
                .name("catchup-reader".into())
                .spawn(move || sub.run_read_loop(reader))
                .expect("failed to spawn catchup-reader thread");
        }

        sub
    }

    /// Stop the subscription. Safe from any thread, idempotent: the first
    /// call wins and fires the dropped callback; later calls no-op.
    pub fn stop(&self) {
        self.drop_with(DropReason::UserInitiated, None);
    }

    pub fn phase(&self) -> Phase {
        self.state.lock().phase
    }

    pub fn is_live(&self) -> bool {
        self.phase() == Phase::Live
    }

    pub fn is_dropped(&self) -> bool {
        self.dropped.load(Ordering::SeqCst)
    }

    /// Highest position delivered to the handler so far.
    pub fn last_delivered(&self) -> Option<Position> {
        self.state.lock().last_delivered
    }

    /// Live events buffered awaiting handoff. Observability signal: grows
    /// unboundedly up to the configured limit if catch-up never completes.
    pub fn live_buffer_len(&self) -> usize {
        self.state.lock().live_buffer.len()
    }

    // --- live feed ---

    fn open_live_feed(self: &Arc<Self>, backend: Arc<dyn LiveBackend>) {
        let on_event: PushHandler = {
            let weak = Arc::downgrade(self);
            Arc::new(move |event| {
                if let Some(sub) = weak.upgrade() {
                    sub.on_pushed(event);
                }
            })
        };
        let on_dropped: FeedDropHandler = {
            let weak = Arc::downgrade(self);
            Arc::new(move |err| {
                if let Some(sub) = weak.upgrade() {
                    sub.drop_with(reason_for(&err), Some(err));
                }
            })
        };

        match backend.subscribe_to_all(on_event, on_dropped) {
            Ok(live) => {
                let confirmation = live.last_position;
                *self.feed.lock() = Some(live);
                {
                    let mut st = self.state.lock();
                    st.confirmation = Some(confirmation);
                }
                self.confirmed.notify_all();
                debug!(%confirmation, "live feed confirmed");

                // Dropped while subscribing: release the feed now.
                if self.dropped.load(Ordering::SeqCst) {
                    let live = self.feed.lock().take();
                    if let Some(mut live) = live {
                        live.unsubscribe();
                    }
                }
            }
            Err(err) => {
                let reason = reason_for(&err);
                self.drop_with(reason, Some(err));
            }
        }
    }

    fn on_pushed(&self, event: ResolvedEvent) {
        let mut st = self.state.lock();
        match st.phase {
            Phase::Reading | Phase::AwaitingLiveConfirmation | Phase::Draining => {
                st.live_buffer.push_back(event);
                if st.live_buffer.len() > self.settings.max_live_queue_len {
                    let len = st.live_buffer.len();
                    drop(st);
                    warn!(len, "live buffer exceeded its bound before handoff");
                    self.drop_with(DropReason::LiveBufferOverflow, None);
                }
            }
            Phase::Live => {
                let position = event.original_position();
                // The watermark still guards against a push racing the tail
                // of the drain.
                if st.last_delivered.map_or(true, |p| position > p) {
                    st.last_delivered = Some(position);
                    drop(st);
                    if let Err(err) = (self.on_event)(&event) {
                        self.drop_with(DropReason::HandlerFailure, Some(err.into()));
                    }
                }
            }
            Phase::Dropped => {}
        }
    }

    // --- read loop ---

    fn run_read_loop(self: &Arc<Self>, reader: Arc<dyn LogReader>) {
        let mut cursor = self.start_from.unwrap_or(Position::START);
        let mut empty_pages = 0usize;

        loop {
            // Caught up once the cursor has reached the confirmation
            // position. An empty page never terminates the loop by itself.
            {
                let st = self.state.lock();
                if st.phase == Phase::Dropped {
                    return;
                }
                if let Some(confirmation) = st.confirmation {
                    if cursor >= confirmation {
                        break;
                    }
                }
            }

            let slice = match self.read_with_retry(&*reader, cursor) {
                Ok(slice) => slice,
                Err(err) => {
                    self.drop_with(DropReason::ReadFailure, Some(err.into()));
                    return;
                }
            };

            for event in &slice.events {
                if !self.deliver(event) {
                    return;
                }
            }

            if slice.events.is_empty() && slice.next_position == slice.from_position {
                // Zero progress: the tail beyond the cursor is not visible
                // yet, or we are at the true end of the log.
                empty_pages += 1;
                if let Some(max) = self.settings.max_empty_pages {
                    if empty_pages > max {
                        warn!(empty_pages, "empty-page tolerance exhausted");
                        self.drop_with(
                            DropReason::ReadFailure,
                            Some(
                                ReadError::Unavailable(format!(
                                    "no progress after {} empty reads at {}",
                                    empty_pages, cursor
                                ))
                                .into(),
                            ),
                        );
                        return;
                    }
                }
                if !self.await_confirmation_if_needed() {
                    return;
                }
                // Still short of the confirmation: replication has to catch
                // up before the next page becomes visible. Don't spin.
                thread::sleep(Duration::from_millis(1));
            } else {
                empty_pages = 0;
            }

            cursor = cursor.max(slice.next_position);
        }

        self.hand_off();
    }

    /// Blocks until the live feed reports its confirmation position, if it
    /// has not already. Returns false if the subscription dropped meanwhile.
    fn await_confirmation_if_needed(&self) -> bool {
        let mut st = self.state.lock();
        if st.confirmation.is_some() || st.phase != Phase::Reading {
            return st.phase != Phase::Dropped;
        }

        st.phase = Phase::AwaitingLiveConfirmation;
        debug!("reads exhausted; awaiting live confirmation");
        while st.confirmation.is_none() && st.phase == Phase::AwaitingLiveConfirmation {
            self.confirmed.wait(&mut st);
        }
        if st.phase == Phase::Dropped {
            return false;
        }
        st.phase = Phase::Reading;
        true
    }

    fn read_with_retry(
        &self,
        reader: &dyn LogReader,
        from: Position,
    ) -> Result<AllEventsSlice, ReadError> {
        let mut attempt = 0u32;
        loop {
            if self.dropped.load(Ordering::SeqCst) {
                return Err(ReadError::Unavailable("subscription dropped".into()));
            }

            match reader.read_all_forward(
                from,
                self.settings.read_batch_size,
                self.settings.resolve_link_tos,
            ) {
                Ok(slice) => return Ok(slice),
                Err(err) => {
                    attempt += 1;
                    if let RetryPolicy::Limited(max) = self.settings.read_retry {
                        if attempt > max {
                            return Err(err);
                        }
                    }
                    warn!(attempt, error = %err, "forward read failed; retrying");
                }
            }
        }
    }

    /// Deliver one read event, watermark-guarded. Returns false if the
    /// subscription is (or becomes) dropped.
    fn deliver(&self, event: &ResolvedEvent) -> bool {
        let position = event.original_position();
        {
            let mut st = self.state.lock();
            if st.phase == Phase::Dropped {
                return false;
            }
            if st.last_delivered.map_or(false, |p| position <= p) {
                // Overlapping page; already delivered.
                return true;
            }
            st.last_delivered = Some(position);
        }
        if let Err(err) = (self.on_event)(event) {
            self.drop_with(DropReason::HandlerFailure, Some(err.into()));
            return false;
        }
        true
    }

    // --- handoff ---

    fn hand_off(&self) {
        {
            let mut st = self.state.lock();
            if st.phase == Phase::Dropped {
                return;
            }
            st.phase = Phase::Draining;
            debug!(
                buffered = st.live_buffer.len(),
                watermark = ?st.last_delivered,
                "catch-up reads complete; draining live buffer"
            );
        }

        if !self.drain_live_buffer(false) {
            return;
        }
        // Fire on_live before the phase flips so no directly-delivered push
        // can precede it; pushes arriving during the callback keep buffering.
        let on_live = self.on_live.lock().take();
        if let Some(on_live) = on_live {
            on_live();
        }
        if !self.drain_live_buffer(true) {
            return;
        }
        info!("live processing started");
    }

    /// Deliver buffered pushes above the watermark, in arrival order,
    /// without holding the lock during delivery. With `go_live`, flips the
    /// phase to Live under the same lock that observes the buffer empty, so
    /// no concurrent push can strand an event in the buffer. Returns false
    /// if the subscription dropped on the way.
    fn drain_live_buffer(&self, go_live: bool) -> bool {
        loop {
            let next = {
                let mut st = self.state.lock();
                if st.phase == Phase::Dropped {
                    return false;
                }
                loop {
                    match st.live_buffer.pop_front() {
                        Some(event) => {
                            let position = event.original_position();
                            if st.last_delivered.map_or(true, |p| position > p) {
                                st.last_delivered = Some(position);
                                break Some(event);
                            }
                            // Superseded: already covered by reads.
                        }
                        None => {
                            if go_live {
                                st.phase = Phase::Live;
                            }
                            break None;
                        }
                    }
                }
            };
            match next {
                Some(event) => {
                    if let Err(err) = (self.on_event)(&event) {
                        self.drop_with(DropReason::HandlerFailure, Some(err.into()));
                        return false;
                    }
                }
                None => return true,
            }
        }
    }

    // --- termination ---

    fn drop_with(&self, reason: DropReason, cause: Option<SubscribeError>) {
        if self.dropped.swap(true, Ordering::SeqCst) {
            return;
        }

        {
            let mut st = self.state.lock();
            st.phase = Phase::Dropped;
            st.live_buffer.clear();
        }
        self.confirmed.notify_all();

        let live = self.feed.lock().take();
        if let Some(mut live) = live {
            live.unsubscribe();
        }

        info!(?reason, "subscription dropped");
        let on_dropped = self.on_dropped.lock().take();
        if let Some(on_dropped) = on_dropped {
            on_dropped(reason, cause);
        }
    }
}

fn reason_for(err: &SubscribeError) -> DropReason {
    match err {
        SubscribeError::Refused(_) | SubscribeError::ServerClosed(_) => DropReason::ServerError,
        SubscribeError::ConnectionClosed => DropReason::ConnectionClosed,
        SubscribeError::Read(_) => DropReason::ReadFailure,
        SubscribeError::Handler(_) => DropReason::HandlerFailure,
    }
}
