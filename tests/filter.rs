//! Replication checkpoint filter scenarios.

use crossbeam_channel::{unbounded, Receiver, Sender};
use proptest::prelude::*;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use waterline::{Checkpoint, CheckpointFilter, FilterWorker, InMemoryCheckpoint, Publisher};

fn filter_with_bus() -> (
    Arc<InMemoryCheckpoint>,
    CheckpointFilter<&'static str, Sender<&'static str>>,
    Receiver<&'static str>,
) {
    let chk = Arc::new(InMemoryCheckpoint::default());
    let (tx, rx) = unbounded();
    let filter = CheckpointFilter::new(chk.clone() as Arc<dyn Checkpoint>, tx);
    (chk, filter, rx)
}

fn drain(rx: &Receiver<&'static str>) -> Vec<&'static str> {
    rx.try_iter().collect()
}

// Checkpoint starts unset; commits at 1000 and 2000 arrive; the checkpoint
// reaches 2000 and a tick fires: exactly those two release, in order. A
// later commit at 3000 stays buffered.
#[test]
fn test_releases_up_to_checkpoint_in_order() {
    let (chk, mut filter, rx) = filter_with_bus();

    filter.on_event_committed("at-1000", 1000);
    filter.on_event_committed("at-2000", 2000);
    assert!(drain(&rx).is_empty());

    chk.write(2000);
    filter.on_tick();
    assert_eq!(drain(&rx), vec!["at-1000", "at-2000"]);

    filter.on_event_committed("at-3000", 3000);
    filter.on_tick();
    assert!(drain(&rx).is_empty());
    assert_eq!(filter.pending_len(), 1);
}

// The checkpoint reaches 3000 before the commit at 3000 arrives, with 1000
// and 2000 already buffered: the arrival itself reconciles and all three
// release in position order.
#[test]
fn test_checkpoint_ahead_of_commit_releases_on_arrival() {
    let (chk, mut filter, rx) = filter_with_bus();

    filter.on_event_committed("at-1000", 1000);
    filter.on_event_committed("at-2000", 2000);

    chk.write(3000);
    filter.on_event_committed("at-3000", 3000);

    assert_eq!(drain(&rx), vec!["at-1000", "at-2000", "at-3000"]);
    assert_eq!(filter.pending_len(), 0);
}

// The reconciliation skip check is equality against the last-seen value, not
// a directional comparison. After a regression, a message at a position the
// checkpoint already covers stays buffered until the value *changes* again.
#[test]
fn test_checkpoint_regression_parks_eligible_messages() {
    let (chk, mut filter, rx) = filter_with_bus();

    chk.write(2000);
    filter.on_event_committed("early", 1000);
    assert_eq!(drain(&rx), vec!["early"]);

    // Regression: reconciliation records 1500 and releases nothing.
    chk.write(1500);
    filter.on_tick();
    assert!(drain(&rx).is_empty());

    // 1200 <= 1500, but the cheap path sees an unchanged value and skips.
    filter.on_event_committed("parked", 1200);
    filter.on_tick();
    assert!(drain(&rx).is_empty());
    assert_eq!(filter.pending_len(), 1);

    // Any change to the value unparks it.
    chk.write(1600);
    filter.on_tick();
    assert_eq!(drain(&rx), vec!["parked"]);
}

#[test]
fn test_checkpoint_below_lowest_position_releases_nothing() {
    let (chk, mut filter, rx) = filter_with_bus();

    filter.on_event_committed("m", 5000);
    chk.write(4999);
    filter.on_tick();

    assert!(drain(&rx).is_empty());
    assert_eq!(filter.pending_len(), 1);
}

// End-to-end through the worker thread: release happens via the
// self-rescheduling tick, with no further commits arriving.
#[test]
fn test_worker_tick_releases_within_budget() {
    let chk = Arc::new(InMemoryCheckpoint::default());
    let (tx, rx) = unbounded::<&'static str>();
    let gate = FilterWorker::spawn(
        chk.clone() as Arc<dyn Checkpoint>,
        tx,
        Duration::from_millis(20),
    );

    gate.event_committed("gated", 1000);
    gate.event_committed("beyond", 3000);
    assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());

    chk.write(1000);
    assert_eq!(rx.recv_timeout(Duration::from_secs(2)).unwrap(), "gated");
    assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());
    assert_eq!(gate.pending_depth(), 1);

    gate.shutdown();
}

/// Records each published message with the checkpoint value in force at
/// publish time, for the safety property below.
struct RecordingPublisher {
    checkpoint: Arc<InMemoryCheckpoint>,
    log: Arc<Mutex<Vec<((i64, usize), i64)>>>,
}

impl Publisher<(i64, usize)> for RecordingPublisher {
    fn publish(&self, message: (i64, usize)) {
        self.log
            .lock()
            .unwrap()
            .push((message, self.checkpoint.read_non_flushed()));
    }
}

proptest! {
    // For all message sets and checkpoint sequences (including regressions):
    // nothing publishes before the checkpoint covers it; everything publishes
    // exactly once if the checkpoint eventually covers it; releases are in
    // position order with arrival order preserved within a position.
    #[test]
    fn prop_filter_safety_liveness_ordering(
        positions in proptest::collection::vec(1i64..10_000, 1..40),
        checkpoints in proptest::collection::vec(0i64..12_000, 0..20),
    ) {
        let chk = Arc::new(InMemoryCheckpoint::default());
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut filter = CheckpointFilter::new(
            chk.clone() as Arc<dyn Checkpoint>,
            RecordingPublisher { checkpoint: chk.clone(), log: log.clone() },
        );

        for (arrival, &pos) in positions.iter().enumerate() {
            filter.on_event_committed((pos, arrival), pos);
        }
        for &value in &checkpoints {
            chk.write(value);
            filter.on_tick();
        }
        // The replication protocol eventually advances past everything.
        let max = positions.iter().copied().max().unwrap_or(0);
        chk.write(max);
        filter.on_tick();
        chk.write(max + 1);
        filter.on_tick();

        let published = log.lock().unwrap();

        // Safety: position <= checkpoint in force at publish time.
        for &((pos, _), chk_at_publish) in published.iter() {
            prop_assert!(pos <= chk_at_publish);
        }

        // Liveness / exactly-once.
        prop_assert_eq!(published.len(), positions.len());
        let mut seen: Vec<usize> = published.iter().map(|&((_, arrival), _)| arrival).collect();
        seen.sort_unstable();
        prop_assert_eq!(seen, (0..positions.len()).collect::<Vec<_>>());

        // Ordering: positions never decrease across releases; equal
        // positions keep arrival order.
        for window in published.windows(2) {
            let ((p1, a1), _) = window[0];
            let ((p2, a2), _) = window[1];
            prop_assert!(p1 <= p2);
            if p1 == p2 {
                prop_assert!(a1 < a2);
            }
        }
    }
}
