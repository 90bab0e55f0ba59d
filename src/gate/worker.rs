//! Single-writer actor hosting a checkpoint filter.

use crate::checkpoint::Checkpoint;
use crate::gate::filter::{CheckpointFilter, Publisher};
use crossbeam_channel::{after, select, unbounded, Sender};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::debug;

enum Input<M> {
    Committed { message: M, commit_position: i64 },
    Shutdown,
}

/// Spawns [`GateHandle`]s: one owning thread per filter instance, so the
/// commit handler and the tick handler never execute concurrently.
pub struct FilterWorker;

impl FilterWorker {
    /// Spawn a filter on a dedicated thread.
    ///
    /// The thread reconciles on every incoming commit notification and on a
    /// tick re-armed with a fixed relative delay after each firing: ticks
    /// drift under load but are never lost. The loop runs until the handle is
    /// shut down or dropped.
    pub fn spawn<M, P>(
        checkpoint: Arc<dyn Checkpoint>,
        output: P,
        tick_interval: Duration,
    ) -> GateHandle<M>
    where
        M: Send + 'static,
        P: Publisher<M> + Send + 'static,
    {
        let (tx, rx) = unbounded::<Input<M>>();
        let mut filter = CheckpointFilter::new(checkpoint, output);
        let depth = filter.depth_gauge();

        let thread = thread::Builder::new()
            .name("replication-gate".into())
            .spawn(move || {
                let mut tick = after(tick_interval);
                loop {
                    select! {
                        recv(rx) -> input => {
                            match input {
                                Ok(Input::Committed { message, commit_position }) => {
                                    filter.on_event_committed(message, commit_position);
                                }
                                Ok(Input::Shutdown) | Err(_) => break,
                            }
                        }
                        recv(tick) -> _ => {
                            filter.on_tick();
                            // One-shot relative timer, re-armed per tick.
                            tick = after(tick_interval);
                        }
                    }
                }
                debug!("replication gate stopped");
            })
            .expect("failed to spawn replication-gate thread");

        GateHandle {
            input: tx,
            depth,
            thread: Some(thread),
        }
    }
}

/// Handle to a running filter thread.
pub struct GateHandle<M> {
    input: Sender<Input<M>>,
    depth: Arc<AtomicUsize>,
    thread: Option<JoinHandle<()>>,
}

impl<M> GateHandle<M> {
    /// Hand a commit notification to the filter. Fire-and-forget.
    pub fn event_committed(&self, message: M, commit_position: i64) {
        let _ = self.input.send(Input::Committed {
            message,
            commit_position,
        });
    }

    /// Messages currently gated behind the checkpoint.
    pub fn pending_depth(&self) -> usize {
        self.depth.load(Ordering::Relaxed)
    }

    /// Stop the filter thread and wait for it to exit.
    pub fn shutdown(mut self) {
        self.shutdown_inner();
    }

    fn shutdown_inner(&mut self) {
        let _ = self.input.send(Input::Shutdown);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl<M> Drop for GateHandle<M> {
    fn drop(&mut self) {
        self.shutdown_inner();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkpoint::InMemoryCheckpoint;

    #[test]
    fn test_tick_releases_without_new_commits() {
        let chk = Arc::new(InMemoryCheckpoint::default());
        let (tx, rx) = unbounded::<u32>();
        let gate = FilterWorker::spawn(
            chk.clone() as Arc<dyn Checkpoint>,
            tx,
            Duration::from_millis(10),
        );

        gate.event_committed(7, 500);
        assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());

        // Only the self-rescheduling tick can pick this up.
        chk.write(500);
        assert_eq!(rx.recv_timeout(Duration::from_secs(2)).unwrap(), 7);
        assert_eq!(gate.pending_depth(), 0);

        gate.shutdown();
    }
}
