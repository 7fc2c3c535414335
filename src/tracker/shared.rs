//! Thread-safe handle around a [`TaskMaster`].
//!
//! Every operation runs under one mutex, so each is atomic with respect to
//! the others. Domain events queued by an operation are drained and
//! forwarded to the dispatcher channel before the lock is released, so the
//! dispatcher sees them in `sequence` order.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc::UnboundedSender;

use super::TaskMaster;
use crate::events::EventEnvelope;

#[derive(Clone)]
pub struct SharedTaskMaster {
    inner: Arc<Mutex<TaskMaster>>,
    events: Option<UnboundedSender<EventEnvelope>>,
}

impl SharedTaskMaster {
    /// Wrap a tracker. Events are discarded until a sender is attached.
    pub fn new(tracker: TaskMaster) -> Self {
        Self {
            inner: Arc::new(Mutex::new(tracker)),
            events: None,
        }
    }

    /// Forward drained events to `sender`.
    pub fn with_event_sender(mut self, sender: UnboundedSender<EventEnvelope>) -> Self {
        self.events = Some(sender);
        self
    }

    /// Run `op` with exclusive access to the tracker.
    pub fn with<R>(&self, op: impl FnOnce(&mut TaskMaster) -> R) -> R {
        let mut tracker = self.inner.lock();
        let result = op(&mut tracker);
        let drained = tracker.drain_events();
        if drained.is_empty() {
            return result;
        }

        // Sending under the lock keeps envelopes in `sequence` order across
        // callers. An unbounded send never blocks.
        match &self.events {
            Some(sender) => {
                for envelope in drained {
                    if sender.send(envelope).is_err() {
                        log::warn!("Event dispatcher has shut down; dropping remaining events");
                        break;
                    }
                }
            }
            None => log::trace!("Discarding {} events with no dispatcher attached", drained.len()),
        }
        result
    }

    /// Run a read-only `op` against the tracker.
    pub fn read<R>(&self, op: impl FnOnce(&TaskMaster) -> R) -> R {
        let tracker = self.inner.lock();
        op(&tracker)
    }
}

impl Default for SharedTaskMaster {
    fn default() -> Self {
        Self::new(TaskMaster::new())
    }
}

impl std::fmt::Debug for SharedTaskMaster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedTaskMaster")
            .field("dispatching", &self.events.is_some())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::tracker::{PlanResponse, Priority, TaskSpec};

    fn plan(shared: &SharedTaskMaster) -> String {
        shared
            .with(|tm| {
                tm.request_planning(
                    "Ship it",
                    vec![TaskSpec::new("T1", "D1")],
                    None,
                    Some(Priority::High),
                    None,
                )
            })
            .map(|PlanResponse::Planned { request_id, .. }| request_id)
            .unwrap()
    }

    #[tokio::test]
    async fn test_events_forwarded_in_order() {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let shared = SharedTaskMaster::default().with_event_sender(tx);

        let request_id = plan(&shared);
        shared.with(|tm| tm.get_next_task(&request_id)).unwrap();

        let first = rx.recv().await.unwrap();
        let second = rx.recv().await.unwrap();
        assert_eq!(first.event.name(), "request_planned");
        assert_eq!(second.event.name(), "task_started");
        assert!(first.sequence < second.sequence);
        assert_eq!(second.request_id, request_id);
    }

    #[test]
    fn test_events_dropped_without_sender() {
        let shared = SharedTaskMaster::default();
        let request_id = plan(&shared);
        assert_eq!(shared.read(|tm| tm.list_requests().total_requests), 1);
        assert!(shared.read(|tm| tm.request(&request_id).is_some()));
    }

    #[test]
    fn test_clones_share_state() {
        let shared = SharedTaskMaster::default();
        let other = shared.clone();
        plan(&shared);
        assert_eq!(other.read(|tm| tm.list_requests().total_requests), 1);
    }

    #[test]
    fn test_concurrent_next_task_never_double_assigns() {
        let shared = SharedTaskMaster::default();
        let request_id = shared
            .with(|tm| {
                tm.request_planning(
                    "parallel",
                    (0..8).map(|i| TaskSpec::new(format!("T{i}"), "D")).collect(),
                    None,
                    None,
                    None,
                )
            })
            .map(|PlanResponse::Planned { request_id, .. }| request_id)
            .unwrap();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let shared = shared.clone();
                let request_id = request_id.clone();
                std::thread::spawn(move || {
                    match shared.with(|tm| tm.get_next_task(&request_id)).unwrap() {
                        crate::tracker::NextTaskResponse::NextTask { task, .. } => task.id,
                        other => panic!("expected next_task, got {other:?}"),
                    }
                })
            })
            .collect();

        let mut ids: Vec<String> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), 8);
    }

    #[test]
    fn test_concurrent_callers_deliver_in_sequence_order() {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let shared = SharedTaskMaster::default().with_event_sender(tx);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let shared = shared.clone();
                std::thread::spawn(move || {
                    for _ in 0..10 {
                        let request_id = plan(&shared);
                        shared.with(|tm| tm.get_next_task(&request_id)).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let mut sequences = Vec::new();
        while let Ok(envelope) = rx.try_recv() {
            sequences.push(envelope.sequence);
        }
        assert_eq!(sequences.len(), 160);
        assert!(sequences.windows(2).all(|pair| pair[0] < pair[1]));
    }
}
