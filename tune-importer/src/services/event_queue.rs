//! Event queue between producers and the batching dispatcher
//!
//! Any number of producers (worker jobs, the registry, the watch adapter)
//! push [`TrackEvent`]s through cloned [`EventQueue`] handles; the single
//! [`EventReceiver`] is owned by the dispatcher, which drains everything
//! queued so far on each tick. Every event is consumed exactly once.

use tokio::sync::mpsc::{self, error::TryRecvError};
use tracing::warn;
use tune_common::events::TrackEvent;

/// Producer handle, cheap to clone
#[derive(Debug, Clone)]
pub struct EventQueue {
    tx: mpsc::UnboundedSender<TrackEvent>,
}

/// Consumer side, owned by the dispatcher
#[derive(Debug)]
pub struct EventReceiver {
    rx: mpsc::UnboundedReceiver<TrackEvent>,
}

/// Create a connected queue/receiver pair
pub fn channel() -> (EventQueue, EventReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (EventQueue { tx }, EventReceiver { rx })
}

impl EventQueue {
    /// Enqueue an event
    ///
    /// Never blocks. If the dispatcher has already shut down the event is
    /// discarded.
    pub fn push(&self, event: TrackEvent) {
        if let Err(e) = self.tx.send(event) {
            warn!(kind = %e.0.kind, "Event queue closed, dropping event");
        }
    }
}

impl EventReceiver {
    /// Take every event queued so far, in queue order
    pub fn drain(&mut self) -> Vec<TrackEvent> {
        let mut batch = Vec::new();
        loop {
            match self.rx.try_recv() {
                Ok(event) => batch.push(event),
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
        batch
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tune_common::events::EventKind;

    #[test]
    fn test_drain_takes_everything_in_order() {
        let (queue, mut rx) = channel();
        queue.push(TrackEvent::removed("a"));
        queue.clone().push(TrackEvent::saved("b"));

        let batch = rx.drain();

        assert_eq!(batch.len(), 2);
        assert_eq!(batch[0].kind, EventKind::TrackRemoved);
        assert_eq!(batch[1].id(), Some("b"));
        assert!(rx.drain().is_empty());
    }

    #[test]
    fn test_push_after_receiver_dropped_is_harmless() {
        let (queue, rx) = channel();
        drop(rx);

        queue.push(TrackEvent::removed("a"));
    }
}
