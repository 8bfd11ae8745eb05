//! Batching event dispatcher
//!
//! Wakes every batch period, drains the event queue, groups the drained
//! events by kind and broadcasts one `{type, items}` message per kind to
//! every connected client. Batches drained while no client is connected are
//! discarded.

use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use tune_common::events::group_events;

use crate::services::connections::ConnectionRegistry;
use crate::services::event_queue::EventReceiver;

/// Default batch period
pub const DEFAULT_BATCH_PERIOD: Duration = Duration::from_millis(300);

/// Result of one flush
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushOutcome {
    /// Queue was empty
    Idle,
    /// Events were drained but nobody was listening
    Dropped(usize),
    /// Events were sent as this many grouped messages
    Sent { events: usize, messages: usize },
}

pub struct Dispatcher {
    events: EventReceiver,
    connections: Arc<ConnectionRegistry>,
    period: Duration,
}

impl Dispatcher {
    pub fn new(events: EventReceiver, connections: Arc<ConnectionRegistry>, period: Duration) -> Self {
        Self {
            events,
            connections,
            period,
        }
    }

    /// Drain the queue once and deliver what was found
    pub fn flush(&mut self) -> FlushOutcome {
        let batch = self.events.drain();
        if batch.is_empty() {
            return FlushOutcome::Idle;
        }

        let count = batch.len();
        if self.connections.is_empty() {
            debug!(events = count, "No clients connected, dropping batch");
            return FlushOutcome::Dropped(count);
        }

        let mut messages = 0;
        for group in group_events(batch) {
            match group.to_json() {
                Ok(text) => {
                    self.connections.broadcast(&text);
                    messages += 1;
                }
                Err(e) => warn!(kind = %group.kind, "Failed to serialize batch: {}", e),
            }
        }

        debug!(events = count, messages, "Dispatched batch");
        FlushOutcome::Sent {
            events: count,
            messages,
        }
    }

    /// Flush every period until `shutdown` is cancelled
    pub async fn run(mut self, shutdown: CancellationToken) {
        info!("Dispatcher started, batch period {}ms", self.period.as_millis());

        let mut ticker = interval_at(Instant::now() + self.period, self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    self.flush();
                }
            }
        }

        info!("Dispatcher stopped");
    }
}
