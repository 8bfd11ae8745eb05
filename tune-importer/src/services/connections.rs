//! Connected client sessions
//!
//! Each session is represented by the sending half of its outbound message
//! channel; the session's socket task drains the other half. Sends never
//! block, so one slow client cannot hold up the dispatcher or other clients.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use tune_common::events::group_events;
use uuid::Uuid;

use crate::services::registry::TrackRegistry;

/// Outbound half of a session's message channel
pub type SessionSender = mpsc::UnboundedSender<String>;

/// Registry of open client sessions
pub struct ConnectionRegistry {
    sessions: Mutex<HashMap<Uuid, SessionSender>>,
    registry: Arc<TrackRegistry>,
}

impl fmt::Debug for ConnectionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionRegistry")
            .field("session_count", &self.len())
            .finish()
    }
}

impl ConnectionRegistry {
    pub fn new(registry: Arc<TrackRegistry>) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            registry,
        }
    }

    fn sessions(&self) -> MutexGuard<'_, HashMap<Uuid, SessionSender>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a session and replay the current state to it
    ///
    /// The replay is written to the session's channel before the session
    /// becomes visible to [`broadcast`](Self::broadcast), so it always
    /// precedes the first batch the session receives.
    pub fn join(&self, tx: SessionSender) -> Uuid {
        let id = Uuid::new_v4();
        let mut sessions = self.sessions();

        let snapshot = self.registry.snapshot();
        let replay = group_events(snapshot.events(self.registry.import_root()));
        for batch in replay {
            match batch.to_json() {
                Ok(text) => {
                    if tx.send(text).is_err() {
                        debug!(session = %id, "Session closed during replay");
                        return id;
                    }
                }
                Err(e) => warn!(session = %id, "Failed to serialize replay: {}", e),
            }
        }

        sessions.insert(id, tx);
        info!(
            session = %id,
            tracks = snapshot.tracks.len(),
            processing = snapshot.processing.len(),
            "Client connected"
        );
        id
    }

    /// Deregister a session; unknown ids are ignored
    pub fn leave(&self, id: Uuid) {
        if self.sessions().remove(&id).is_some() {
            info!(session = %id, "Client disconnected");
        }
    }

    /// Send `text` to every session, dropping sessions whose channel closed
    pub fn broadcast(&self, text: &str) {
        self.sessions().retain(|id, tx| match tx.send(text.to_string()) {
            Ok(()) => true,
            Err(_) => {
                debug!(session = %id, "Dropping closed session");
                false
            }
        });
    }

    pub fn len(&self) -> usize {
        self.sessions().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{TrackRecord, TrackTags};
    use crate::services::event_queue;
    use serde_json::Value;
    use std::path::PathBuf;
    use tune_common::events::TrackProcess;

    fn connections() -> (ConnectionRegistry, Arc<TrackRegistry>) {
        let (queue, _rx) = event_queue::channel();
        let registry = Arc::new(TrackRegistry::new(PathBuf::from("/import"), queue));
        (ConnectionRegistry::new(Arc::clone(&registry)), registry)
    }

    #[test]
    fn test_join_replays_state() {
        let (connections, registry) = connections();
        let record = TrackRecord::new(
            PathBuf::from("/import/a.mp3"),
            TrackTags::default(),
            Vec::new(),
        );
        registry.publish(record.clone());
        registry.add_processing(&record.id, TrackProcess::KeyComputing);

        let (tx, mut rx) = mpsc::unbounded_channel();
        connections.join(tx);

        let first: Value = serde_json::from_str(&rx.try_recv().unwrap()).unwrap();
        let second: Value = serde_json::from_str(&rx.try_recv().unwrap()).unwrap();
        assert_eq!(first["type"], "TRACK_DETAILS");
        assert_eq!(first["items"][0]["id"], record.id.as_str());
        assert_eq!(second["type"], "TRACK_PROCESSING");
        assert_eq!(second["items"][0]["process"], "KEY_COMPUTING");
        assert!(rx.try_recv().is_err());
        assert_eq!(connections.len(), 1);
    }

    #[test]
    fn test_join_empty_registry_sends_nothing() {
        let (connections, _registry) = connections();
        let (tx, mut rx) = mpsc::unbounded_channel();

        connections.join(tx);

        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_broadcast_drops_closed_sessions() {
        let (connections, _registry) = connections();
        let (tx_a, mut rx_a) = mpsc::unbounded_channel();
        let (tx_b, rx_b) = mpsc::unbounded_channel();
        connections.join(tx_a);
        connections.join(tx_b);
        drop(rx_b);

        connections.broadcast("hello");

        assert_eq!(rx_a.try_recv().unwrap(), "hello");
        assert_eq!(connections.len(), 1);
    }

    #[test]
    fn test_leave_is_idempotent() {
        let (connections, _registry) = connections();
        let (tx, _rx) = mpsc::unbounded_channel();
        let id = connections.join(tx);

        connections.leave(id);
        connections.leave(id);

        assert!(connections.is_empty());
    }
}
