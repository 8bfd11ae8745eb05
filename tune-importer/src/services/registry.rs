//! Track registry
//!
//! Authoritative in-memory state of the import directory: known tracks,
//! cached artwork, in-flight processing entries and the identifiers whose
//! disappearance the importer caused itself.
//!
//! Every public operation is one critical section. Operations that change
//! client-visible state push the matching event while still holding the
//! lock, so the order of events for one track always matches the order of
//! its state changes and a snapshot never observes half of a compound
//! operation.

use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::debug;
use tune_common::events::{EventItem, TrackEvent, TrackProcess};
use tune_common::{Error, Result};

use crate::models::{Artwork, TrackRecord, TrackTags};
use crate::services::event_queue::EventQueue;
use crate::services::identity::TrackId;

/// Outcome of [`TrackRegistry::remove_track`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Removal {
    /// Identifier was not known, nothing changed
    Unknown,
    /// Record removed and `TRACK_REMOVED` emitted
    Reported,
    /// Record removed silently, consuming an expected-removal marker
    Suppressed,
}

#[derive(Debug, Default)]
struct RegistryState {
    tracks: HashMap<TrackId, TrackRecord>,
    artwork: HashMap<String, Artwork>,
    /// In-flight stages; a list, callers add and complete in matched pairs
    processing: Vec<(TrackId, TrackProcess)>,
    expect_removed: Vec<TrackId>,
}

/// Point-in-time copy of the registry
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub tracks: Vec<TrackRecord>,
    pub processing: Vec<(TrackId, TrackProcess)>,
}

/// JSON form of a snapshot
#[derive(Debug, Serialize)]
pub struct SnapshotView {
    pub tracks: Vec<EventItem>,
    pub processing: Vec<ProcessingView>,
}

#[derive(Debug, Serialize)]
pub struct ProcessingView {
    pub id: TrackId,
    pub process: TrackProcess,
}

impl Snapshot {
    /// Replay events: one `TRACK_DETAILS` per record, then one
    /// `TRACK_PROCESSING` per in-flight entry
    pub fn events(&self, import_root: &Path) -> Vec<TrackEvent> {
        let details = self
            .tracks
            .iter()
            .map(|record| TrackEvent::details(record.id.as_str(), record.details(import_root)));
        let processing = self
            .processing
            .iter()
            .map(|(id, process)| TrackEvent::processing(id.as_str(), *process));

        details.chain(processing).collect()
    }

    pub fn view(&self, import_root: &Path) -> SnapshotView {
        SnapshotView {
            tracks: self.tracks.iter().map(|r| r.details(import_root)).collect(),
            processing: self
                .processing
                .iter()
                .map(|(id, process)| ProcessingView {
                    id: id.clone(),
                    process: *process,
                })
                .collect(),
        }
    }
}

/// Shared, internally synchronized track registry
#[derive(Debug)]
pub struct TrackRegistry {
    state: Mutex<RegistryState>,
    events: EventQueue,
    import_root: PathBuf,
}

impl TrackRegistry {
    pub fn new(import_root: PathBuf, events: EventQueue) -> Self {
        Self {
            state: Mutex::new(RegistryState::default()),
            events,
            import_root,
        }
    }

    /// Root that reported paths are relative to
    pub fn import_root(&self) -> &Path {
        &self.import_root
    }

    fn lock(&self) -> MutexGuard<'_, RegistryState> {
        // State stays consistent across a panicking holder: every mutation
        // below completes before anything that could panic.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert or replace a record, cache its artwork and emit `TRACK_DETAILS`
    pub fn publish(&self, record: TrackRecord) {
        let mut state = self.lock();
        let details = record.details(&self.import_root);
        for art in &record.artwork {
            state.artwork.insert(art.key.clone(), art.clone());
        }
        self.events.push(TrackEvent::details(record.id.as_str(), details));
        state.tracks.insert(record.id.clone(), record);
    }

    /// Replace a record's tags and artwork with a client save
    ///
    /// Stage results merged before this call are overwritten by the save,
    /// ones merged after it land on top. The new artwork is cached. Returns
    /// the updated record, or `None` if the identifier is unknown.
    pub fn apply_save(
        &self,
        id: &TrackId,
        tags: TrackTags,
        artwork: Vec<Artwork>,
    ) -> Option<TrackRecord> {
        let mut guard = self.lock();
        let state = &mut *guard;
        let record = state.tracks.get_mut(id)?;
        for art in &artwork {
            state.artwork.insert(art.key.clone(), art.clone());
        }
        record.tags = tags;
        record.artwork = artwork;
        Some(record.clone())
    }

    /// Point a record at the file it was moved to
    ///
    /// Returns false if the record was removed in the meantime.
    pub fn relocate(&self, id: &TrackId, path: PathBuf) -> bool {
        match self.lock().tracks.get_mut(id) {
            Some(record) => {
                record.path = path;
                true
            }
            None => false,
        }
    }

    pub fn get(&self, id: &TrackId) -> Option<TrackRecord> {
        self.lock().tracks.get(id).cloned()
    }

    pub fn contains(&self, id: &TrackId) -> bool {
        self.lock().tracks.contains_key(id)
    }

    /// Number of known tracks
    pub fn len(&self) -> usize {
        self.lock().tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove a record and evict its artwork
    ///
    /// Artwork is evicted by key even if another record references the same
    /// image. A pending expected-removal marker for `id` is consumed instead
    /// of emitting `TRACK_REMOVED`.
    pub fn remove_track(&self, id: &TrackId) -> Removal {
        let mut state = self.lock();
        let Some(record) = state.tracks.remove(id) else {
            return Removal::Unknown;
        };

        for art in &record.artwork {
            state.artwork.remove(&art.key);
        }

        if let Some(pos) = state.expect_removed.iter().position(|e| e == id) {
            state.expect_removed.remove(pos);
            debug!(id = %id, "Suppressed removal of migrated track");
            Removal::Suppressed
        } else {
            self.events.push(TrackEvent::removed(id.as_str()));
            Removal::Reported
        }
    }

    /// Mark `id` as about to disappear because of the importer's own action
    pub fn expect_removal(&self, id: TrackId) {
        self.lock().expect_removed.push(id);
    }

    pub fn is_expected_removal(&self, id: &TrackId) -> bool {
        self.lock().expect_removed.contains(id)
    }

    /// Record that `process` started for `id` and emit `TRACK_PROCESSING`
    pub fn add_processing(&self, id: &TrackId, process: TrackProcess) {
        let mut state = self.lock();
        state.processing.push((id.clone(), process));
        self.events.push(TrackEvent::processing(id.as_str(), process));
    }

    /// Record that `process` finished for `id` with `fields` as its result
    ///
    /// Removes exactly one matching entry, merges `fields` into the record's
    /// tags if the record is known, and emits `TRACK_UPDATE`. Completing a
    /// stage that was never started is an error.
    pub fn complete_processing(
        &self,
        id: &TrackId,
        process: TrackProcess,
        fields: EventItem,
    ) -> Result<()> {
        let mut state = self.lock();
        let pos = state
            .processing
            .iter()
            .position(|(pid, p)| pid == id && *p == process)
            .ok_or_else(|| {
                Error::Internal(format!("No {} entry in progress for track {}", process, id))
            })?;
        state.processing.remove(pos);

        if let Some(record) = state.tracks.get_mut(id) {
            record.tags.merge(&fields);
        }

        self.events.push(TrackEvent::update(id.as_str(), process, fields));
        Ok(())
    }

    /// Number of in-flight processing entries
    pub fn processing_count(&self) -> usize {
        self.lock().processing.len()
    }

    pub fn cached_artwork(&self, key: &str) -> Option<Artwork> {
        self.lock().artwork.get(key).cloned()
    }

    pub fn cache_artwork(&self, artwork: &[Artwork]) {
        let mut state = self.lock();
        for art in artwork {
            state.artwork.insert(art.key.clone(), art.clone());
        }
    }

    /// Emit `TRACK_SAVED`
    pub fn emit_saved(&self, id: &TrackId) {
        let _state = self.lock();
        self.events.push(TrackEvent::saved(id.as_str()));
    }

    /// Consistent copy of every record and every processing entry
    pub fn snapshot(&self) -> Snapshot {
        let state = self.lock();
        Snapshot {
            tracks: state.tracks.values().cloned().collect(),
            processing: state.processing.clone(),
        }
    }
}
