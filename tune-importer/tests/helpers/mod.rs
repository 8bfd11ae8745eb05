//! Shared fixtures for tune-importer integration tests
//!
//! The external collaborators are replaced by in-process fakes:
//! - [`JsonTagStore`] keeps a track's tags as JSON in the audio file itself,
//!   so tags travel with the file when it is moved
//! - [`FixedKeyEstimator`] always answers the same key
//! - [`RecordingConverter`] writes `<stem>.aif` and removes the source
//! - [`FakeLookup`] identifies Beatport-named files and answers fixed fields

#![allow(dead_code)]

use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tune_common::events::{EventItem, EventKind, TrackEvent};
use tune_importer::external::beatport::beatport_id;
use tune_importer::external::{
    ArtworkNormalizer, Collaborators, Converter, KeyEstimator, MetadataLookup, TagStore,
};
use tune_importer::models::{Artwork, TrackRecord, TrackTags};
use tune_importer::services::{
    event_queue, fault_channel, ConnectionRegistry, EventReceiver, FaultReceiver, TrackProcessor,
    TrackRegistry, WorkerPool,
};

/// Tags stored as a JSON object in the file's contents
#[derive(Default)]
pub struct JsonTagStore;

impl TagStore for JsonTagStore {
    fn load(&self, path: &Path) -> anyhow::Result<(TrackTags, Vec<Artwork>)> {
        let content = std::fs::read(path)?;
        let mut tags = TrackTags::default();
        if let Ok(Value::Object(fields)) = serde_json::from_slice::<Value>(&content) {
            tags.merge(&fields);
        }
        Ok((tags, Vec::new()))
    }

    fn save(&self, record: &TrackRecord) -> anyhow::Result<()> {
        let content = serde_json::to_vec(&record.tags.to_item())?;
        std::fs::write(&record.path, content)?;
        Ok(())
    }
}

/// Key estimator answering a fixed, unpadded key
pub struct FixedKeyEstimator(pub &'static str);

impl KeyEstimator for FixedKeyEstimator {
    fn estimate_key(&self, _path: &Path) -> anyhow::Result<String> {
        Ok(self.0.to_string())
    }
}

/// Converter that copies the source to `<stem>.aif` and deletes it
#[derive(Default)]
pub struct RecordingConverter {
    pub converted: Mutex<Vec<PathBuf>>,
}

impl Converter for RecordingConverter {
    fn convert(&self, path: &Path) -> anyhow::Result<PathBuf> {
        let dest = path.with_extension("aif");
        std::fs::copy(path, &dest)?;
        std::fs::remove_file(path)?;
        self.converted.lock().unwrap().push(path.to_path_buf());
        Ok(dest)
    }
}

/// Lookup identifying `<digits>_` file names
pub struct FakeLookup {
    pub fields: EventItem,
}

impl FakeLookup {
    pub fn with_genre(genre: &str) -> Self {
        let mut fields = EventItem::new();
        fields.insert("genre".to_string(), Value::String(genre.to_string()));
        Self { fields }
    }
}

impl MetadataLookup for FakeLookup {
    fn has_identifying_metadata(&self, record: &TrackRecord) -> bool {
        beatport_id(record).is_some()
    }

    fn lookup(&self, _record: &TrackRecord) -> anyhow::Result<EventItem> {
        Ok(self.fields.clone())
    }
}

/// Artwork passed through unchanged
pub struct PassthroughArtwork;

impl ArtworkNormalizer for PassthroughArtwork {
    fn normalize(&self, artwork: &Artwork) -> anyhow::Result<Artwork> {
        Ok(artwork.clone())
    }
}

/// Fake collaborators; the converter is returned for inspection
pub fn fake_collaborators() -> (Collaborators, Arc<RecordingConverter>) {
    let converter = Arc::new(RecordingConverter::default());
    let collaborators = Collaborators {
        converter: converter.clone(),
        key_estimator: Arc::new(FixedKeyEstimator("1A")),
        lookup: Arc::new(FakeLookup::with_genre("Techno")),
        tags: Arc::new(JsonTagStore),
        artwork: Arc::new(PassthroughArtwork),
    };
    (collaborators, converter)
}

/// Import root, registry and pipeline wired to the fakes
pub struct Harness {
    pub dir: TempDir,
    pub root: PathBuf,
    pub registry: Arc<TrackRegistry>,
    pub connections: Arc<ConnectionRegistry>,
    pub processor: TrackProcessor,
    pub pool: WorkerPool,
    pub converter: Arc<RecordingConverter>,
    pub events: EventReceiver,
    pub faults: FaultReceiver,
    pub seen: Vec<TrackEvent>,
}

impl Harness {
    /// Must be called from within a tokio runtime
    pub fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let root = dir.path().canonicalize().unwrap();

        let (queue, events) = event_queue::channel();
        let registry = Arc::new(TrackRegistry::new(root.clone(), queue));
        let connections = Arc::new(ConnectionRegistry::new(Arc::clone(&registry)));
        let (sink, faults) = fault_channel();
        let pool = WorkerPool::new(4, sink, None);
        let (collaborators, converter) = fake_collaborators();
        let processor = TrackProcessor::new(
            Arc::clone(&registry),
            pool.clone(),
            collaborators,
            Duration::from_millis(50),
        );

        Self {
            dir,
            root,
            registry,
            connections,
            processor,
            pool,
            converter,
            events,
            faults,
            seen: Vec::new(),
        }
    }

    /// Write a track whose tags are `fields`
    pub fn write_track(&self, name: &str, fields: Value) -> PathBuf {
        let path = self.root.join(name);
        std::fs::write(&path, serde_json::to_vec(&fields).unwrap()).unwrap();
        path
    }

    /// Wait for queued jobs, then collect the events they emitted
    pub async fn settle(&mut self) -> &[TrackEvent] {
        self.pool.wait_idle().await;
        self.seen.extend(self.events.drain());
        &self.seen
    }

    /// Collect events until `done` holds for everything seen so far
    pub async fn wait_for<F>(&mut self, done: F) -> &[TrackEvent]
    where
        F: Fn(&[TrackEvent]) -> bool,
    {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
        loop {
            self.seen.extend(self.events.drain());
            if done(&self.seen) {
                return &self.seen;
            }
            assert!(
                tokio::time::Instant::now() < deadline,
                "timed out waiting for events, saw {:?}",
                self.seen
            );
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }
}

/// Events of `kind` for track `id`
pub fn events_for<'a>(events: &'a [TrackEvent], id: &str, kind: EventKind) -> Vec<&'a TrackEvent> {
    events
        .iter()
        .filter(|e| e.kind == kind && e.id() == Some(id))
        .collect()
}

/// Count of events of `kind`
pub fn count_kind(events: &[TrackEvent], kind: EventKind) -> usize {
    events.iter().filter(|e| e.kind == kind).count()
}
