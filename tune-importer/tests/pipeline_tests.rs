//! Track lifecycle pipeline integration tests
//!
//! Runs the pipeline against a temporary import root with in-process fakes
//! for tag I/O, conversion, key estimation and Beatport lookups.

mod helpers;

use helpers::{count_kind, events_for, Harness};
use serde_json::{json, Value};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tune_common::events::{EventItem, EventKind};
use tune_importer::services::watcher::DEFAULT_RENAME_GRACE;
use tune_importer::services::{
    AddMode, FileEventSink, FsWatcher, Removal, SaveOptions, TrackId,
};
use tune_importer::utils::determine_path;

fn edit(id: &TrackId, fields: Value) -> EventItem {
    let mut item = fields.as_object().cloned().unwrap();
    item.insert("id".to_string(), Value::String(id.to_string()));
    item
}

fn file_tags(path: &std::path::Path) -> Value {
    serde_json::from_slice(&std::fs::read(path).unwrap()).unwrap()
}

#[tokio::test]
async fn test_valid_track_with_key_emits_details_only() {
    let mut h = Harness::new();
    let path = h.write_track("track1.mp3", json!({"title": "One", "key": "1A"}));
    let id = TrackId::from_path(&path);

    assert_eq!(h.processor.add_all().unwrap(), 1);
    let events = h.settle().await.to_vec();

    assert_eq!(events.len(), 1);
    let details = &events[0];
    assert_eq!(details.kind, EventKind::TrackDetails);
    assert_eq!(details.id(), Some(id.as_str()));
    assert_eq!(details.item["file_path"], "track1.mp3");
    assert_eq!(details.item["key"], "1A");
    assert_eq!(details.item["artist"], Value::Null);
    assert_eq!(h.registry.processing_count(), 0);
}

#[tokio::test]
async fn test_convertible_track_reenters_through_watcher() {
    let mut h = Harness::new();
    let track1 = h.write_track("track1.mp3", json!({"title": "One", "key": "1A"}));
    let track2 = h.write_track("track2.wav", json!({"title": "Two", "key": "4B"}));
    let id1 = TrackId::from_path(&track1);
    let id2 = TrackId::from_path(&track2);

    let token = CancellationToken::new();
    let sink: Arc<dyn FileEventSink> = Arc::new(h.processor.clone());
    let watcher = FsWatcher::new(&h.root, sink, DEFAULT_RENAME_GRACE)
        .start(token.clone())
        .unwrap();

    assert_eq!(h.processor.add_all().unwrap(), 2);

    let target = id2.to_string();
    let events = h
        .wait_for(|seen| !events_for(seen, &target, EventKind::TrackDetails).is_empty())
        .await
        .to_vec();

    // track1: details only
    assert_eq!(events_for(&events, id1.as_str(), EventKind::TrackDetails).len(), 1);
    assert!(events_for(&events, id1.as_str(), EventKind::TrackProcessing).is_empty());

    // track2: CONVERTING, completed, then details of the converted file
    let position = |kind: EventKind| {
        events
            .iter()
            .position(|e| e.kind == kind && e.id() == Some(id2.as_str()))
            .unwrap()
    };
    let processing = &events[position(EventKind::TrackProcessing)];
    assert_eq!(processing.item["process"], "CONVERTING");
    let update = &events[position(EventKind::TrackUpdate)];
    assert_eq!(update.item["completed_process"], "CONVERTING");
    assert!(position(EventKind::TrackProcessing) < position(EventKind::TrackDetails));

    let details = &events[position(EventKind::TrackDetails)];
    assert_eq!(details.item["file_path"], "track2.aif");
    assert_eq!(details.item["title"], "Two");

    assert_eq!(*h.converter.converted.lock().unwrap(), vec![track2.clone()]);
    assert!(!track2.exists());

    token.cancel();
    watcher.await.unwrap();
}

#[tokio::test]
async fn test_missing_key_is_computed_and_persisted() {
    let mut h = Harness::new();
    let path = h.write_track("track1.mp3", json!({"title": "One"}));
    let id = TrackId::from_path(&path);

    h.processor.add_all().unwrap();
    let events = h.settle().await.to_vec();

    let kinds: Vec<_> = events.iter().map(|e| e.kind).collect();
    assert_eq!(
        kinds,
        vec![
            EventKind::TrackDetails,
            EventKind::TrackProcessing,
            EventKind::TrackUpdate
        ]
    );
    assert_eq!(events[1].item["process"], "KEY_COMPUTING");
    assert_eq!(events[2].item["completed_process"], "KEY_COMPUTING");
    assert_eq!(events[2].item["key"], "01A");

    assert_eq!(h.registry.processing_count(), 0);
    let record = h.registry.get(&id).unwrap();
    assert_eq!(record.tags.key.as_deref(), Some("01A"));
    assert_eq!(file_tags(&path)["key"], "01A");
}

#[tokio::test]
async fn test_invalid_key_is_cleared_before_publishing() {
    let mut h = Harness::new();
    h.write_track("track1.mp3", json!({"title": "One", "key": "13A"}));

    h.processor.add_all().unwrap();
    let events = h.settle().await.to_vec();

    assert_eq!(events[0].kind, EventKind::TrackDetails);
    assert_eq!(events[0].item["key"], Value::Null);
    assert_eq!(count_kind(&events, EventKind::TrackUpdate), 1);
}

#[tokio::test]
async fn test_beatport_named_track_is_enriched() {
    let mut h = Harness::new();
    let path = h.write_track("12345_track.mp3", json!({"title": "One", "key": "5A"}));
    let id = TrackId::from_path(&path);

    h.processor.add_all().unwrap();
    let events = h.settle().await.to_vec();

    let processing = events_for(&events, id.as_str(), EventKind::TrackProcessing);
    assert_eq!(processing.len(), 1);
    assert_eq!(processing[0].item["process"], "BEATPORT_IMPORT");

    let updates = events_for(&events, id.as_str(), EventKind::TrackUpdate);
    assert_eq!(updates.len(), 1);
    assert_eq!(updates[0].item["completed_process"], "BEATPORT_IMPORT");
    assert_eq!(updates[0].item["genre"], "Techno");

    assert_eq!(file_tags(&path)["genre"], "Techno");
    assert_eq!(h.registry.processing_count(), 0);
}

#[tokio::test]
async fn test_aiff_is_renamed_and_keeps_identity() {
    let mut h = Harness::new();
    let original = h.write_track("song.aiff", json!({"title": "Song", "key": "8B"}));

    h.processor.add_all().unwrap();
    let events = h.settle().await.to_vec();

    let renamed = h.root.join("song.aif");
    assert!(!original.exists());
    assert!(renamed.exists());

    assert_eq!(events.len(), 1);
    assert_eq!(events[0].id(), Some(TrackId::from_path(&original).as_str()));
    assert_eq!(events[0].id(), Some(TrackId::from_path(&renamed).as_str()));
    assert_eq!(events[0].item["file_path"], "song.aif");
}

#[tokio::test]
async fn test_sidecar_and_unsupported_files_are_dropped() {
    let mut h = Harness::new();
    let sidecar = h.write_track("._track1.mp3", json!({}));
    let notes = h.write_track("notes.txt", json!({}));

    h.processor.add(sidecar.clone(), AddMode::Scanned);
    h.processor.add(notes, AddMode::Watched);
    let events = h.settle().await;

    assert!(events.is_empty());
    assert!(h.registry.is_empty());
    assert!(sidecar.exists());
    assert!(h.faults.try_recv().is_none());
}

#[tokio::test]
async fn test_file_vanishing_before_it_settles_is_not_a_fault() {
    let mut h = Harness::new();
    let path = h.root.join("gone.mp3");

    h.processor.add(path, AddMode::Watched);
    let events = h.settle().await;

    assert!(events.is_empty());
    assert!(h.faults.try_recv().is_none());
}

#[tokio::test]
async fn test_remove_reports_tracked_files_once() {
    let mut h = Harness::new();
    let path = h.write_track("track1.mp3", json!({"key": "2A"}));
    let id = TrackId::from_path(&path);
    h.processor.add_all().unwrap();
    h.settle().await;

    assert_eq!(h.processor.remove(&path), Removal::Reported);
    assert_eq!(h.processor.remove(&path), Removal::Unknown);

    let events = h.settle().await.to_vec();
    assert_eq!(events_for(&events, id.as_str(), EventKind::TrackRemoved).len(), 1);
    assert!(!h.registry.contains(&id));
}

#[tokio::test]
async fn test_save_replaces_tags_with_submitted_fields() {
    let mut h = Harness::new();
    let path = h.write_track(
        "track1.mp3",
        json!({"title": "One", "key": "2A", "genre": "House", "comment": "old note"}),
    );
    let id = TrackId::from_path(&path);
    h.processor.add_all().unwrap();
    h.settle().await;

    h.processor.save_all(
        vec![edit(
            &id,
            json!({"title": "Edited", "key": "2A", "genre": "", "bogus": "x"}),
        )],
        SaveOptions::default(),
    );
    let events = h.settle().await.to_vec();

    assert_eq!(events_for(&events, id.as_str(), EventKind::TrackSaved).len(), 1);
    let tags = file_tags(&path);
    assert_eq!(tags["title"], "Edited");
    assert_eq!(tags["key"], "2A");
    assert_eq!(tags["genre"], Value::Null);
    assert_eq!(tags["comment"], Value::Null);
    assert!(tags.get("bogus").is_none());

    let record = h.registry.get(&id).unwrap();
    assert_eq!(record.tags.title.as_deref(), Some("Edited"));
    assert_eq!(record.tags.genre, None);
    assert_eq!(record.tags.comment, None);
}

#[tokio::test]
async fn test_save_with_migration_suppresses_removal() {
    let mut h = Harness::new();
    let library = tempfile::TempDir::new().unwrap();
    let path = h.write_track(
        "track1.mp3",
        json!({"title": "One", "artist": "Alpha", "key": "1A"}),
    );
    let id = TrackId::from_path(&path);
    h.processor.add_all().unwrap();
    h.settle().await;

    h.processor.save_all(
        vec![edit(&id, json!({"title": "Edited", "artist": "Alpha"}))],
        SaveOptions {
            migrate_path: Some(library.path().to_path_buf()),
            link_paths: Vec::new(),
        },
    );
    let events = h.settle().await.to_vec();

    let dest = library.path().join("Alpha").join("Singles").join("Edited.mp3");
    assert!(!path.exists());
    assert!(dest.exists());
    assert!(h.registry.is_expected_removal(&id));
    assert_eq!(events_for(&events, id.as_str(), EventKind::TrackSaved).len(), 1);

    let record = h.registry.get(&id).unwrap();
    assert_eq!(record.path, dest);
    assert_eq!(record.tags.title.as_deref(), Some("Edited"));

    // The delete event for the old location is the importer's own doing
    assert_eq!(h.processor.remove(&path), Removal::Suppressed);
    assert!(!h.registry.is_expected_removal(&id));
    let events = h.settle().await.to_vec();
    assert_eq!(count_kind(&events, EventKind::TrackRemoved), 0);
}

#[cfg(unix)]
#[tokio::test]
async fn test_save_links_into_extra_roots() {
    let mut h = Harness::new();
    let usb = tempfile::TempDir::new().unwrap();
    let path = h.write_track("track1.mp3", json!({"title": "One", "artist": "Alpha", "key": "1A"}));
    let id = TrackId::from_path(&path);
    h.processor.add_all().unwrap();
    h.settle().await;

    h.processor.save_all(
        vec![edit(
            &id,
            json!({"title": "One", "artist": "Alpha", "album": "Night"}),
        )],
        SaveOptions {
            migrate_path: None,
            link_paths: vec![usb.path().to_path_buf()],
        },
    );
    h.settle().await;

    let record = h.registry.get(&id).unwrap();
    let link = usb.path().join(determine_path(&record));
    assert_eq!(link, usb.path().join("Alpha").join("Night").join("One.mp3"));
    assert_eq!(std::fs::read_link(&link).unwrap(), path);
}

#[tokio::test]
async fn test_save_of_unknown_track_is_a_fault() {
    let mut h = Harness::new();

    h.processor.save_all(
        vec![edit(&TrackId::from_string("missing"), json!({"title": "x"}))],
        SaveOptions::default(),
    );
    let events = h.settle().await;

    assert!(events.is_empty());
    let fault = h.faults.try_recv().expect("fault reported");
    assert!(fault.label.contains("missing"));
}
