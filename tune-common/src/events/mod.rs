//! Event types for the tune-manager event system
//!
//! Every state change the importer reports is a [`TrackEvent`]: an event kind
//! plus an item object that always carries the track `id`. Events are queued
//! as they happen and later grouped by kind into [`EventBatch`]es, which is
//! the shape delivered to UI clients:
//!
//! ```json
//! {"type": "TRACK_DETAILS", "items": [{"id": "...", "title": "..."}]}
//! ```

mod track_types;

pub use track_types::TrackProcess;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

/// Item payload of an event; always contains an `id` key
pub type EventItem = Map<String, Value>;

/// Event kinds sent to UI clients
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventKind {
    /// Full serialized track record (new track, or replayed on connect)
    TrackDetails,
    /// Track file disappeared from the import root
    TrackRemoved,
    /// Track entered a long-running processing stage
    TrackProcessing,
    /// Partial information became available; names the completed stage
    TrackUpdate,
    /// Client-initiated save finished
    TrackSaved,
}

impl EventKind {
    /// Wire name of the event kind
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::TrackDetails => "TRACK_DETAILS",
            EventKind::TrackRemoved => "TRACK_REMOVED",
            EventKind::TrackProcessing => "TRACK_PROCESSING",
            EventKind::TrackUpdate => "TRACK_UPDATE",
            EventKind::TrackSaved => "TRACK_SAVED",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single queued state-change notification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackEvent {
    /// Event kind
    #[serde(rename = "type")]
    pub kind: EventKind,
    /// Item payload, keyed by field name
    pub item: EventItem,
}

impl TrackEvent {
    /// Build an event for `id` carrying additional `fields`
    ///
    /// The `id` key is always set to `id`, even if `fields` contains one.
    pub fn new(kind: EventKind, id: &str, fields: EventItem) -> Self {
        let mut item = fields;
        item.insert("id".to_string(), Value::String(id.to_string()));
        Self { kind, item }
    }

    /// `TRACK_DETAILS` with a serialized track record
    pub fn details(id: &str, record: EventItem) -> Self {
        Self::new(EventKind::TrackDetails, id, record)
    }

    /// `TRACK_PROCESSING` announcing that `process` started
    pub fn processing(id: &str, process: TrackProcess) -> Self {
        let mut fields = EventItem::new();
        fields.insert("process".to_string(), Value::String(process.as_str().to_string()));
        Self::new(EventKind::TrackProcessing, id, fields)
    }

    /// `TRACK_UPDATE` reporting that `completed` finished with `fields` as its result
    pub fn update(id: &str, completed: TrackProcess, fields: EventItem) -> Self {
        let mut item = fields;
        item.insert(
            "completed_process".to_string(),
            Value::String(completed.as_str().to_string()),
        );
        Self::new(EventKind::TrackUpdate, id, item)
    }

    /// `TRACK_REMOVED`
    pub fn removed(id: &str) -> Self {
        Self::new(EventKind::TrackRemoved, id, EventItem::new())
    }

    /// `TRACK_SAVED`
    pub fn saved(id: &str) -> Self {
        Self::new(EventKind::TrackSaved, id, EventItem::new())
    }

    /// Track identifier carried by the item
    pub fn id(&self) -> Option<&str> {
        self.item.get("id").and_then(Value::as_str)
    }
}

/// All items of one event kind, as delivered to clients
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventBatch {
    /// Event kind shared by every item
    #[serde(rename = "type")]
    pub kind: EventKind,
    /// Items in the order they were queued
    pub items: Vec<EventItem>,
}

impl EventBatch {
    /// Serialize into the JSON text frame sent to clients
    pub fn to_json(&self) -> crate::Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Group events by kind
///
/// Groups are ordered by [`EventKind`]; items inside a group keep the order
/// in which they were queued. An empty input yields no batches.
pub fn group_events<I>(events: I) -> Vec<EventBatch>
where
    I: IntoIterator<Item = TrackEvent>,
{
    let mut groups: BTreeMap<EventKind, Vec<EventItem>> = BTreeMap::new();
    for event in events {
        groups.entry(event.kind).or_default().push(event.item);
    }

    groups
        .into_iter()
        .map(|(kind, items)| EventBatch { kind, items })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_always_carries_id() {
        let mut fields = EventItem::new();
        fields.insert("id".to_string(), Value::String("spoofed".to_string()));
        fields.insert("title".to_string(), Value::String("Strobe".to_string()));

        let event = TrackEvent::details("abc", fields);

        assert_eq!(event.id(), Some("abc"));
        assert_eq!(event.item["title"], "Strobe");
    }

    #[test]
    fn test_update_names_completed_process() {
        let mut fields = EventItem::new();
        fields.insert("key".to_string(), Value::String("08A".to_string()));

        let event = TrackEvent::update("abc", TrackProcess::KeyComputing, fields);

        assert_eq!(event.kind, EventKind::TrackUpdate);
        assert_eq!(event.item["completed_process"], "KEY_COMPUTING");
        assert_eq!(event.item["key"], "08A");
    }

    #[test]
    fn test_group_events_by_kind_preserves_item_order() {
        let events = vec![
            TrackEvent::processing("a", TrackProcess::KeyComputing),
            TrackEvent::removed("x"),
            TrackEvent::processing("b", TrackProcess::Converting),
            TrackEvent::removed("y"),
        ];

        let batches = group_events(events);

        assert_eq!(batches.len(), 2);
        let removed = batches
            .iter()
            .find(|b| b.kind == EventKind::TrackRemoved)
            .expect("removed group");
        let ids: Vec<_> = removed.items.iter().map(|i| i["id"].as_str().unwrap()).collect();
        assert_eq!(ids, vec!["x", "y"]);

        let processing = batches
            .iter()
            .find(|b| b.kind == EventKind::TrackProcessing)
            .expect("processing group");
        assert_eq!(processing.items[0]["process"], "KEY_COMPUTING");
        assert_eq!(processing.items[1]["process"], "CONVERTING");
    }

    #[test]
    fn test_group_events_empty() {
        assert!(group_events(Vec::new()).is_empty());
    }

    #[test]
    fn test_batch_wire_shape() {
        let batch = group_events(vec![TrackEvent::saved("abc")]).remove(0);
        let json: Value = serde_json::from_str(&batch.to_json().unwrap()).unwrap();

        assert_eq!(json["type"], "TRACK_SAVED");
        assert_eq!(json["items"][0]["id"], "abc");
    }
}
