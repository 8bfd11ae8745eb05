//! Track record and tag model
//!
//! A [`TrackRecord`] is the registry's view of one importable file: its
//! identifier, location, editable tag fields and embedded artwork.

use serde_json::Value;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tune_common::events::EventItem;

use crate::services::identity::TrackId;
use crate::utils::paths::relative_to_root;

/// Editable tag fields
///
/// All values are kept as text; numeric fields (year, track, disc, bpm) are
/// written back in whatever form the tag format supports.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrackTags {
    pub artist: Option<String>,
    pub title: Option<String>,
    pub remixer: Option<String>,
    pub album: Option<String>,
    pub publisher: Option<String>,
    pub release: Option<String>,
    pub genre: Option<String>,
    pub year: Option<String>,
    pub track: Option<String>,
    pub disc: Option<String>,
    pub bpm: Option<String>,
    pub key: Option<String>,
    pub comment: Option<String>,
}

impl TrackTags {
    /// Field names in serialization order
    pub const FIELDS: [&'static str; 13] = [
        "artist", "title", "remixer", "album", "publisher", "release", "genre", "year", "track",
        "disc", "bpm", "key", "comment",
    ];

    /// Value of the named field; `None` for unknown names and unset fields
    pub fn get(&self, name: &str) -> Option<&str> {
        let value = match name {
            "artist" => &self.artist,
            "title" => &self.title,
            "remixer" => &self.remixer,
            "album" => &self.album,
            "publisher" => &self.publisher,
            "release" => &self.release,
            "genre" => &self.genre,
            "year" => &self.year,
            "track" => &self.track,
            "disc" => &self.disc,
            "bpm" => &self.bpm,
            "key" => &self.key,
            "comment" => &self.comment,
            _ => return None,
        };
        value.as_deref()
    }

    fn field_mut(&mut self, name: &str) -> Option<&mut Option<String>> {
        Some(match name {
            "artist" => &mut self.artist,
            "title" => &mut self.title,
            "remixer" => &mut self.remixer,
            "album" => &mut self.album,
            "publisher" => &mut self.publisher,
            "release" => &mut self.release,
            "genre" => &mut self.genre,
            "year" => &mut self.year,
            "track" => &mut self.track,
            "disc" => &mut self.disc,
            "bpm" => &mut self.bpm,
            "key" => &mut self.key,
            "comment" => &mut self.comment,
            _ => return None,
        })
    }

    /// Set the named field; returns false if the name is not a tag field
    pub fn set(&mut self, name: &str, value: Option<String>) -> bool {
        match self.field_mut(name) {
            Some(field) => {
                *field = value;
                true
            }
            None => false,
        }
    }

    /// Merge a stage result into the tags
    ///
    /// Unknown keys are ignored, `null` clears the field.
    pub fn merge(&mut self, fields: &EventItem) {
        for (name, value) in fields {
            if let Some(field) = self.field_mut(name) {
                *field = value_text(value);
            }
        }
    }

    /// Tags as submitted by a client save
    ///
    /// A save carries the whole record: known fields with a non-empty value
    /// are set, blank, null and missing ones stay unset. Unknown fields are
    /// ignored.
    pub fn from_edits(edits: &EventItem) -> Self {
        let mut tags = Self::default();
        for (name, value) in edits {
            let Some(text) = value_text(value) else {
                continue;
            };
            if let Some(field) = tags.field_mut(name) {
                *field = Some(text);
            }
        }
        tags
    }

    /// Serialize every field, unset ones as `null`
    pub fn to_item(&self) -> EventItem {
        Self::FIELDS
            .iter()
            .map(|name| {
                let value = self
                    .get(name)
                    .map(|v| Value::String(v.to_string()))
                    .unwrap_or(Value::Null);
                (name.to_string(), value)
            })
            .collect()
    }
}

/// Text form of a JSON field value; empty strings and non-scalars are `None`
fn value_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Embedded cover image
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artwork {
    /// SHA-256 of the payload, hex encoded
    pub key: String,
    /// MIME type of the payload
    pub mime: String,
    pub data: Arc<[u8]>,
}

impl Artwork {
    pub fn new(mime: impl Into<String>, data: Vec<u8>) -> Self {
        let key = format!("{:x}", Sha256::digest(&data));
        Self {
            key,
            mime: mime.into(),
            data: data.into(),
        }
    }
}

/// A known track
#[derive(Debug, Clone, PartialEq)]
pub struct TrackRecord {
    pub id: TrackId,
    /// Absolute path of the audio file
    pub path: PathBuf,
    pub tags: TrackTags,
    pub artwork: Vec<Artwork>,
}

impl TrackRecord {
    /// Build a record for `path`, deriving its identifier
    pub fn new(path: PathBuf, tags: TrackTags, artwork: Vec<Artwork>) -> Self {
        Self {
            id: TrackId::from_path(&path),
            path,
            tags,
            artwork,
        }
    }

    pub fn artwork_keys(&self) -> Vec<String> {
        self.artwork.iter().map(|a| a.key.clone()).collect()
    }

    /// Serialized form sent as a `TRACK_DETAILS` item
    ///
    /// `file_path` is reported relative to `import_root`.
    pub fn details(&self, import_root: &Path) -> EventItem {
        let mut item = EventItem::new();
        item.insert("id".to_string(), Value::String(self.id.to_string()));
        item.insert(
            "file_path".to_string(),
            Value::String(relative_to_root(&self.path, import_root)),
        );
        item.insert(
            "artwork".to_string(),
            Value::Array(self.artwork_keys().into_iter().map(Value::String).collect()),
        );
        item.extend(self.tags.to_item());
        item
    }
}
