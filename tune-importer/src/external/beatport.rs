//! Beatport catalog lookup
//!
//! Tracks downloaded from Beatport are named `<track id>_<title>.<ext>`.
//! The numeric prefix identifies the purchase; the catalog entry for that id
//! supplies artist, remixer, release and label details.
//!
//! [`MetadataLookup`] is blocking, so requests are driven on the runtime
//! handle captured at construction.

use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use tokio::runtime::Handle;
use tune_common::events::EventItem;

use super::keyfinder::pad_key;
use super::MetadataLookup;
use crate::models::TrackRecord;

pub const DEFAULT_BASE_URL: &str = "https://api.beatport.com/v4";
const USER_AGENT: &str = concat!("tune-manager/", env!("CARGO_PKG_VERSION"));

/// Beatport client errors
#[derive(Debug, Error)]
pub enum BeatportError {
    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Track not found: {0}")]
    TrackNotFound(u64),

    #[error("API error {0}: {1}")]
    ApiError(u16, String),

    #[error("Parse error: {0}")]
    ParseError(String),

    /// Record has no Beatport id
    #[error("No Beatport id in {0}")]
    NotIdentified(String),
}

#[derive(Debug, Clone, Deserialize)]
pub struct BpTrack {
    pub id: u64,
    pub name: String,
    pub mix_name: Option<String>,
    #[serde(default)]
    pub artists: Vec<BpNamed>,
    #[serde(default)]
    pub remixers: Vec<BpNamed>,
    pub release: Option<BpRelease>,
    pub genre: Option<BpNamed>,
    pub bpm: Option<u32>,
    pub key: Option<BpKey>,
    pub catalog_number: Option<String>,
    pub publish_date: Option<String>,
    pub number: Option<u32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BpNamed {
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BpRelease {
    pub name: String,
    pub label: Option<BpNamed>,
    pub catalog_number: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BpKey {
    pub camelot_number: Option<u8>,
    pub camelot_letter: Option<String>,
}

impl BpTrack {
    /// Tag fields derived from the catalog entry
    ///
    /// Fields Beatport does not provide are left out so they do not
    /// overwrite existing tags.
    pub fn into_fields(self) -> EventItem {
        let mut fields = EventItem::new();
        let mut put = |name: &str, value: Option<String>| {
            if let Some(value) = value.filter(|v| !v.is_empty()) {
                fields.insert(name.to_string(), Value::String(value));
            }
        };

        let join = |names: &[BpNamed]| {
            names
                .iter()
                .map(|n| n.name.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        };

        let title = match self.mix_name.as_deref() {
            Some(mix) if !mix.is_empty() && mix != "Original Mix" => {
                format!("{} ({})", self.name, mix)
            }
            _ => self.name.clone(),
        };
        put("title", Some(title));
        put("artist", Some(join(&self.artists)));
        put("remixer", Some(join(&self.remixers)));
        put("genre", self.genre.map(|g| g.name));
        put("bpm", self.bpm.map(|b| b.to_string()));
        put("year", self.publish_date.as_deref().and_then(|d| d.get(..4)).map(str::to_string));
        put("track", self.number.map(|n| n.to_string()));

        let key = self.key.and_then(|k| match (k.camelot_number, k.camelot_letter) {
            (Some(n), Some(l)) => Some(pad_key(&format!("{}{}", n, l))),
            _ => None,
        });
        put("key", key);

        if let Some(release) = self.release {
            put("album", Some(release.name));
            put("publisher", release.label.map(|l| l.name));
            put("release", release.catalog_number.or(self.catalog_number));
        } else {
            put("release", self.catalog_number);
        }

        fields
    }
}

/// Beatport track id encoded in the file name, if any
pub fn beatport_id(record: &TrackRecord) -> Option<u64> {
    let name = record.path.file_name()?.to_string_lossy();
    let (prefix, _) = name.split_once('_')?;
    if prefix.is_empty() || !prefix.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    prefix.parse().ok()
}

/// Beatport API client
pub struct BeatportClient {
    http_client: reqwest::Client,
    base_url: String,
    token: String,
    runtime: Handle,
}

impl BeatportClient {
    /// Must be called from within a tokio runtime
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Result<Self, BeatportError> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| BeatportError::NetworkError(e.to_string()))?;

        Ok(Self {
            http_client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
            runtime: Handle::current(),
        })
    }

    /// Fetch a catalog track
    pub async fn fetch_track(&self, id: u64) -> Result<BpTrack, BeatportError> {
        let url = format!("{}/catalog/tracks/{}/", self.base_url, id);
        tracing::debug!(beatport_id = id, url = %url, "Querying Beatport API");

        let response = self
            .http_client
            .get(&url)
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|e| BeatportError::NetworkError(e.to_string()))?;

        let status = response.status();

        if status == 404 {
            return Err(BeatportError::TrackNotFound(id));
        }

        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(BeatportError::ApiError(status.as_u16(), error_text));
        }

        response
            .json()
            .await
            .map_err(|e| BeatportError::ParseError(e.to_string()))
    }
}

impl MetadataLookup for BeatportClient {
    fn has_identifying_metadata(&self, record: &TrackRecord) -> bool {
        beatport_id(record).is_some()
    }

    fn lookup(&self, record: &TrackRecord) -> anyhow::Result<EventItem> {
        let id = beatport_id(record)
            .ok_or_else(|| BeatportError::NotIdentified(record.path.display().to_string()))?;
        let track = self.runtime.block_on(self.fetch_track(id))?;
        tracing::info!(beatport_id = id, title = %track.name, "Fetched Beatport details");
        Ok(track.into_fields())
    }
}

/// Lookup used when no Beatport credentials are configured
#[derive(Debug, Clone, Default)]
pub struct DisabledLookup;

impl MetadataLookup for DisabledLookup {
    fn has_identifying_metadata(&self, _record: &TrackRecord) -> bool {
        false
    }

    fn lookup(&self, record: &TrackRecord) -> anyhow::Result<EventItem> {
        Err(BeatportError::NotIdentified(record.path.display().to_string()).into())
    }
}
