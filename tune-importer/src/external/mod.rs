//! External collaborators invoked by the pipeline
//!
//! Each collaborator is a trait so the pipeline can run against fakes. All
//! methods are blocking and are only ever called from worker pool jobs.

pub mod artwork;
pub mod beatport;
pub mod converter;
pub mod keyfinder;
pub mod tags;

pub use artwork::JpegNormalizer;
pub use beatport::{BeatportClient, BeatportError, DisabledLookup};
pub use converter::{ConvertError, FfmpegConverter};
pub use keyfinder::{is_valid_camelot, pad_key, KeyfinderCli, KeyfinderError};
pub use tags::LoftyTagStore;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use tune_common::events::EventItem;

use crate::models::{Artwork, TrackRecord, TrackTags};

/// Audio format conversion
pub trait Converter: Send + Sync {
    /// Convert `path` into an importable format
    ///
    /// Returns the path of the new file. The source is removed on success;
    /// the new file shares the source's path minus extension.
    fn convert(&self, path: &Path) -> anyhow::Result<PathBuf>;
}

/// Musical key estimation
pub trait KeyEstimator: Send + Sync {
    /// Estimated key of the audio at `path`, in Camelot notation
    fn estimate_key(&self, path: &Path) -> anyhow::Result<String>;
}

/// Purchase metadata lookup
pub trait MetadataLookup: Send + Sync {
    /// Whether the record carries metadata identifying its purchase
    fn has_identifying_metadata(&self, record: &TrackRecord) -> bool;

    /// Tag fields to merge into the record
    fn lookup(&self, record: &TrackRecord) -> anyhow::Result<EventItem>;
}

/// Tag and embedded artwork I/O
pub trait TagStore: Send + Sync {
    fn load(&self, path: &Path) -> anyhow::Result<(TrackTags, Vec<Artwork>)>;

    /// Write the record's tags and artwork to its file
    fn save(&self, record: &TrackRecord) -> anyhow::Result<()>;
}

/// Artwork re-encoding
pub trait ArtworkNormalizer: Send + Sync {
    fn normalize(&self, artwork: &Artwork) -> anyhow::Result<Artwork>;
}

/// Full set of collaborators used by the pipeline
#[derive(Clone)]
pub struct Collaborators {
    pub converter: Arc<dyn Converter>,
    pub key_estimator: Arc<dyn KeyEstimator>,
    pub lookup: Arc<dyn MetadataLookup>,
    pub tags: Arc<dyn TagStore>,
    pub artwork: Arc<dyn ArtworkNormalizer>,
}
