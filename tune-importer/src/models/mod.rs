//! Data models for tune-importer

pub mod format;
pub mod track;

pub use format::TrackFormat;
pub use track::{Artwork, TrackRecord, TrackTags};
