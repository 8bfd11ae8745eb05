//! Tag and artwork I/O using lofty

use lofty::config::WriteOptions;
use lofty::picture::{MimeType, Picture, PictureType};
use lofty::prelude::*;
use lofty::probe::Probe;
use lofty::tag::{ItemKey, Tag};
use std::path::Path;
use tracing::debug;

use super::TagStore;
use crate::models::{Artwork, TrackRecord, TrackTags};

/// Text-valued fields and the tag items they are stored in
const TEXT_FIELDS: [(&str, ItemKey); 10] = [
    ("title", ItemKey::TrackTitle),
    ("artist", ItemKey::TrackArtist),
    ("remixer", ItemKey::Remixer),
    ("album", ItemKey::AlbumTitle),
    ("publisher", ItemKey::Publisher),
    ("release", ItemKey::CatalogNumber),
    ("genre", ItemKey::Genre),
    ("bpm", ItemKey::IntegerBpm),
    ("key", ItemKey::InitialKey),
    ("comment", ItemKey::Comment),
];

/// [`TagStore`] reading and writing the file's primary tag
#[derive(Debug, Clone, Default)]
pub struct LoftyTagStore;

impl LoftyTagStore {
    pub fn new() -> Self {
        Self
    }
}

fn read_tags(tag: &Tag) -> TrackTags {
    let mut tags = TrackTags::default();
    for (name, key) in TEXT_FIELDS.iter() {
        let value = tag
            .get_string(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty());
        tags.set(name, value);
    }

    if tags.publisher.is_none() {
        tags.publisher = tag.get_string(&ItemKey::Label).map(str::to_string);
    }
    tags.year = tag.year().map(|y| y.to_string());
    tags.track = tag.track().map(|n| n.to_string());
    tags.disc = tag.disk().map(|n| n.to_string());
    tags
}

fn read_artwork(tag: &Tag) -> Vec<Artwork> {
    tag.pictures()
        .iter()
        .map(|p| {
            let mime = p
                .mime_type()
                .map(|m| m.as_str().to_string())
                .unwrap_or_else(|| "image/jpeg".to_string());
            Artwork::new(mime, p.data().to_vec())
        })
        .collect()
}

/// Leading number of values such as "3" or "3/12"
fn leading_number(value: &str) -> Option<u32> {
    value.split('/').next()?.trim().parse().ok()
}

fn write_tags(tag: &mut Tag, record: &TrackRecord) {
    let tags = &record.tags;
    for (name, key) in TEXT_FIELDS.iter() {
        match tags.get(name) {
            Some(value) => {
                tag.insert_text(key.clone(), value.to_string());
            }
            None => {
                tag.remove_key(key);
            }
        }
    }

    match tags.year.as_deref().and_then(leading_number) {
        Some(year) => tag.set_year(year),
        None => tag.remove_year(),
    }
    match tags.track.as_deref().and_then(leading_number) {
        Some(track) => tag.set_track(track),
        None => tag.remove_track(),
    }
    match tags.disc.as_deref().and_then(leading_number) {
        Some(disc) => tag.set_disk(disc),
        None => tag.remove_disk(),
    }

    while !tag.pictures().is_empty() {
        tag.remove_picture(0);
    }
    for art in &record.artwork {
        tag.push_picture(Picture::new_unchecked(
            PictureType::CoverFront,
            Some(MimeType::from_str(&art.mime)),
            None,
            art.data.to_vec(),
        ));
    }
}

impl TagStore for LoftyTagStore {
    fn load(&self, path: &Path) -> anyhow::Result<(TrackTags, Vec<Artwork>)> {
        let tagged_file = Probe::open(path)?.read()?;

        let tag = tagged_file.primary_tag().or_else(|| tagged_file.first_tag());
        let Some(tag) = tag else {
            debug!(path = %path.display(), "No tags found");
            return Ok((TrackTags::default(), Vec::new()));
        };

        Ok((read_tags(tag), read_artwork(tag)))
    }

    fn save(&self, record: &TrackRecord) -> anyhow::Result<()> {
        let mut tagged_file = Probe::open(&record.path)?.read()?;

        if tagged_file.primary_tag().is_none() {
            let tag_type = tagged_file.primary_tag_type();
            tagged_file.insert_tag(Tag::new(tag_type));
        }

        let tag = tagged_file
            .primary_tag_mut()
            .ok_or_else(|| anyhow::anyhow!("No writable tag for {}", record.path.display()))?;
        write_tags(tag, record);
        tag.save_to_path(&record.path, WriteOptions::default())?;

        debug!(id = %record.id, path = %record.path.display(), "Saved tags");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lofty::tag::TagType;
    use std::path::PathBuf;

    #[test]
    fn test_tag_round_trip_in_memory() {
        let record = TrackRecord::new(
            PathBuf::from("/import/a.mp3"),
            TrackTags {
                title: Some("Strobe".to_string()),
                artist: Some("deadmau5".to_string()),
                key: Some("08A".to_string()),
                track: Some("10/10".to_string()),
                ..Default::default()
            },
            vec![Artwork::new("image/png", vec![1, 2, 3, 4])],
        );

        let mut tag = Tag::new(TagType::Id3v2);
        write_tags(&mut tag, &record);

        let tags = read_tags(&tag);
        assert_eq!(tags.title.as_deref(), Some("Strobe"));
        assert_eq!(tags.artist.as_deref(), Some("deadmau5"));
        assert_eq!(tags.key.as_deref(), Some("08A"));
        assert_eq!(tags.track.as_deref(), Some("10"));
        assert_eq!(tags.genre, None);

        let artwork = read_artwork(&tag);
        assert_eq!(artwork.len(), 1);
        assert_eq!(artwork[0].key, record.artwork[0].key);
    }

    #[test]
    fn test_load_missing_file_is_error() {
        let store = LoftyTagStore::new();
        assert!(store.load(Path::new("/nonexistent/file.mp3")).is_err());
    }

    #[test]
    fn test_leading_number() {
        assert_eq!(leading_number("3/12"), Some(3));
        assert_eq!(leading_number(" 7 "), Some(7));
        assert_eq!(leading_number("x"), None);
    }
}
