//! Library path helpers

use std::path::{Path, PathBuf};

use crate::models::TrackRecord;

/// Album folder used for tracks without an album tag
const SINGLES_DIR: &str = "Singles";

/// Path of `path` relative to `root`, falling back to the full path
pub fn relative_to_root(path: &Path, root: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .to_string_lossy()
        .into_owned()
}

/// Library-relative location of a track, derived from its tags
///
/// `Artist/Album/NN. Title.ext`, with `Singles` standing in for a missing
/// album and the track number prefix omitted when unknown. Untagged tracks
/// fall back to their current file name.
pub fn determine_path(record: &TrackRecord) -> PathBuf {
    let tags = &record.tags;
    let ext = record
        .path
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();

    let artist = tags
        .artist
        .as_deref()
        .map(sanitize)
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "Unknown Artist".to_string());
    let album = tags
        .album
        .as_deref()
        .map(sanitize)
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| SINGLES_DIR.to_string());

    let title = match tags.title.as_deref().map(sanitize).filter(|s| !s.is_empty()) {
        Some(title) => title,
        None => {
            let stem = record
                .path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default();
            return PathBuf::from(artist).join(album).join(format!("{}{}", sanitize(&stem), ext));
        }
    };

    let number = tags
        .track
        .as_deref()
        .and_then(track_number)
        .map(|n| format!("{:02}. ", n))
        .unwrap_or_default();

    PathBuf::from(artist)
        .join(album)
        .join(format!("{}{}{}", number, title, ext))
}

/// Track number from tag text such as "3" or "3/12"
fn track_number(text: &str) -> Option<u32> {
    text.split('/').next()?.trim().parse().ok()
}

/// Replace characters that are not allowed in file names
fn sanitize(component: &str) -> String {
    component
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect::<String>()
        .trim()
        .trim_matches('.')
        .to_string()
}
