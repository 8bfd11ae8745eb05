//! Audio format classification by file extension

use std::path::Path;

/// Extensions imported as-is
pub const VALID_FORMATS: &[&str] = &["mp3", "aif", "aiff"];

/// Extensions that must be converted before import
pub const CONVERTIBLE_FORMATS: &[&str] = &["wav", "flac"];

/// How the pipeline treats a file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackFormat {
    /// Directly importable
    Valid,
    /// Importable after conversion
    Convertible,
    Unsupported,
}

impl TrackFormat {
    /// Classify `path` by its extension, ignoring case
    pub fn of(path: &Path) -> Self {
        let Some(ext) = extension(path) else {
            return TrackFormat::Unsupported;
        };

        if VALID_FORMATS.contains(&ext.as_str()) {
            TrackFormat::Valid
        } else if CONVERTIBLE_FORMATS.contains(&ext.as_str()) {
            TrackFormat::Convertible
        } else {
            TrackFormat::Unsupported
        }
    }
}

/// Lowercased extension of `path`
pub fn extension(path: &Path) -> Option<String> {
    path.extension().map(|e| e.to_string_lossy().to_lowercase())
}

/// True for `.aiff` files, which are renamed to `.aif` before processing
pub fn needs_aif_rename(path: &Path) -> bool {
    extension(path).as_deref() == Some("aiff")
}
