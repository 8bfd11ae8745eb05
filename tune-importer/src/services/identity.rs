//! Track identity
//!
//! A track is identified by the SHA-256 of its path with the extension
//! stripped. The identifier ignores file contents and extension, so a file
//! whose extension is rewritten (`.aiff` -> `.aif`) or which is converted to
//! another format in place keeps its identity.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::path::Path;

/// Stable identifier of a track, derived from its path
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrackId(String);

impl TrackId {
    /// Compute the identifier of the file at `path`
    pub fn from_path(path: &Path) -> Self {
        let stem = path.with_extension("");
        let digest = Sha256::digest(stem.to_string_lossy().as_bytes());
        Self(format!("{:x}", digest))
    }

    /// Wrap an identifier received from a client
    pub fn from_string(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Hex representation
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TrackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
