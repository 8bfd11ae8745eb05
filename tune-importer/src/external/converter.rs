//! ffmpeg format conversion
//!
//! Converts `.wav`/`.flac` sources to 16-bit big-endian PCM AIFF, carrying
//! the source's metadata over as ID3v2, then deletes the source.

use std::path::{Path, PathBuf};
use std::process::Command;
use thiserror::Error;
use tracing::{debug, info};

use super::Converter;

/// Conversion errors
#[derive(Debug, Error)]
pub enum ConvertError {
    /// ffmpeg binary could not be started
    #[error("Failed to execute {binary}: {source}")]
    Spawn {
        binary: String,
        #[source]
        source: std::io::Error,
    },

    /// ffmpeg exited unsuccessfully
    #[error("Conversion of {path} failed: {stderr}")]
    Failed { path: PathBuf, stderr: String },

    /// Output was written but the source could not be removed
    #[error("Failed to remove converted source {path}: {source}")]
    RemoveSource {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Converter backed by the ffmpeg command-line tool
#[derive(Debug, Clone)]
pub struct FfmpegConverter {
    binary: String,
}

impl FfmpegConverter {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    /// Destination of a conversion: same path, `.aif` extension
    pub fn output_path(path: &Path) -> PathBuf {
        path.with_extension("aif")
    }

    fn args(source: &Path, dest: &Path) -> Vec<String> {
        vec![
            "-y".to_string(),
            "-loglevel".to_string(),
            "error".to_string(),
            "-i".to_string(),
            source.to_string_lossy().into_owned(),
            "-map_metadata".to_string(),
            "0".to_string(),
            "-write_id3v2".to_string(),
            "1".to_string(),
            "-c:a".to_string(),
            "pcm_s16be".to_string(),
            dest.to_string_lossy().into_owned(),
        ]
    }

    fn run(&self, path: &Path) -> Result<PathBuf, ConvertError> {
        let dest = Self::output_path(path);
        debug!(path = %path.display(), dest = %dest.display(), "Running ffmpeg");

        let output = Command::new(&self.binary)
            .args(Self::args(path, &dest))
            .output()
            .map_err(|source| ConvertError::Spawn {
                binary: self.binary.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(ConvertError::Failed {
                path: path.to_path_buf(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        std::fs::remove_file(path).map_err(|source| ConvertError::RemoveSource {
            path: path.to_path_buf(),
            source,
        })?;

        info!(path = %dest.display(), "Converted track");
        Ok(dest)
    }
}

impl Default for FfmpegConverter {
    fn default() -> Self {
        Self::new("ffmpeg")
    }
}

impl Converter for FfmpegConverter {
    fn convert(&self, path: &Path) -> anyhow::Result<PathBuf> {
        Ok(self.run(path)?)
    }
}
