//! Musical key estimation via keyfinder-cli
//!
//! Runs `keyfinder-cli -n camelot <path>`; stdout carries the estimated key.

use std::path::Path;
use std::process::Command;
use thiserror::Error;
use tracing::debug;

use super::KeyEstimator;

/// Key estimation errors
#[derive(Debug, Error)]
pub enum KeyfinderError {
    #[error("Failed to execute {0}: {1}")]
    Spawn(String, std::io::Error),

    #[error("Key detection failed for {0}: {1}")]
    Failed(String, String),

    /// Tool succeeded but printed something that is not a Camelot key
    #[error("Unrecognized key {0:?} for {1}")]
    InvalidKey(String, String),
}

/// Whether `key` is a Camelot key (`1A`..`12B`), ignoring leading zeros
pub fn is_valid_camelot(key: &str) -> bool {
    let key = key.trim().trim_start_matches('0');
    let Some(letter) = key.chars().last() else {
        return false;
    };
    if !matches!(letter, 'A' | 'B') {
        return false;
    }

    let number = &key[..key.len() - 1];
    number.chars().all(|c| c.is_ascii_digit()) && matches!(number.parse::<u8>(), Ok(1..=12))
}

/// Zero-pad a key to three characters (`8A` -> `08A`)
pub fn pad_key(key: &str) -> String {
    format!("{:0>3}", key.trim())
}

/// Key estimator backed by keyfinder-cli
#[derive(Debug, Clone)]
pub struct KeyfinderCli {
    binary: String,
}

impl KeyfinderCli {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    fn run(&self, path: &Path) -> Result<String, KeyfinderError> {
        let path_text = path.display().to_string();
        debug!(path = %path_text, "Running keyfinder");

        let output = Command::new(&self.binary)
            .arg("-n")
            .arg("camelot")
            .arg(path)
            .output()
            .map_err(|e| KeyfinderError::Spawn(self.binary.clone(), e))?;

        if !output.status.success() {
            return Err(KeyfinderError::Failed(
                path_text,
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }

        let key = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if !is_valid_camelot(&key) {
            return Err(KeyfinderError::InvalidKey(key, path_text));
        }

        Ok(key)
    }
}

impl Default for KeyfinderCli {
    fn default() -> Self {
        Self::new("keyfinder-cli")
    }
}

impl KeyEstimator for KeyfinderCli {
    fn estimate_key(&self, path: &Path) -> anyhow::Result<String> {
        Ok(self.run(path)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_camelot_keys() {
        for n in 1..=12 {
            assert!(is_valid_camelot(&format!("{}A", n)));
            assert!(is_valid_camelot(&format!("{}B", n)));
        }
        assert!(is_valid_camelot("08A"));
        assert!(is_valid_camelot("012B"));
    }

    #[test]
    fn test_invalid_camelot_keys() {
        for key in ["", "0A", "13A", "1C", "A", "Am", "C#m", "+1A", "00"] {
            assert!(!is_valid_camelot(key), "{:?} should be invalid", key);
        }
    }

    #[test]
    fn test_pad_key() {
        assert_eq!(pad_key("1A"), "01A");
        assert_eq!(pad_key("12B"), "12B");
        assert_eq!(pad_key("08A"), "08A");
    }

    #[test]
    fn test_missing_binary_is_spawn_error() {
        let keyfinder = KeyfinderCli::new("/nonexistent/keyfinder-cli");

        let err = keyfinder.run(Path::new("track.mp3")).unwrap_err();

        assert!(matches!(err, KeyfinderError::Spawn(ref bin, _) if bin == "/nonexistent/keyfinder-cli"));
        assert!(keyfinder.estimate_key(Path::new("track.mp3")).is_err());
    }

    #[cfg(unix)]
    #[test]
    fn test_tool_failure_names_the_track() {
        let err = KeyfinderCli::new("false")
            .run(Path::new("/import/track.mp3"))
            .unwrap_err();

        assert!(matches!(err, KeyfinderError::Failed(ref path, _) if path == "/import/track.mp3"));
    }

    #[cfg(unix)]
    #[test]
    fn test_empty_output_is_invalid_key() {
        let err = KeyfinderCli::new("true")
            .run(Path::new("/import/track.mp3"))
            .unwrap_err();

        assert!(matches!(err, KeyfinderError::InvalidKey(ref key, ref path)
            if key.is_empty() && path == "/import/track.mp3"));
    }
}
