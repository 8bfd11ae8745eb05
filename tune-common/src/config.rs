//! Configuration file loading and import root resolution
//!
//! Settings are resolved in priority order:
//! 1. Command-line argument / environment variable (handled by the binary)
//! 2. TOML config file
//! 3. OS-dependent compiled default (fallback)
//!
//! A missing config file is not an error: a warning is logged and defaults
//! are used. A config file that exists but cannot be parsed is an error.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Application directory name used under the platform config/data dirs
pub const APP_DIR: &str = "tune-manager";

/// TOML configuration file contents
///
/// Every field is optional so a partial file only overrides what it names.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TomlConfig {
    /// Directory watched for incoming tracks
    pub import_path: Option<PathBuf>,
    /// Listen address for the client endpoint (e.g. "127.0.0.1:9000")
    pub bind: Option<String>,
    /// Event batch flush period in milliseconds
    pub batch_period_ms: Option<u64>,
    /// Interval between file size polls while waiting for a copy to finish
    pub stability_poll_ms: Option<u64>,
    /// Worker pool size (defaults to the number of CPU cores)
    pub workers: Option<usize>,
    /// Optional upper bound on a single pipeline stage
    pub stage_timeout_ms: Option<u64>,
    /// How long a rename source waits for its destination before it counts as a delete
    pub rename_grace_ms: Option<u64>,
    /// Logging configuration
    pub logging: LoggingConfig,
    /// Format conversion tool
    pub converter: ConverterConfig,
    /// Key estimation tool
    pub keyfinder: KeyfinderConfig,
    /// Beatport metadata lookup
    pub beatport: BeatportConfig,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default tracing level when RUST_LOG is unset
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// ffmpeg settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConverterConfig {
    /// Path or name of the ffmpeg binary
    pub ffmpeg: Option<String>,
}

/// keyfinder-cli settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeyfinderConfig {
    /// Path or name of the keyfinder-cli binary
    pub binary: Option<String>,
}

/// Beatport API settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BeatportConfig {
    /// API base URL
    pub base_url: Option<String>,
    /// Bearer token; lookups are disabled without one
    pub token: Option<String>,
}

/// Default config file location for the platform
///
/// `~/.config/tune-manager/config.toml` on Linux, the equivalent per-user
/// config directory elsewhere.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join(APP_DIR).join("config.toml"))
}

/// Load a TOML config file, falling back to defaults if it does not exist
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    if !path.exists() {
        warn!(
            "Config file {} not found, using defaults",
            path.display()
        );
        return Ok(TomlConfig::default());
    }

    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
    let config: TomlConfig = toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse {} failed: {}", path.display(), e)))?;

    info!("Loaded config from {}", path.display());
    Ok(config)
}

/// Resolve the import root
///
/// `explicit` is the command-line/environment value, which wins over the
/// TOML file; the compiled default is used when neither is set.
pub fn resolve_import_path(explicit: Option<PathBuf>, toml: &TomlConfig) -> PathBuf {
    if let Some(path) = explicit {
        return path;
    }

    if let Some(path) = &toml.import_path {
        return path.clone();
    }

    default_import_path()
}

/// OS-dependent default import root
///
/// `~/Music/Import` when the platform exposes a music directory, otherwise a
/// folder under the per-user data directory.
pub fn default_import_path() -> PathBuf {
    dirs::audio_dir()
        .map(|d| d.join("Import"))
        .or_else(|| dirs::data_local_dir().map(|d| d.join(APP_DIR).join("import")))
        .unwrap_or_else(|| PathBuf::from("./import"))
}
