//! Runtime configuration for tune-importer
//!
//! Command-line flags (each also readable from a `TUNE_*` environment
//! variable) override the TOML config file, which overrides the compiled
//! defaults.

use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use tune_common::config::{resolve_import_path, TomlConfig};
use tune_common::{Error, Result};

use crate::external::beatport::DEFAULT_BASE_URL;
use crate::services::dispatcher::DEFAULT_BATCH_PERIOD;
use crate::services::pipeline::DEFAULT_STABILITY_POLL;
use crate::services::watcher::DEFAULT_RENAME_GRACE;

/// Default listen address for the client endpoint
pub const DEFAULT_BIND: &str = "127.0.0.1:9000";

/// Command-line arguments for tune-importer
#[derive(Parser, Debug, Default, Clone)]
#[command(name = "tune-importer")]
#[command(about = "Watches an import folder and streams track state to connected clients")]
#[command(version)]
pub struct Cli {
    /// Path to the TOML config file
    #[arg(short, long, env = "TUNE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Directory watched for incoming tracks
    #[arg(short, long, env = "TUNE_IMPORT_PATH")]
    pub import_path: Option<PathBuf>,

    /// Listen address for the client endpoint
    #[arg(short, long, env = "TUNE_BIND")]
    pub bind: Option<String>,

    /// Event batch period in milliseconds
    #[arg(long, env = "TUNE_BATCH_PERIOD_MS")]
    pub batch_period_ms: Option<u64>,

    /// Worker pool size
    #[arg(short, long, env = "TUNE_WORKERS")]
    pub workers: Option<usize>,
}

/// Fully resolved importer settings
#[derive(Debug, Clone, PartialEq)]
pub struct ImporterConfig {
    pub import_path: PathBuf,
    pub bind: SocketAddr,
    pub batch_period: Duration,
    pub stability_poll: Duration,
    pub workers: usize,
    pub stage_timeout: Option<Duration>,
    pub rename_grace: Duration,
    pub log_level: String,
    pub ffmpeg: String,
    pub keyfinder: String,
    pub beatport_base_url: String,
    pub beatport_token: Option<String>,
}

impl ImporterConfig {
    /// Merge command-line values over the TOML file and defaults
    pub fn resolve(cli: &Cli, toml: &TomlConfig) -> Result<Self> {
        let bind_text = cli
            .bind
            .clone()
            .or_else(|| toml.bind.clone())
            .unwrap_or_else(|| DEFAULT_BIND.to_string());
        let bind = bind_text
            .parse::<SocketAddr>()
            .map_err(|e| Error::Config(format!("Invalid bind address {}: {}", bind_text, e)))?;

        let workers = cli
            .workers
            .or(toml.workers)
            .unwrap_or_else(num_cpus::get);
        if workers == 0 {
            return Err(Error::Config("Worker pool size must be at least 1".to_string()));
        }

        let batch_period = cli
            .batch_period_ms
            .or(toml.batch_period_ms)
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_BATCH_PERIOD);
        if batch_period.is_zero() {
            return Err(Error::Config("Batch period must be positive".to_string()));
        }

        Ok(Self {
            import_path: resolve_import_path(cli.import_path.clone(), toml),
            bind,
            batch_period,
            stability_poll: toml
                .stability_poll_ms
                .map(Duration::from_millis)
                .unwrap_or(DEFAULT_STABILITY_POLL),
            workers,
            stage_timeout: toml.stage_timeout_ms.map(Duration::from_millis),
            rename_grace: toml
                .rename_grace_ms
                .map(Duration::from_millis)
                .unwrap_or(DEFAULT_RENAME_GRACE),
            log_level: toml.logging.level.clone(),
            ffmpeg: toml
                .converter
                .ffmpeg
                .clone()
                .unwrap_or_else(|| "ffmpeg".to_string()),
            keyfinder: toml
                .keyfinder
                .binary
                .clone()
                .unwrap_or_else(|| "keyfinder-cli".to_string()),
            beatport_base_url: toml
                .beatport
                .base_url
                .clone()
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            beatport_token: toml.beatport.token.clone().filter(|t| !t.trim().is_empty()),
        })
    }
}
