//! tune-importer library interface
//!
//! Exposes the pipeline, registry and HTTP surface for the binary and for
//! integration testing.

pub mod api;
pub mod config;
pub mod error;
pub mod external;
pub mod models;
pub mod services;
pub mod utils;

pub use crate::error::{ApiError, ApiResult};

use axum::{routing::get, Router};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::config::ImporterConfig;
use crate::external::{
    BeatportClient, Collaborators, DisabledLookup, FfmpegConverter, JpegNormalizer, KeyfinderCli,
    LoftyTagStore, MetadataLookup,
};
use crate::services::connections::ConnectionRegistry;
use crate::services::pipeline::TrackProcessor;
use crate::services::registry::TrackRegistry;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<TrackRegistry>,
    pub connections: Arc<ConnectionRegistry>,
    pub processor: TrackProcessor,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    pub fn new(processor: TrackProcessor, connections: Arc<ConnectionRegistry>) -> Self {
        Self {
            registry: Arc::clone(processor.registry()),
            connections,
            processor,
            startup_time: Utc::now(),
        }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(api::ws_handler))
        .merge(api::track_routes())
        .merge(api::health_routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Concrete external collaborators for a resolved configuration
///
/// Must be called from within a tokio runtime.
pub fn build_collaborators(config: &ImporterConfig) -> anyhow::Result<Collaborators> {
    let lookup: Arc<dyn MetadataLookup> = match &config.beatport_token {
        Some(token) => Arc::new(BeatportClient::new(
            config.beatport_base_url.clone(),
            token.clone(),
        )?),
        None => {
            info!("No Beatport token configured, metadata lookup disabled");
            Arc::new(DisabledLookup)
        }
    };

    Ok(Collaborators {
        converter: Arc::new(FfmpegConverter::new(config.ffmpeg.clone())),
        key_estimator: Arc::new(KeyfinderCli::new(config.keyfinder.clone())),
        lookup,
        tags: Arc::new(LoftyTagStore::new()),
        artwork: Arc::new(JpegNormalizer::new()),
    })
}
