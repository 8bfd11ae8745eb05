//! tune-importer - import folder service
//!
//! Watches the import folder, runs discovered tracks through conversion, key
//! estimation and Beatport enrichment, and streams track state to connected
//! clients over a WebSocket.

use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use tune_common::config::{default_config_path, load_toml_config};

use tune_importer::config::{Cli, ImporterConfig};
use tune_importer::services::{
    event_queue, fault_channel, ConnectionRegistry, Dispatcher, FaultReceiver, FileEventSink,
    FsWatcher, TrackProcessor, TrackRegistry, WorkerPool,
};
use tune_importer::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_path = cli.config.clone().or_else(default_config_path);
    let toml = match &config_path {
        Some(path) => load_toml_config(path)?,
        None => Default::default(),
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| toml.logging.level.as_str().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting tune-importer v{}", env!("CARGO_PKG_VERSION"));
    info!(
        "Build: {} ({}, {})",
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );

    let config = ImporterConfig::resolve(&cli, &toml)?;

    std::fs::create_dir_all(&config.import_path).with_context(|| {
        format!(
            "Failed to create import directory {}",
            config.import_path.display()
        )
    })?;
    let import_path = config
        .import_path
        .canonicalize()
        .context("Failed to resolve import directory")?;
    info!("Import directory: {}", import_path.display());

    let (queue, events) = event_queue::channel();
    let registry = Arc::new(TrackRegistry::new(import_path.clone(), queue));
    let connections = Arc::new(ConnectionRegistry::new(Arc::clone(&registry)));

    let (fault_sink, mut faults) = fault_channel();
    let pool = WorkerPool::new(config.workers, fault_sink, config.stage_timeout);
    info!("Worker pool: {} workers", pool.size());

    let collaborators = tune_importer::build_collaborators(&config)?;
    let processor = TrackProcessor::new(
        Arc::clone(&registry),
        pool.clone(),
        collaborators,
        config.stability_poll,
    );

    let shutdown = CancellationToken::new();

    // Watch before scanning so conversions started by the scan are observed
    let sink: Arc<dyn FileEventSink> = Arc::new(processor.clone());
    let watcher = FsWatcher::new(&import_path, sink, config.rename_grace)
        .start(shutdown.clone())
        .context("Failed to watch import directory")?;

    processor.add_all()?;

    let dispatcher = Dispatcher::new(events, Arc::clone(&connections), config.batch_period);
    let dispatch_task = tokio::spawn(dispatcher.run(shutdown.clone()));

    let app = tune_importer::build_router(AppState::new(processor, connections));

    let listener = tokio::net::TcpListener::bind(config.bind)
        .await
        .context("Failed to bind to address")?;
    info!("Listening on {}", config.bind);

    let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<bool>();
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        let faulted = wait_for_stop(&mut faults).await;
        signal_token.cancel();
        let _ = stop_tx.send(faulted);
    });

    let server_token = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { server_token.cancelled().await })
        .await
        .context("Server error")?;

    let faulted = stop_rx.await.unwrap_or(false);

    let _ = watcher.await;
    let _ = dispatch_task.await;
    info!("Waiting for {} in-flight jobs", pool.in_flight());
    pool.shutdown().await;

    if faulted {
        anyhow::bail!("Stopped after a pipeline stage failure");
    }

    info!("Shutdown complete");
    Ok(())
}

/// Resolve when the process should stop; true if a stage fault caused it
async fn wait_for_stop(faults: &mut FaultReceiver) -> bool {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
            false
        }
        _ = terminate => {
            info!("Received terminate signal, shutting down");
            false
        }
        fault = faults.recv() => {
            match fault {
                Some(fault) => error!("Shutting down after stage failure: {}", fault),
                None => error!("Fault channel closed, shutting down"),
            }
            true
        }
    }
}
