use anyhow::{Context, Result};
use axum::Router;
use chrono::Utc;
use std::{fs, io::ErrorKind, sync::Arc};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

mod config;
mod errors;
mod handlers;
mod models;
mod routes;
mod services;

use services::{
    aggregator::JsonSnapshotWriter,
    ingest::spawn_ingestion,
    monitor::TransferMonitor,
    notifier::{LogNotifier, Notifier, OutboxNotifier},
    probe::LocalFs,
    workers::spawn_workers,
};

#[tokio::main]
async fn main() -> Result<()> {
    // --- Logging setup ---
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // --- Parse config + settings file ---
    let cfg = config::AppConfig::from_env_and_args()?;

    tracing::info!(
        "Starting transfer-monitor with settings from {}",
        cfg.config_path.display()
    );
    tracing::debug!("Config: {:?}", cfg);

    // --- Ensure every watched folder exists ---
    for folder in cfg.settings.all_folders() {
        if !folder.exists() {
            fs::create_dir_all(folder)
                .with_context(|| format!("creating folder {}", folder.display()))?;
            tracing::info!("Created folder {}", folder.display());
        }
    }

    // --- Initialize core service ---
    let notifier: Arc<dyn Notifier> = match &cfg.settings.alert_outbox {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent)
                    .with_context(|| format!("creating outbox folder {}", parent.display()))?;
            }
            tracing::info!("Writing alerts to outbox {}", path.display());
            Arc::new(OutboxNotifier::new(path.clone()))
        }
        None => Arc::new(LogNotifier),
    };
    let snapshots = Arc::new(JsonSnapshotWriter::new(
        cfg.settings.performance_file.clone(),
    ));
    let monitor = Arc::new(TransferMonitor::new(
        Arc::new(cfg.settings.clone()),
        Arc::new(LocalFs),
        notifier,
        snapshots,
        Utc::now(),
    ));

    // --- Background tasks ---
    let shutdown = CancellationToken::new();
    let mut handles = spawn_workers(monitor.clone(), shutdown.clone());
    handles.push(spawn_ingestion(monitor.clone(), shutdown.clone())?);

    if cfg.http_enabled {
        let app: Router = routes::routes::routes().with_state(monitor.clone());
        let listener = bind(&cfg).await?;
        tracing::info!("Status endpoints on http://{}", listener.local_addr()?);

        let token = shutdown.clone();
        handles.push(tokio::spawn(async move {
            let served = axum::serve(listener, app)
                .with_graceful_shutdown(async move { token.cancelled().await })
                .await;
            if let Err(err) = served {
                tracing::error!("Status server stopped: {}", err);
            }
        }));
    }

    tokio::signal::ctrl_c()
        .await
        .context("waiting for shutdown signal")?;
    tracing::info!("Shutdown requested, stopping {} tasks", handles.len());
    shutdown.cancel();

    for handle in handles {
        if let Err(err) = handle.await {
            tracing::warn!("Background task ended abnormally: {}", err);
        }
    }

    tracing::info!("Stopped");
    Ok(())
}

async fn bind(cfg: &config::AppConfig) -> Result<TcpListener> {
    let addr = cfg.addr();
    match TcpListener::bind(&addr).await {
        Ok(listener) => Ok(listener),
        Err(err)
            if err.kind() == ErrorKind::PermissionDenied
                && matches!(cfg.host.as_str(), "0.0.0.0" | "::") =>
        {
            let fallback_addr = format!("127.0.0.1:{}", cfg.port);
            tracing::warn!(
                "Permission denied binding to {} ({}). Falling back to {}",
                addr,
                err,
                fallback_addr
            );
            Ok(TcpListener::bind(&fallback_addr).await?)
        }
        Err(err) => Err(err.into()),
    }
}
