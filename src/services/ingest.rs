//! Ingestion adapters.
//!
//! Both adapters discover new paths under the configured source folders and
//! hand each one to [`TransferMonitor::on_asset_observed`] exactly once per
//! process lifetime. Which one runs is chosen by the `ingestion` setting.

use crate::{config::IngestionMode, services::monitor::TransferMonitor};
use chrono::Utc;
use notify::{
    Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher, event::ModifyKind,
};
use std::{
    collections::HashSet,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};
use thiserror::Error;
use tokio::{
    sync::mpsc,
    task::{self, JoinHandle},
    time::{Instant, MissedTickBehavior, interval_at},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("starting filesystem watcher: {0}")]
    Watcher(#[source] notify::Error),
    #[error("watching `{path}`: {source}")]
    Watch {
        path: PathBuf,
        #[source]
        source: notify::Error,
    },
}

/// Start the configured ingestion adapter as a background task.
pub fn spawn_ingestion(
    monitor: Arc<TransferMonitor>,
    shutdown: CancellationToken,
) -> Result<JoinHandle<()>, IngestError> {
    let settings = monitor.settings();
    let sources: Vec<(String, PathBuf)> = settings
        .watch_folders
        .iter()
        .map(|(id, path)| (id.clone(), path.clone()))
        .collect();

    let mode = settings.ingestion;
    let every = settings.intervals.polling();

    match mode {
        IngestionMode::Polling => {
            Ok(tokio::spawn(run_polling(monitor, sources, every, shutdown)))
        }
        IngestionMode::Events => {
            let watcher = EventWatcher::start(&sources)?;
            Ok(tokio::spawn(run_events(monitor, watcher, shutdown)))
        }
    }
}

/// Scan-diff adapter: walks every source and reports paths it has not seen.
pub struct PollingScanner {
    sources: Vec<(String, PathBuf)>,
    seen: HashSet<PathBuf>,
}

impl PollingScanner {
    /// Build a scanner that treats everything already present as seen.
    pub async fn seeded(sources: Vec<(String, PathBuf)>) -> Self {
        let mut seen = HashSet::new();
        for (_, root) in &sources {
            seen.extend(walk(root).await);
        }
        Self { sources, seen }
    }

    pub fn known(&self) -> usize {
        self.seen.len()
    }

    /// New (source id, path) arrivals since the previous scan.
    pub async fn scan(&mut self) -> Vec<(String, PathBuf)> {
        let mut arrivals = Vec::new();
        for (source, root) in &self.sources {
            for path in walk(root).await {
                if self.seen.insert(path.clone()) {
                    arrivals.push((source.clone(), path));
                }
            }
        }
        arrivals
    }
}

async fn walk(root: &Path) -> Vec<PathBuf> {
    let root = root.to_path_buf();
    task::spawn_blocking(move || {
        WalkDir::new(&root)
            .min_depth(1)
            .sort_by_file_name()
            .into_iter()
            .filter_map(Result::ok)
            .map(|entry| entry.into_path())
            .collect::<Vec<_>>()
    })
    .await
    .unwrap_or_default()
}

async fn run_polling(
    monitor: Arc<TransferMonitor>,
    sources: Vec<(String, PathBuf)>,
    every: Duration,
    shutdown: CancellationToken,
) {
    let mut scanner = PollingScanner::seeded(sources).await;
    info!(known = scanner.known(), interval_secs = every.as_secs(), "Polling ingestion started");

    let mut timer = interval_at(Instant::now() + every, every);
    timer.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = timer.tick() => {
                for (source, path) in scanner.scan().await {
                    monitor.on_asset_observed(&source, &path, Utc::now()).await;
                }
            }
        }
    }

    info!("Polling ingestion stopped");
}

/// Native filesystem-event adapter.
pub struct EventWatcher {
    _watcher: RecommendedWatcher,
    events: mpsc::UnboundedReceiver<PathBuf>,
    roots: Vec<(String, PathBuf)>,
    seen: HashSet<PathBuf>,
}

impl EventWatcher {
    pub fn start(sources: &[(String, PathBuf)]) -> Result<Self, IngestError> {
        let (tx, events) = mpsc::unbounded_channel();
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
            Ok(event) if is_arrival(&event.kind) => {
                for path in event.paths {
                    let _ = tx.send(path);
                }
            }
            Ok(_) => {}
            Err(err) => warn!(error = %err, "Filesystem watcher error"),
        })
        .map_err(IngestError::Watcher)?;

        let mut roots = Vec::with_capacity(sources.len());
        for (source, root) in sources {
            let root = std::fs::canonicalize(root).unwrap_or_else(|_| root.clone());
            watcher
                .watch(&root, RecursiveMode::Recursive)
                .map_err(|err| IngestError::Watch {
                    path: root.clone(),
                    source: err,
                })?;
            roots.push((source.clone(), root));
        }

        Ok(Self {
            _watcher: watcher,
            events,
            roots,
            seen: HashSet::new(),
        })
    }

    /// Wait for the next path not reported before.
    pub async fn next_arrival(&mut self) -> Option<(String, PathBuf)> {
        while let Some(path) = self.events.recv().await {
            if !self.seen.insert(path.clone()) {
                continue;
            }
            match source_for(&self.roots, &path) {
                Some(source) => return Some((source.to_string(), path)),
                None => debug!(path = %path.display(), "Event outside watched sources"),
            }
        }
        None
    }
}

fn is_arrival(kind: &EventKind) -> bool {
    matches!(kind, EventKind::Create(_) | EventKind::Modify(ModifyKind::Name(_)))
}

/// Source id whose root most specifically contains `path`.
fn source_for<'a>(roots: &'a [(String, PathBuf)], path: &Path) -> Option<&'a str> {
    roots
        .iter()
        .filter(|(_, root)| path.starts_with(root))
        .max_by_key(|(_, root)| root.components().count())
        .map(|(source, _)| source.as_str())
}

async fn run_events(
    monitor: Arc<TransferMonitor>,
    mut watcher: EventWatcher,
    shutdown: CancellationToken,
) {
    info!(sources = watcher.roots.len(), "Event ingestion started");

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            arrival = watcher.next_arrival() => match arrival {
                Some((source, path)) => {
                    monitor.on_asset_observed(&source, &path, Utc::now()).await;
                }
                None => {
                    warn!("Filesystem watcher channel closed");
                    break;
                }
            }
        }
    }

    info!("Event ingestion stopped");
}
