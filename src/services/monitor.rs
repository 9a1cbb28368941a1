//! TransferMonitor: the shared engine behind every periodic worker.
//!
//! Ingestion calls [`TransferMonitor::on_asset_observed`]; the validation,
//! report and performance workers call the matching `run_*` method on their
//! own cadence. Each shared table is owned by one component with its own
//! lock, and alerts are always dispatched after those locks are released.

use crate::{
    config::Settings,
    models::{
        alert::{Alert, AlertKind},
        drop::{AssetDrop, AssetType},
        performance::PerformanceSnapshot,
        transfer::TransferStatus,
    },
    services::{
        aggregator::{SnapshotWriter, build_snapshot, performance_report_alert},
        classifier::Classifier,
        dispatcher::Dispatcher,
        ledger::{DropLedger, DuplicationDetector, blank_folder_alert, duplicate_alert, new_drop_alert},
        notifier::Notifier,
        probe::PathProbe,
    },
};
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use serde_json::json;
use std::{collections::BTreeMap, path::Path, sync::Arc};
use tracing::{debug, info, warn};

/// Counts exposed by the status endpoint.
#[derive(Serialize, Debug)]
pub struct StatusSummary {
    pub total_drops: usize,
    pub drops_by_source: BTreeMap<String, usize>,
    pub pairs_by_status: BTreeMap<String, usize>,
    pub duplicated_assets: usize,
}

pub struct TransferMonitor {
    settings: Arc<Settings>,
    probe: Arc<dyn PathProbe>,
    ledger: DropLedger,
    duplicates: DuplicationDetector,
    classifier: Classifier,
    dispatcher: Dispatcher,
    snapshots: Arc<dyn SnapshotWriter>,
}

impl TransferMonitor {
    pub fn new(
        settings: Arc<Settings>,
        probe: Arc<dyn PathProbe>,
        notifier: Arc<dyn Notifier>,
        snapshots: Arc<dyn SnapshotWriter>,
        started_at: DateTime<Utc>,
    ) -> Self {
        let window = Duration::seconds(settings.suppression_window_seconds as i64);
        Self {
            classifier: Classifier::from_settings(&settings, started_at),
            dispatcher: Dispatcher::new(notifier, window),
            ledger: DropLedger::default(),
            duplicates: DuplicationDetector::default(),
            settings,
            probe,
            snapshots,
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn ledger(&self) -> &DropLedger {
        &self.ledger
    }

    pub fn probe(&self) -> &dyn PathProbe {
        self.probe.as_ref()
    }

    /// Record an arrival reported by the ingestion collaborator.
    ///
    /// Returns `None` when the source id is unknown or the path vanished
    /// before it could be inspected.
    pub async fn on_asset_observed(
        &self,
        source: &str,
        path: &Path,
        observed_at: DateTime<Utc>,
    ) -> Option<AssetDrop> {
        if self.settings.source_root(source).is_none() {
            warn!(source, path = %path.display(), "Ignoring arrival for unconfigured source");
            return None;
        }

        let Some(info) = self.probe.inspect(path).await else {
            debug!(source, path = %path.display(), "Arrival vanished before inspection");
            return None;
        };

        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());

        let drop = AssetDrop {
            source: source.to_string(),
            asset_type: AssetType::for_asset(&name, info.kind),
            name,
            path: path.to_path_buf(),
            observed_at,
            kind: info.kind,
            file_count: info.file_count,
            size_bytes: info.size_bytes,
        };

        info!(
            source,
            asset = %drop.name,
            kind = drop.kind.label(),
            files = drop.file_count,
            "Asset dropped"
        );

        let mut alerts = Vec::new();
        if drop.is_blank_folder() {
            alerts.push(blank_folder_alert(&drop));
        }
        if let Some(record) = self
            .duplicates
            .observe(&drop.key(), drop.size_bytes, observed_at)
            .await
        {
            info!(asset = %drop.key(), version = %record.version_label(), "Duplicate drop detected");
            alerts.push(duplicate_alert(&drop, &record));
        }

        self.ledger.append(drop.clone()).await;
        let destinations = self.settings.destinations_for(source);
        self.classifier.track(&drop, &destinations).await;
        alerts.push(new_drop_alert(&drop));

        self.dispatch_all(alerts, observed_at).await;
        Some(drop)
    }

    /// One classification tick.
    pub async fn run_validation(&self, now: DateTime<Utc>) {
        let drops = self.ledger.snapshot().await;
        let outcome = self
            .classifier
            .evaluate(self.probe.as_ref(), &drops, now)
            .await;
        self.dispatch_all(outcome.into_alerts(), now).await;
    }

    /// Scheduled monitoring report: drops per source and files per destination.
    pub async fn run_report(&self, now: DateTime<Utc>) {
        let counts = self.ledger.counts_by_source().await;
        let dropped: Vec<_> = self
            .settings
            .watch_folders
            .keys()
            .map(|source| {
                json!({
                    "Source": source,
                    "Files Count": counts.get(source).copied().unwrap_or(0),
                })
            })
            .collect();

        let mut transferred = Vec::new();
        let mut total_transfers = 0;
        for (destination, root) in &self.settings.destination_folders {
            let count = self.probe.count_files(root).await;
            total_transfers += count;
            transferred.push(json!({ "Destination": destination, "Files Count": count }));
        }

        let total_drops: usize = counts.values().sum();
        let alert = Alert::new(
            AlertKind::MonitoringReport,
            "Transfer Monitoring Notification",
            format!(
                "Asset Transfer Monitoring Details - {} total items monitored, {} transfers completed.",
                total_drops, total_transfers
            ),
        )
        .with_details(json!({
            "Dropped Files Summary Count at Source": dropped,
            "Transferred Files Summary Count at Destination": transferred,
            "Total Transfers": total_transfers,
        }));

        self.dispatcher.notify_at(alert, now).await;
    }

    pub async fn performance_snapshot(&self, now: DateTime<Utc>) -> PerformanceSnapshot {
        build_snapshot(&self.classifier.pairs().await, now)
    }

    /// Write the latest snapshot and send it as a performance report.
    pub async fn run_performance_report(&self, now: DateTime<Utc>) {
        let snapshot = self.performance_snapshot(now).await;
        let attachment = match self.snapshots.write_snapshot(&snapshot).await {
            Ok(path) => {
                debug!(path = %path.display(), rows = snapshot.pairs.len(), "Performance snapshot written");
                Some(path)
            }
            Err(err) => {
                warn!(error = %err, "Could not write performance snapshot");
                None
            }
        };

        self.dispatcher
            .notify_at(performance_report_alert(&snapshot, attachment), now)
            .await;
    }

    pub async fn status(&self) -> StatusSummary {
        let drops_by_source = self.ledger.counts_by_source().await;
        let pairs_by_status = self
            .classifier
            .status_counts()
            .await
            .into_iter()
            .map(|(status, count): (TransferStatus, usize)| (status.to_string(), count))
            .collect();

        StatusSummary {
            total_drops: self.ledger.len().await,
            drops_by_source,
            pairs_by_status,
            duplicated_assets: self.duplicates.duplicated_keys().await,
        }
    }

    async fn dispatch_all(&self, alerts: Vec<Alert>, now: DateTime<Utc>) {
        for alert in alerts {
            self.dispatcher.notify_at(alert, now).await;
        }
    }
}
