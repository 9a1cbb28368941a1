//! Transfer status classifier.
//!
//! Each tick re-evaluates every outstanding (asset, destination) pair against
//! destination existence and elapsed time:
//!
//! 1. destination present                     -> `Transferred` (time recorded once)
//! 2. source present, past no-transfer limit  -> `Failed` (never transferred)
//! 3. source present, past in-progress limit  -> `InProgress`, or `Failed`
//!    (intermittent) when the previous tick already saw it in progress
//! 4. otherwise                               -> unchanged, no alert
//!
//! Existence checks run without holding the pair table lock; the resulting
//! transitions are then applied under one lock scope.

use crate::{
    config::Settings,
    models::{
        alert::{Alert, AlertKind, AlertRoute},
        drop::AssetDrop,
        transfer::{FailureCause, TransferPair, TransferStatus},
    },
    services::probe::PathProbe,
};
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use serde_json::json;
use std::{
    collections::{BTreeMap, HashMap},
    path::{Path, PathBuf},
};
use tokio::sync::Mutex;
use tracing::{debug, info};

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Clone, Copy, Debug)]
pub struct Thresholds {
    pub in_progress: Duration,
    pub no_transfer: Duration,
    pub stuck: Duration,
}

impl Thresholds {
    pub fn from_settings(settings: &Settings) -> Self {
        let t = &settings.transfer_status_thresholds;
        Self {
            in_progress: Duration::minutes(t.transfer_progress_threshold_minutes as i64),
            no_transfer: Duration::minutes(t.no_transfer_threshold_minutes as i64),
            stuck: Duration::hours(settings.alert_threshold_hours as i64),
        }
    }
}

/// Existence facts gathered for one pair during a tick.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Observation {
    pub source_exists: bool,
    pub destination_exists: bool,
}

/// One line of a transfer status alert.
#[derive(Serialize, Clone, Debug)]
pub struct StatusEntry {
    #[serde(rename = "Asset Name")]
    pub asset_name: String,
    #[serde(rename = "Asset Type")]
    pub asset_type: String,
    #[serde(rename = "Source Location")]
    pub source: String,
    #[serde(rename = "Destination Location")]
    pub destination: String,
    #[serde(rename = "Status")]
    pub status_label: String,
    #[serde(rename = "Root Cause Analysis")]
    pub root_cause: String,
    #[serde(rename = "Duration (minutes)")]
    pub duration_minutes: String,
    #[serde(rename = "Drop Time")]
    pub drop_time: String,
    #[serde(rename = "Log Analysis")]
    pub log_analysis: String,
    #[serde(skip)]
    pub source_path: PathBuf,
    #[serde(skip)]
    pub status: TransferStatus,
    #[serde(skip)]
    pub failure: Option<FailureCause>,
}

impl StatusEntry {
    fn new(pair: &TransferPair, observation: Observation, elapsed: Duration) -> Self {
        let minutes = elapsed.num_milliseconds() as f64 / 60_000.0;
        let root_cause = match pair.failure {
            Some(cause) => cause.root_cause(),
            None => "Transfer in Progress",
        };

        Self {
            asset_name: pair.asset.name.clone(),
            asset_type: pair.kind.label().to_string(),
            source: pair.asset.source.clone(),
            destination: pair.destination.clone(),
            status_label: pair.status.to_string(),
            root_cause: root_cause.to_string(),
            duration_minutes: format!("{minutes:.1}"),
            drop_time: pair.uploaded_at.format(TIME_FORMAT).to_string(),
            log_analysis: format!(
                "Source exists: {}, Destination exists: {}, Time elapsed: {:.1} min",
                observation.source_exists, observation.destination_exists, minutes
            ),
            source_path: pair.source_path.clone(),
            status: pair.status,
            failure: pair.failure,
        }
    }

    fn same_pair(&self, other: &StatusEntry) -> bool {
        self.source_path == other.source_path && self.destination == other.destination
    }
}

/// Apply one tick's observation to a pair.
///
/// Returns an entry when the pair ends the tick `InProgress` or `Failed`
/// through branches 2 or 3.
pub fn classify(
    pair: &mut TransferPair,
    observation: Observation,
    thresholds: &Thresholds,
    now: DateTime<Utc>,
) -> Option<StatusEntry> {
    if !pair.is_outstanding() {
        return None;
    }

    if observation.destination_exists {
        pair.record_transfer(now);
        return None;
    }

    let elapsed = now - pair.uploaded_at;
    if !observation.source_exists || elapsed <= thresholds.in_progress {
        return None;
    }

    if elapsed > thresholds.no_transfer {
        pair.fail(FailureCause::NeverTransferred);
    } else if pair.seen_in_progress {
        pair.fail(FailureCause::Intermittent);
    } else {
        pair.status = TransferStatus::InProgress;
        pair.seen_in_progress = true;
    }

    Some(StatusEntry::new(pair, observation, elapsed))
}

/// Every pair ever tracked, in first-tracked order.
///
/// Pairs are keyed by the drop's source path and the destination id, so a
/// repeat drop of the same name from another path gets its own pair set.
#[derive(Default)]
pub struct PairTable {
    pairs: Vec<TransferPair>,
    index: HashMap<(PathBuf, String), usize>,
}

impl PairTable {
    /// Add a pair unless one with the same identity is already tracked.
    pub fn register(&mut self, pair: TransferPair) -> bool {
        let key = (pair.source_path.clone(), pair.destination.clone());
        if self.index.contains_key(&key) {
            return false;
        }
        self.index.insert(key, self.pairs.len());
        self.pairs.push(pair);
        true
    }

    pub fn pairs(&self) -> &[TransferPair] {
        &self.pairs
    }

    pub fn status_counts(&self) -> BTreeMap<TransferStatus, usize> {
        let mut counts = BTreeMap::new();
        for pair in &self.pairs {
            *counts.entry(pair.status).or_insert(0) += 1;
        }
        counts
    }
}

struct ScheduledBatch {
    entries: Vec<StatusEntry>,
    last_flush: DateTime<Utc>,
}

/// Alerts produced by one classifier tick.
#[derive(Debug, Default)]
pub struct TickOutcome {
    pub immediate: Option<Alert>,
    pub scheduled: Option<Alert>,
    pub stuck: Vec<Alert>,
}

impl TickOutcome {
    pub fn into_alerts(self) -> Vec<Alert> {
        self.immediate
            .into_iter()
            .chain(self.scheduled)
            .chain(self.stuck)
            .collect()
    }
}

pub struct Classifier {
    thresholds: Thresholds,
    in_progress_route: AlertRoute,
    scheduled_every: Duration,
    pairs: Mutex<PairTable>,
    scheduled: Mutex<ScheduledBatch>,
}

impl Classifier {
    pub fn new(
        thresholds: Thresholds,
        in_progress_route: AlertRoute,
        scheduled_every: Duration,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            thresholds,
            in_progress_route,
            scheduled_every,
            pairs: Mutex::new(PairTable::default()),
            scheduled: Mutex::new(ScheduledBatch {
                entries: Vec::new(),
                last_flush: started_at,
            }),
        }
    }

    pub fn from_settings(settings: &Settings, started_at: DateTime<Utc>) -> Self {
        Self::new(
            Thresholds::from_settings(settings),
            settings.in_progress_alerts,
            Duration::minutes(settings.intervals.transfer_status_alert_minutes as i64),
            started_at,
        )
    }

    /// Fan a drop out into one pair per destination. Returns how many were new.
    pub async fn track(&self, drop: &AssetDrop, destinations: &[(String, PathBuf)]) -> usize {
        let mut table = self.pairs.lock().await;
        let mut added = 0;
        for (destination, root) in destinations {
            if table.register(TransferPair::new(drop, destination, root)) {
                added += 1;
            } else {
                debug!(asset = %drop.key(), %destination, "Pair already tracked");
            }
        }
        added
    }

    /// Copy of every tracked pair, in first-tracked order.
    pub async fn pairs(&self) -> Vec<TransferPair> {
        self.pairs.lock().await.pairs().to_vec()
    }

    pub async fn status_counts(&self) -> BTreeMap<TransferStatus, usize> {
        self.pairs.lock().await.status_counts()
    }

    /// Run one classification tick at `now`.
    pub async fn evaluate(
        &self,
        probe: &dyn PathProbe,
        drops: &[AssetDrop],
        now: DateTime<Utc>,
    ) -> TickOutcome {
        let outstanding: Vec<(usize, PathBuf, PathBuf)> = {
            let table = self.pairs.lock().await;
            table
                .pairs()
                .iter()
                .enumerate()
                .filter(|(_, pair)| pair.is_outstanding())
                .map(|(idx, pair)| {
                    (
                        idx,
                        pair.source_path.clone(),
                        pair.destination_path.clone(),
                    )
                })
                .collect()
        };

        let mut sources = SourceCache::new(probe);
        let mut observations = Vec::with_capacity(outstanding.len());
        for (idx, source, destination) in outstanding {
            observations.push((
                idx,
                Observation {
                    source_exists: sources.exists(&source).await,
                    destination_exists: probe.exists(&destination).await,
                },
            ));
        }

        let mut stuck = Vec::new();
        for drop in drops {
            if now - drop.observed_at > self.thresholds.stuck && sources.exists(&drop.path).await {
                stuck.push(stuck_alert(drop, &self.thresholds, now));
            }
        }

        let mut immediate = Vec::new();
        let mut deferred = Vec::new();
        {
            let mut table = self.pairs.lock().await;
            for (idx, observation) in observations {
                let Some(pair) = table.pairs.get_mut(idx) else {
                    continue;
                };
                let Some(entry) = classify(pair, observation, &self.thresholds, now) else {
                    continue;
                };
                match self.route_for(entry.status) {
                    AlertRoute::Immediate => immediate.push(entry),
                    AlertRoute::Scheduled => deferred.push(entry),
                }
            }
        }

        if !immediate.is_empty() {
            info!(count = immediate.len(), "Transfer issues need immediate attention");
        }

        TickOutcome {
            immediate: (!immediate.is_empty()).then(|| immediate_alert(&immediate)),
            scheduled: self.queue_scheduled(deferred, now).await,
            stuck,
        }
    }

    fn route_for(&self, status: TransferStatus) -> AlertRoute {
        match status {
            TransferStatus::InProgress => self.in_progress_route,
            _ => AlertRoute::Immediate,
        }
    }

    /// Accumulate scheduled entries and flush them once the batch interval has passed.
    async fn queue_scheduled(
        &self,
        entries: Vec<StatusEntry>,
        now: DateTime<Utc>,
    ) -> Option<Alert> {
        let mut batch = self.scheduled.lock().await;
        for entry in entries {
            match batch.entries.iter_mut().find(|queued| queued.same_pair(&entry)) {
                Some(queued) => *queued = entry,
                None => batch.entries.push(entry),
            }
        }

        if batch.entries.is_empty() || now - batch.last_flush < self.scheduled_every {
            return None;
        }

        batch.last_flush = now;
        let entries = std::mem::take(&mut batch.entries);
        Some(scheduled_alert(&entries))
    }
}

/// Memoizes source existence within a single tick.
struct SourceCache<'a> {
    probe: &'a dyn PathProbe,
    seen: HashMap<PathBuf, bool>,
}

impl<'a> SourceCache<'a> {
    fn new(probe: &'a dyn PathProbe) -> Self {
        Self {
            probe,
            seen: HashMap::new(),
        }
    }

    async fn exists(&mut self, path: &Path) -> bool {
        if let Some(known) = self.seen.get(path) {
            return *known;
        }
        let exists = self.probe.exists(path).await;
        self.seen.insert(path.to_path_buf(), exists);
        exists
    }
}

fn immediate_alert(entries: &[StatusEntry]) -> Alert {
    Alert::new(
        AlertKind::TransferStatus,
        "Transfer Status Alert - Immediate Action Required",
        format!(
            "Critical transfer issues detected for {} assets requiring immediate attention.",
            entries.len()
        ),
    )
    .with_details(json!({ "Transfer Status Details": entries }))
}

fn scheduled_alert(entries: &[StatusEntry]) -> Alert {
    Alert::new(
        AlertKind::ScheduledTransferStatus,
        "Transfer Status Alert - Scheduled Check",
        format!(
            "Transfer status issues detected for {} assets during scheduled monitoring.",
            entries.len()
        ),
    )
    .with_details(json!({ "Transfer Status Details": entries }))
}

fn stuck_alert(drop: &AssetDrop, thresholds: &Thresholds, now: DateTime<Utc>) -> Alert {
    let age = now - drop.observed_at;
    Alert::new(
        AlertKind::StuckAsset,
        "File Stuck Alert",
        format!(
            "File/folder stuck for more than {} hour(s) in {} watch folder.",
            thresholds.stuck.num_hours(),
            drop.source
        ),
    )
    .with_details(json!({
        "Source Folder": drop.source,
        "Asset Name": drop.name,
        "Drop Time": drop.observed_at.format(TIME_FORMAT).to_string(),
        "Duration": format!("{}h {:02}m", age.num_hours(), age.num_minutes() % 60),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        models::drop::{AssetKind, AssetType},
        services::probe::LocalFs,
    };
    use tempfile::TempDir;

    fn thresholds() -> Thresholds {
        Thresholds {
            in_progress: Duration::minutes(5),
            no_transfer: Duration::minutes(15),
            stuck: Duration::hours(1),
        }
    }

    fn drop_at(path: PathBuf, observed_at: DateTime<Utc>) -> AssetDrop {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        AssetDrop {
            source: "INGEST".into(),
            asset_type: AssetType::from_file_name(&name),
            name,
            path,
            observed_at,
            kind: AssetKind::File,
            file_count: 0,
            size_bytes: 1,
        }
    }

    fn pair_at(observed_at: DateTime<Utc>) -> TransferPair {
        let drop = drop_at(PathBuf::from("/watch/ingest/game.mp4"), observed_at);
        TransferPair::new(&drop, "ARCHIVE", Path::new("/dest/archive"))
    }

    const ABSENT: Observation = Observation {
        source_exists: true,
        destination_exists: false,
    };

    #[test]
    fn follows_elapsed_time_thresholds() {
        let start = Utc::now();
        let t = thresholds();
        let mut pair = pair_at(start);

        assert!(classify(&mut pair, ABSENT, &t, start + Duration::minutes(4)).is_none());
        assert_eq!(pair.status, TransferStatus::Pending);

        let entry = classify(&mut pair, ABSENT, &t, start + Duration::minutes(6)).unwrap();
        assert_eq!(entry.status, TransferStatus::InProgress);
        assert_eq!(pair.status, TransferStatus::InProgress);

        let entry = classify(&mut pair, ABSENT, &t, start + Duration::minutes(6)).unwrap();
        assert_eq!(entry.status, TransferStatus::Failed);
        assert_eq!(pair.failure, Some(FailureCause::Intermittent));
    }

    #[test]
    fn long_absence_without_progress_is_never_transferred() {
        let start = Utc::now();
        let mut pair = pair_at(start);

        let entry = classify(&mut pair, ABSENT, &thresholds(), start + Duration::minutes(16)).unwrap();
        assert_eq!(entry.failure, Some(FailureCause::NeverTransferred));
        assert_eq!(
            entry.root_cause,
            FailureCause::NeverTransferred.root_cause()
        );
    }

    #[test]
    fn first_tick_past_in_progress_limit_is_never_intermittent() {
        let start = Utc::now();
        let mut pair = pair_at(start);

        let entry = classify(&mut pair, ABSENT, &thresholds(), start + Duration::minutes(10)).unwrap();
        assert_eq!(entry.status, TransferStatus::InProgress);
        assert_ne!(pair.failure, Some(FailureCause::Intermittent));
    }

    #[test]
    fn missing_source_keeps_pair_pending() {
        let start = Utc::now();
        let mut pair = pair_at(start);
        let gone = Observation {
            source_exists: false,
            destination_exists: false,
        };

        assert!(classify(&mut pair, gone, &thresholds(), start + Duration::minutes(30)).is_none());
        assert_eq!(pair.status, TransferStatus::Pending);
    }

    #[test]
    fn failed_pair_can_still_complete() {
        let start = Utc::now();
        let mut pair = pair_at(start);
        classify(&mut pair, ABSENT, &thresholds(), start + Duration::minutes(20));
        assert_eq!(pair.status, TransferStatus::Failed);

        let arrived = Observation {
            source_exists: true,
            destination_exists: true,
        };
        let at = start + Duration::minutes(21);
        assert!(classify(&mut pair, arrived, &thresholds(), at).is_none());
        assert_eq!(pair.status, TransferStatus::Transferred);
        assert_eq!(pair.transferred_at(), Some(at));
        assert_eq!(pair.failure, None);
    }

    struct Fixture {
        _dir: TempDir,
        source: PathBuf,
        dest_root: PathBuf,
    }

    fn fixture() -> Fixture {
        let dir = TempDir::new().unwrap();
        let source_root = dir.path().join("watch");
        let dest_root = dir.path().join("archive");
        std::fs::create_dir_all(&source_root).unwrap();
        std::fs::create_dir_all(&dest_root).unwrap();
        let source = source_root.join("game.mp4");
        std::fs::write(&source, b"frames").unwrap();
        Fixture {
            _dir: dir,
            source,
            dest_root,
        }
    }

    fn classifier(route: AlertRoute, start: DateTime<Utc>) -> Classifier {
        Classifier::new(thresholds(), route, Duration::minutes(15), start)
    }

    #[tokio::test]
    async fn transfer_time_survives_destination_churn() {
        let fx = fixture();
        let start = Utc::now();
        let drop = drop_at(fx.source.clone(), start);
        let classifier = classifier(AlertRoute::Immediate, start);
        let dests = vec![("ARCHIVE".to_string(), fx.dest_root.clone())];
        assert_eq!(classifier.track(&drop, &dests).await, 1);

        let landed = fx.dest_root.join("game.mp4");
        std::fs::write(&landed, b"frames").unwrap();
        let first = start + Duration::minutes(2);
        classifier.evaluate(&LocalFs, &[drop.clone()], first).await;

        std::fs::remove_file(&landed).unwrap();
        classifier
            .evaluate(&LocalFs, &[drop.clone()], start + Duration::minutes(20))
            .await;
        std::fs::write(&landed, b"frames").unwrap();
        classifier
            .evaluate(&LocalFs, &[drop.clone()], start + Duration::minutes(30))
            .await;

        let pairs = classifier.pairs().await;
        assert_eq!(pairs[0].status, TransferStatus::Transferred);
        assert_eq!(pairs[0].transferred_at(), Some(first));
    }

    #[tokio::test]
    async fn immediate_alerts_are_batched_per_tick() {
        let fx = fixture();
        let start = Utc::now();
        let drop = drop_at(fx.source.clone(), start);
        let classifier = classifier(AlertRoute::Immediate, start);
        let dests = vec![
            ("ARCHIVE".to_string(), fx.dest_root.clone()),
            ("PLAYOUT".to_string(), fx.dest_root.join("playout")),
        ];
        classifier.track(&drop, &dests).await;

        let quiet = classifier
            .evaluate(&LocalFs, &[drop.clone()], start + Duration::minutes(1))
            .await;
        assert!(quiet.immediate.is_none());

        let outcome = classifier
            .evaluate(&LocalFs, &[drop.clone()], start + Duration::minutes(6))
            .await;
        let alert = outcome.immediate.unwrap();
        assert_eq!(alert.kind, AlertKind::TransferStatus);
        assert!(alert.body.contains("for 2 assets"));
        assert_eq!(
            alert.details["Transfer Status Details"][0]["Status"],
            "In Progress"
        );
        assert!(outcome.scheduled.is_none());
    }

    #[tokio::test]
    async fn scheduled_alerts_wait_for_batch_interval() {
        let fx = fixture();
        let start = Utc::now();
        let drop = drop_at(fx.source.clone(), start);
        let classifier = classifier(AlertRoute::Scheduled, start);
        classifier
            .track(&drop, &[("ARCHIVE".to_string(), fx.dest_root.clone())])
            .await;

        let early = classifier
            .evaluate(&LocalFs, &[drop.clone()], start + Duration::minutes(6))
            .await;
        assert!(early.immediate.is_none());
        assert!(early.scheduled.is_none());

        // Past the no-transfer limit the pair fails, which is always immediate.
        let later = classifier
            .evaluate(&LocalFs, &[drop.clone()], start + Duration::minutes(16))
            .await;
        assert!(later.immediate.is_some());
        let scheduled = later.scheduled.unwrap();
        assert_eq!(scheduled.kind, AlertKind::ScheduledTransferStatus);
        assert!(scheduled.body.contains("for 1 assets"));

        let drained = classifier
            .evaluate(&LocalFs, &[drop.clone()], start + Duration::minutes(40))
            .await;
        assert!(drained.scheduled.is_none());
    }

    #[tokio::test]
    async fn old_drops_still_in_source_are_stuck() {
        let fx = fixture();
        let start = Utc::now();
        let drop = drop_at(fx.source.clone(), start);
        let vanished = drop_at(fx.source.with_file_name("moved.mp4"), start);
        let classifier = classifier(AlertRoute::Immediate, start);

        let young = classifier
            .evaluate(&LocalFs, &[drop.clone()], start + Duration::minutes(30))
            .await;
        assert!(young.stuck.is_empty());

        let outcome = classifier
            .evaluate(&LocalFs, &[drop, vanished], start + Duration::minutes(61))
            .await;
        assert_eq!(outcome.stuck.len(), 1);
        assert_eq!(outcome.stuck[0].kind, AlertKind::StuckAsset);
        assert_eq!(outcome.stuck[0].details["Asset Name"], "game.mp4");
    }

    #[tokio::test]
    async fn repeat_drop_gets_its_own_pairs() {
        let fx = fixture();
        let start = Utc::now();
        let classifier = classifier(AlertRoute::Immediate, start);
        let dests = vec![("ARCHIVE".to_string(), fx.dest_root.clone())];

        let resend_dir = fx.source.with_file_name("resend");
        std::fs::create_dir_all(&resend_dir).unwrap();
        let resent = resend_dir.join("game.mp4");
        std::fs::write(&resent, b"frames-v2").unwrap();

        let first = drop_at(fx.source.clone(), start);
        let again = drop_at(resent.clone(), start + Duration::minutes(3));
        assert_eq!(classifier.track(&first, &dests).await, 1);
        assert_eq!(classifier.track(&again, &dests).await, 1);
        assert_eq!(classifier.track(&again, &dests).await, 0);

        let pairs = classifier.pairs().await;
        assert_eq!(pairs.len(), 2);
        assert_eq!(pairs[0].uploaded_at, start);
        assert_eq!(pairs[1].uploaded_at, start + Duration::minutes(3));
        assert_eq!(pairs[1].source_path, resent);
    }

    #[tokio::test]
    async fn repeat_drop_is_classified_from_its_own_path() {
        let fx = fixture();
        let start = Utc::now();
        let classifier = classifier(AlertRoute::Immediate, start);
        let dests = vec![("ARCHIVE".to_string(), fx.dest_root.clone())];

        let first = drop_at(fx.source.clone(), start);
        classifier.track(&first, &dests).await;
        std::fs::remove_file(&fx.source).unwrap();

        let resend_dir = fx.source.with_file_name("resend");
        std::fs::create_dir_all(&resend_dir).unwrap();
        let resent = resend_dir.join("game.mp4");
        std::fs::write(&resent, b"frames-v2").unwrap();
        let again = drop_at(resent.clone(), start + Duration::minutes(20));
        classifier.track(&again, &dests).await;

        let outcome = classifier
            .evaluate(&LocalFs, &[first, again], start + Duration::minutes(36))
            .await;
        let alert = outcome.immediate.unwrap();
        assert!(alert.body.contains("for 1 assets"));
        assert_eq!(
            alert.details["Transfer Status Details"][0]["Status"],
            "Failed"
        );

        let pairs = classifier.pairs().await;
        assert_eq!(pairs[0].status, TransferStatus::Pending);
        assert_eq!(pairs[1].status, TransferStatus::Failed);
    }
}
