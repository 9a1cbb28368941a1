//! Performance aggregation and snapshot persistence.

use crate::models::{
    alert::{Alert, AlertKind},
    drop::AssetKind,
    performance::{PairTiming, PerformanceRow, PerformanceSnapshot, Progress, minutes_between},
    transfer::TransferPair,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::json;
use std::{
    collections::HashMap,
    io,
    path::{Path, PathBuf},
};
use thiserror::Error;
use tokio::fs;
use uuid::Uuid;

/// Build timing rows from tracked pairs, preserving first-tracked order.
///
/// Each drop (one source path) is one asset row, so a repeat drop of the
/// same name is summarized separately.
pub fn build_snapshot(pairs: &[TransferPair], taken_at: DateTime<Utc>) -> PerformanceSnapshot {
    let mut serials: HashMap<&Path, usize> = HashMap::new();
    let mut assets: Vec<AssetAccumulator<'_>> = Vec::new();
    let mut rows = Vec::with_capacity(pairs.len());

    for pair in pairs {
        let key = pair.source_path.as_path();
        let serial = match serials.get(&key) {
            Some(serial) => *serial,
            None => {
                assets.push(AssetAccumulator::new(pair));
                serials.insert(key, assets.len());
                assets.len()
            }
        };

        let (end_time, elapsed_minutes) = match pair.transferred_at() {
            Some(at) => (
                Progress::Done(at),
                Progress::Done(minutes_between(pair.uploaded_at, at)),
            ),
            None => (Progress::InProgress, Progress::InProgress),
        };

        if let Some(at) = pair.transferred_at() {
            assets[serial - 1]
                .completed
                .push((pair.destination.as_str(), at));
        }

        rows.push(PairTiming {
            serial,
            asset_name: pair.asset.name.clone(),
            asset_type: pair.asset_type.to_string(),
            source: pair.asset.source.clone(),
            destination: pair.destination.clone(),
            start_time: pair.uploaded_at,
            end_time,
            elapsed_minutes,
        });
    }

    PerformanceSnapshot {
        taken_at,
        pairs: rows,
        assets: assets.into_iter().map(AssetAccumulator::finish).collect(),
    }
}

struct AssetAccumulator<'a> {
    first: &'a TransferPair,
    completed: Vec<(&'a str, DateTime<Utc>)>,
}

impl<'a> AssetAccumulator<'a> {
    fn new(first: &'a TransferPair) -> Self {
        Self {
            first,
            completed: Vec::new(),
        }
    }

    fn finish(self) -> PerformanceRow {
        let start = self.first.uploaded_at;
        let latest = self.completed.iter().map(|(_, at)| *at).max();
        let details = self
            .completed
            .iter()
            .map(|(dest, at)| format!("{}: {}", dest, at.format("%H:%M:%S")))
            .collect::<Vec<_>>()
            .join(", ");

        PerformanceRow {
            asset_name: self.first.asset.name.clone(),
            asset_type: self.first.asset_type.to_string(),
            source: self.first.asset.source.clone(),
            count: match self.first.kind {
                AssetKind::Directory => self.first.file_count,
                AssetKind::File => 1,
            },
            start_time: start,
            end_time: latest.unwrap_or(start),
            elapsed_minutes: match latest {
                Some(end) => Progress::Done(minutes_between(start, end)),
                None => Progress::InProgress,
            },
            transfer_details: details,
        }
    }
}

/// Alert announcing a fresh performance snapshot.
pub fn performance_report_alert(
    snapshot: &PerformanceSnapshot,
    attachment: Option<PathBuf>,
) -> Alert {
    let body = match attachment {
        Some(_) => format!(
            "Performance Report - Total {} transfers tracked. See attached file.",
            snapshot.assets.len()
        ),
        None => format!(
            "Performance Report - Total {} transfers tracked.",
            snapshot.assets.len()
        ),
    };

    let alert = Alert::new(AlertKind::PerformanceReport, "Performance Report", body).with_details(
        json!({
            "Total Transfers": snapshot.assets.len(),
            "Assets": snapshot.assets,
        }),
    );

    match attachment {
        Some(path) => alert.with_attachment(path),
        None => alert,
    }
}

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("encoding snapshot: {0}")]
    Encode(#[from] serde_json::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Persists a snapshot and returns where it was written.
#[async_trait]
pub trait SnapshotWriter: Send + Sync {
    async fn write_snapshot(&self, snapshot: &PerformanceSnapshot) -> Result<PathBuf, SnapshotError>;
}

/// Writes snapshots as pretty JSON, replacing the previous file atomically.
#[derive(Clone, Debug)]
pub struct JsonSnapshotWriter {
    path: PathBuf,
}

impl JsonSnapshotWriter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl SnapshotWriter for JsonSnapshotWriter {
    async fn write_snapshot(&self, snapshot: &PerformanceSnapshot) -> Result<PathBuf, SnapshotError> {
        let bytes = serde_json::to_vec_pretty(snapshot)?;

        let parent = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&parent).await?;

        let tmp_path = parent.join(format!(".tmp-{}", Uuid::new_v4()));
        if let Err(err) = write_then_rename(&tmp_path, &self.path, &bytes).await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(err.into());
        }

        Ok(self.path.clone())
    }
}

async fn write_then_rename(tmp_path: &Path, final_path: &Path, bytes: &[u8]) -> io::Result<()> {
    fs::write(tmp_path, bytes).await?;
    fs::rename(tmp_path, final_path).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        drop::{AssetDrop, AssetType},
        performance::IN_PROGRESS,
    };
    use chrono::Duration;
    use tempfile::TempDir;

    fn pairs_for(name: &str, kind: AssetKind, start: DateTime<Utc>, dests: &[&str]) -> Vec<TransferPair> {
        let drop = AssetDrop {
            source: "INGEST".into(),
            name: name.into(),
            path: PathBuf::from(format!("/watch/{name}")),
            observed_at: start,
            kind,
            asset_type: AssetType::for_asset(name, kind),
            file_count: 3,
            size_bytes: 0,
        };
        dests
            .iter()
            .map(|dest| TransferPair::new(&drop, dest, Path::new("/dest")))
            .collect()
    }

    #[test]
    fn untransferred_pairs_report_sentinel() {
        let start = Utc::now();
        let pairs = pairs_for("game.mp4", AssetKind::File, start, &["ARCHIVE", "PLAYOUT"]);
        let snapshot = build_snapshot(&pairs, start + Duration::minutes(3));

        assert_eq!(snapshot.pairs.len(), 2);
        for row in &snapshot.pairs {
            assert_eq!(row.elapsed_minutes, Progress::InProgress);
            assert_eq!(row.end_time, Progress::InProgress);
        }

        let asset = &snapshot.assets[0];
        assert_eq!(asset.end_time, start);
        assert_eq!(asset.elapsed_minutes, Progress::InProgress);
        assert_eq!(asset.count, 1);

        let encoded = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(encoded["pairs"][0]["elapsed_minutes"], IN_PROGRESS);
    }

    #[test]
    fn completed_destinations_feed_asset_summary() {
        let start = Utc::now();
        let mut pairs = pairs_for("batch", AssetKind::Directory, start, &["ARCHIVE", "PLAYOUT"]);
        pairs.extend(pairs_for("promo.mov", AssetKind::File, start, &["ARCHIVE"]));
        pairs[0].record_transfer(start + Duration::minutes(2));
        pairs[1].record_transfer(start + Duration::minutes(7));

        let snapshot = build_snapshot(&pairs, start + Duration::minutes(10));

        assert_eq!(snapshot.pairs[0].serial, 1);
        assert_eq!(snapshot.pairs[2].serial, 2);
        assert_eq!(snapshot.pairs[0].elapsed_minutes, Progress::Done(2.0));

        let batch = &snapshot.assets[0];
        assert_eq!(batch.asset_type, "Folder");
        assert_eq!(batch.count, 3);
        assert_eq!(batch.end_time, start + Duration::minutes(7));
        assert_eq!(batch.elapsed_minutes, Progress::Done(7.0));
        assert!(batch.transfer_details.starts_with("ARCHIVE: "));
        assert!(batch.transfer_details.contains(", PLAYOUT: "));

        assert_eq!(snapshot.assets[1].elapsed_minutes, Progress::InProgress);
    }

    #[tokio::test]
    async fn json_writer_replaces_previous_file() {
        let dir = TempDir::new().unwrap();
        let writer = JsonSnapshotWriter::new(dir.path().join("reports/perf.json"));
        let start = Utc::now();

        let empty = build_snapshot(&[], start);
        writer.write_snapshot(&empty).await.unwrap();

        let pairs = pairs_for("game.mp4", AssetKind::File, start, &["ARCHIVE"]);
        let path = writer
            .write_snapshot(&build_snapshot(&pairs, start))
            .await
            .unwrap();

        let written: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(written["assets"][0]["asset_name"], "game.mp4");

        let leftovers = std::fs::read_dir(dir.path().join("reports"))
            .unwrap()
            .filter_map(Result::ok)
            .filter(|e| e.file_name().to_string_lossy().starts_with(".tmp-"))
            .count();
        assert_eq!(leftovers, 0);
    }

    #[test]
    fn report_alert_mentions_attachment_only_when_present() {
        let snapshot = build_snapshot(&[], Utc::now());
        let with = performance_report_alert(&snapshot, Some(PathBuf::from("perf.json")));
        let without = performance_report_alert(&snapshot, None);
        assert!(with.body.contains("See attached file"));
        assert!(!without.body.contains("attached"));
        assert_eq!(without.attachment, None);
    }

    #[test]
    fn repeat_drops_get_separate_serials() {
        let start = Utc::now();
        let mut pairs = pairs_for("game.mp4", AssetKind::File, start, &["ARCHIVE"]);
        let mut resent = pairs_for("game.mp4", AssetKind::File, start + Duration::minutes(5), &["ARCHIVE"]);
        resent[0].source_path = PathBuf::from("/watch/resend/game.mp4");
        pairs.extend(resent);

        let snapshot = build_snapshot(&pairs, start + Duration::minutes(10));
        assert_eq!(snapshot.pairs[0].serial, 1);
        assert_eq!(snapshot.pairs[1].serial, 2);
        assert_eq!(snapshot.assets.len(), 2);
        assert_eq!(snapshot.assets[1].start_time, start + Duration::minutes(5));
    }
}
