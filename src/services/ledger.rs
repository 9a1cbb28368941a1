//! Drop ledger and duplication detector.
//!
//! The ledger is append-only; the detector keeps one record per
//! (source, asset name) key. Each table sits behind its own lock and every
//! read-modify-write happens inside a single lock scope.

use crate::models::{
    alert::{Alert, AlertKind},
    drop::{AssetDrop, AssetKey},
    duplication::DuplicationRecord,
};
use chrono::{DateTime, Utc};
use serde_json::json;
use std::collections::{BTreeMap, HashMap};
use tokio::sync::{Mutex, RwLock};

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Default)]
pub struct DropLedger {
    drops: RwLock<Vec<AssetDrop>>,
}

impl DropLedger {
    pub async fn append(&self, drop: AssetDrop) {
        self.drops.write().await.push(drop);
    }

    /// Copy of every recorded drop, in arrival order.
    pub async fn snapshot(&self) -> Vec<AssetDrop> {
        self.drops.read().await.clone()
    }

    pub async fn for_source(&self, source: &str) -> Vec<AssetDrop> {
        self.drops
            .read()
            .await
            .iter()
            .filter(|drop| drop.source == source)
            .cloned()
            .collect()
    }

    /// Number of drops per source id.
    pub async fn counts_by_source(&self) -> BTreeMap<String, usize> {
        let drops = self.drops.read().await;
        let mut counts = BTreeMap::new();
        for drop in drops.iter() {
            *counts.entry(drop.source.clone()).or_insert(0) += 1;
        }
        counts
    }

    pub async fn len(&self) -> usize {
        self.drops.read().await.len()
    }
}

#[derive(Default)]
pub struct DuplicationDetector {
    records: Mutex<HashMap<AssetKey, DuplicationRecord>>,
}

impl DuplicationDetector {
    /// Register a drop of `key`.
    ///
    /// The first drop seeds a record and returns `None`. Later drops bump the
    /// count and return a copy of the updated record.
    pub async fn observe(
        &self,
        key: &AssetKey,
        size: u64,
        at: DateTime<Utc>,
    ) -> Option<DuplicationRecord> {
        let mut records = self.records.lock().await;
        match records.get_mut(key) {
            Some(record) => {
                record.record_repeat(size, at);
                Some(record.clone())
            }
            None => {
                records.insert(key.clone(), DuplicationRecord::first_drop(size, at));
                None
            }
        }
    }

    /// Keys dropped more than once.
    pub async fn duplicated_keys(&self) -> usize {
        self.records
            .lock()
            .await
            .values()
            .filter(|record| record.duplication_count > 0)
            .count()
    }
}

/// Immediate alert for a repeated drop, carrying both original and current metadata.
pub fn duplicate_alert(drop: &AssetDrop, record: &DuplicationRecord) -> Alert {
    let version = record.version_label();
    let finding = json!({
        "File Name": drop.name,
        "File Type": drop.asset_type.to_string(),
        "Size of Previous File (bytes)": record.original_size(),
        "Size of Current File (bytes)": record.current_size,
        "Previous File Drop Time": record.original_drop_time().format(TIME_FORMAT).to_string(),
        "Current File Drop Time": record.current_drop_time.format(TIME_FORMAT).to_string(),
        "Duplicate Version": version,
        "Source Location": drop.source,
    });

    Alert::new(
        AlertKind::DuplicateDetected,
        "Transfer Status Alert - Immediate Action Required",
        format!(
            "Duplicate file detected: {} ({}) dropped in {} source folder.",
            drop.name, version, drop.source
        ),
    )
    .with_details(json!({ "Duplicate File Detection": [finding] }))
}

pub fn blank_folder_alert(drop: &AssetDrop) -> Alert {
    Alert::new(
        AlertKind::BlankFolder,
        "Blank Folder Alert",
        format!(
            "Blank folder detected:\nSource: {}\nFolder: {}\nTime: {}",
            drop.source,
            drop.name,
            drop.observed_at.format(TIME_FORMAT)
        ),
    )
    .with_details(json!({
        "Source Folder": drop.source,
        "Folder Name": drop.name,
        "Drop Time": drop.observed_at.format(TIME_FORMAT).to_string(),
    }))
}

/// The asset name leads the body so that distinct drops into one source
/// carry distinct fingerprints.
pub fn new_drop_alert(drop: &AssetDrop) -> Alert {
    let label = drop.kind.label();
    Alert::new(
        AlertKind::NewDrop,
        format!("Drop Alert Notification - {}", drop.source),
        format!(
            "New {} {} detected in {} watch folder.",
            label.to_lowercase(),
            drop.name,
            drop.source
        ),
    )
    .with_details(json!({
        "Source Folder": drop.source,
        "Asset Name": drop.name,
        "Asset Type": label,
        "File Count": drop.reported_count(),
    }))
}
