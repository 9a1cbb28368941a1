//! Represents one (asset, destination) tracking unit.

use super::drop::{AssetDrop, AssetKey, AssetKind, AssetType};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::{
    fmt,
    path::{Path, PathBuf},
};
use tracing::warn;

/// Inferred transfer status of a pair.
#[derive(Serialize, Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TransferStatus {
    Pending,
    InProgress,
    Transferred,
    Failed,
}

impl fmt::Display for TransferStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            TransferStatus::Pending => "Pending",
            TransferStatus::InProgress => "In Progress",
            TransferStatus::Transferred => "Transferred",
            TransferStatus::Failed => "Failed",
        };
        f.write_str(label)
    }
}

/// Why a pair was classified as failed.
#[derive(Serialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum FailureCause {
    /// Source still present past the no-transfer threshold.
    NeverTransferred,
    /// Was in progress on an earlier tick and still has not arrived.
    Intermittent,
}

impl FailureCause {
    pub fn root_cause(self) -> &'static str {
        match self {
            FailureCause::NeverTransferred => {
                "Transfer Failed - File Present in Source but Not Transferred"
            }
            FailureCause::Intermittent => {
                "Intermittent Transfer Failure - Transfer was in progress but is not completed"
            }
        }
    }
}

/// A single asset/destination pair as tracked by the classifier.
#[derive(Serialize, Clone, Debug)]
pub struct TransferPair {
    pub asset: AssetKey,

    /// Destination location id.
    pub destination: String,

    /// Where the asset is expected to appear at the destination.
    pub destination_path: PathBuf,

    /// Where the asset was dropped.
    pub source_path: PathBuf,

    pub kind: AssetKind,

    pub asset_type: AssetType,

    pub file_count: usize,

    pub status: TransferStatus,

    /// Set while `status` is `Failed`.
    pub failure: Option<FailureCause>,

    /// Cached "was last seen in progress" flag, read on the following tick.
    pub seen_in_progress: bool,

    /// Copied from the owning drop.
    pub uploaded_at: DateTime<Utc>,

    transferred_at: Option<DateTime<Utc>>,
}

impl TransferPair {
    pub fn new(drop: &AssetDrop, destination: &str, destination_root: &Path) -> Self {
        Self {
            asset: drop.key(),
            destination: destination.to_string(),
            destination_path: destination_root.join(&drop.name),
            source_path: drop.path.clone(),
            kind: drop.kind,
            asset_type: drop.asset_type,
            file_count: drop.file_count,
            status: TransferStatus::Pending,
            failure: None,
            seen_in_progress: false,
            uploaded_at: drop.observed_at,
            transferred_at: None,
        }
    }

    pub fn transferred_at(&self) -> Option<DateTime<Utc>> {
        self.transferred_at
    }

    /// Pairs that have not reached `Transferred` are re-evaluated every tick.
    pub fn is_outstanding(&self) -> bool {
        self.transferred_at.is_none()
    }

    /// Mark the pair transferred, recording `at` only if no time was recorded yet.
    ///
    /// Returns `false` when a timestamp already existed; the existing value is kept.
    pub fn record_transfer(&mut self, at: DateTime<Utc>) -> bool {
        self.status = TransferStatus::Transferred;
        self.failure = None;

        if let Some(existing) = self.transferred_at {
            warn!(
                asset = %self.asset,
                destination = %self.destination,
                %existing,
                rejected = %at,
                "Ignoring attempt to overwrite recorded transfer time"
            );
            return false;
        }

        self.transferred_at = Some(at);
        true
    }

    pub fn fail(&mut self, cause: FailureCause) {
        self.status = TransferStatus::Failed;
        self.failure = Some(cause);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn sample_drop() -> AssetDrop {
        AssetDrop {
            source: "INGEST".into(),
            name: "game.mp4".into(),
            path: PathBuf::from("/watch/ingest/game.mp4"),
            observed_at: Utc::now(),
            kind: AssetKind::File,
            asset_type: AssetType::Video,
            file_count: 0,
            size_bytes: 42,
        }
    }

    #[test]
    fn destination_path_is_root_joined_with_name() {
        let pair = TransferPair::new(&sample_drop(), "ARCHIVE", Path::new("/dest/archive"));
        assert_eq!(pair.destination_path, PathBuf::from("/dest/archive/game.mp4"));
        assert_eq!(pair.status, TransferStatus::Pending);
        assert!(pair.is_outstanding());
    }

    #[test]
    fn transfer_time_is_recorded_once() {
        let mut pair = TransferPair::new(&sample_drop(), "ARCHIVE", Path::new("/dest"));
        let first = Utc::now();

        assert!(pair.record_transfer(first));
        assert!(!pair.record_transfer(first + Duration::minutes(5)));
        assert_eq!(pair.transferred_at(), Some(first));
        assert_eq!(pair.status, TransferStatus::Transferred);
    }
}
