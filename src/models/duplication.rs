//! Tracks repeated drops of the same (source, asset name) key.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Original and latest metadata for a key that may have been dropped more than once.
///
/// The `original_*` fields are written once, on the first drop, and only
/// readable afterwards.
#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
pub struct DuplicationRecord {
    original_size: u64,
    original_drop_time: DateTime<Utc>,
    pub current_size: u64,
    pub current_drop_time: DateTime<Utc>,
    pub duplication_count: u32,
}

impl DuplicationRecord {
    pub fn first_drop(size: u64, at: DateTime<Utc>) -> Self {
        Self {
            original_size: size,
            original_drop_time: at,
            current_size: size,
            current_drop_time: at,
            duplication_count: 0,
        }
    }

    /// Register another drop of the same key.
    pub fn record_repeat(&mut self, size: u64, at: DateTime<Utc>) {
        self.duplication_count += 1;
        self.current_size = size;
        self.current_drop_time = at;
    }

    pub fn original_size(&self) -> u64 {
        self.original_size
    }

    pub fn original_drop_time(&self) -> DateTime<Utc> {
        self.original_drop_time
    }

    /// Synthetic version label of the latest drop (`V2` for the first repeat).
    pub fn version_label(&self) -> String {
        format!("V{}", self.duplication_count + 1)
    }
}
