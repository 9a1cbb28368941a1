//! Read-only timing rows derived from tracked pairs.

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};

/// Sentinel shown wherever a timing is not yet known.
pub const IN_PROGRESS: &str = "In Progress";

/// A timing value that is either known or still pending.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Progress<T> {
    InProgress,
    Done(T),
}

impl<T: Serialize> Serialize for Progress<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Progress::InProgress => serializer.serialize_str(IN_PROGRESS),
            Progress::Done(value) => value.serialize(serializer),
        }
    }
}

/// Timing for one asset/destination pair.
#[derive(Serialize, Clone, Debug)]
pub struct PairTiming {
    /// Position of the asset in first-tracked order, starting at 1.
    pub serial: usize,
    pub asset_name: String,
    pub asset_type: String,
    pub source: String,
    pub destination: String,
    pub start_time: DateTime<Utc>,
    pub end_time: Progress<DateTime<Utc>>,
    pub elapsed_minutes: Progress<f64>,
}

/// Per-asset summary across all of its destinations.
#[derive(Serialize, Clone, Debug)]
pub struct PerformanceRow {
    pub asset_name: String,
    pub asset_type: String,
    pub source: String,
    pub count: usize,
    pub start_time: DateTime<Utc>,
    /// Latest destination arrival, or the start time while none has arrived.
    pub end_time: DateTime<Utc>,
    pub elapsed_minutes: Progress<f64>,
    /// `DEST: HH:MM:SS` for each completed destination.
    pub transfer_details: String,
}

#[derive(Serialize, Clone, Debug)]
pub struct PerformanceSnapshot {
    pub taken_at: DateTime<Utc>,
    pub pairs: Vec<PairTiming>,
    pub assets: Vec<PerformanceRow>,
}

/// Minutes between two instants, rounded to two decimals.
pub fn minutes_between(start: DateTime<Utc>, end: DateTime<Utc>) -> f64 {
    let minutes = (end - start).num_milliseconds() as f64 / 60_000.0;
    (minutes * 100.0).round() / 100.0
}
