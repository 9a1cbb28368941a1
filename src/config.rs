use crate::models::alert::AlertRoute;
use anyhow::{Context, Result};
use clap::Parser;
use serde::{Deserialize, Serialize};
use std::{
    collections::{BTreeMap, HashSet},
    env, fs, io,
    path::{Path, PathBuf},
    time::Duration,
};
use thiserror::Error;

/// Centralized application configuration.
/// Combines environment variables, CLI arguments and the monitor settings file.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub http_enabled: bool,
    pub config_path: PathBuf,
    pub settings: Settings,
}

/// Command-line + environment configuration.
#[derive(Parser, Debug)]
#[command(author, version, about = "Asset drop and transfer status monitor")]
pub struct Args {
    /// Monitor settings file (overrides TRANSFER_MONITOR_CONFIG)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Host for the status endpoints (overrides TRANSFER_MONITOR_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port for the status endpoints (overrides TRANSFER_MONITOR_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Do not serve the status endpoints
    #[arg(long)]
    pub no_http: bool,
}

impl AppConfig {
    /// Parse environment variables + CLI args, then load and validate the settings file.
    pub fn from_env_and_args() -> Result<Self> {
        let args = Args::parse();

        // --- Environment fallback ---
        let env_config = env::var("TRANSFER_MONITOR_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config.json"));
        let env_host = env::var("TRANSFER_MONITOR_HOST").unwrap_or_else(|_| "127.0.0.1".into());
        let env_port = match env::var("TRANSFER_MONITOR_PORT") {
            Ok(value) => value
                .parse::<u16>()
                .with_context(|| format!("parsing TRANSFER_MONITOR_PORT value `{}`", value))?,
            Err(env::VarError::NotPresent) => 3000,
            Err(err) => return Err(err).context("reading TRANSFER_MONITOR_PORT"),
        };

        // --- Merge ---
        let config_path = args.config.unwrap_or(env_config);
        let settings = Settings::from_file(&config_path)
            .with_context(|| format!("loading monitor settings from {}", config_path.display()))?;

        Ok(Self {
            host: args.host.unwrap_or(env_host),
            port: args.port.unwrap_or(env_port),
            http_enabled: !args.no_http,
            config_path,
            settings,
        })
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("reading settings file: {0}")]
    Io(#[from] io::Error),
    #[error("parsing settings: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("`{0}` must be greater than zero")]
    ZeroValue(&'static str),
    #[error("`{field}` must be at most {max}")]
    OutOfRange { field: &'static str, max: u64 },
    #[error(
        "in-progress threshold ({in_progress} min) must be lower than no-transfer threshold ({no_transfer} min)"
    )]
    InvertedThresholds { in_progress: u64, no_transfer: u64 },
    #[error("source `{0}` has no destination mapping")]
    UnmappedSource(String),
    #[error("destination mapping references unknown source `{0}`")]
    UnknownSource(String),
    #[error("source `{source_id}` maps to unknown destination `{destination}`")]
    UnknownDestination {
        source_id: String,
        destination: String,
    },
    #[error("source `{0}` maps to no destinations")]
    EmptyMapping(String),
}

/// How arrivals at source locations are discovered.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum IngestionMode {
    #[default]
    Polling,
    Events,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct StatusThresholds {
    pub no_transfer_threshold_minutes: u64,
    pub transfer_progress_threshold_minutes: u64,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Intervals {
    pub validation_minutes: u64,
    pub report_minutes: u64,
    pub performance_report_minutes: u64,
    pub transfer_status_alert_minutes: u64,
    #[serde(default = "default_polling_seconds")]
    pub polling_seconds: u64,
}

impl Intervals {
    pub fn validation(&self) -> Duration {
        Duration::from_secs(self.validation_minutes * 60)
    }

    pub fn report(&self) -> Duration {
        Duration::from_secs(self.report_minutes * 60)
    }

    pub fn performance_report(&self) -> Duration {
        Duration::from_secs(self.performance_report_minutes * 60)
    }

    pub fn polling(&self) -> Duration {
        Duration::from_secs(self.polling_seconds)
    }
}

/// Monitor settings, loaded once at startup and read-only afterwards.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Settings {
    /// Source location id -> directory.
    pub watch_folders: BTreeMap<String, PathBuf>,

    /// Destination location id -> directory.
    pub destination_folders: BTreeMap<String, PathBuf>,

    /// Source location id -> ordered destination ids it feeds.
    pub destination_mapping: BTreeMap<String, Vec<String>>,

    pub transfer_status_thresholds: StatusThresholds,

    /// Age after which an asset still sitting in its source is reported stuck.
    #[serde(default = "default_stuck_hours")]
    pub alert_threshold_hours: u64,

    pub intervals: Intervals,

    #[serde(default)]
    pub ingestion: IngestionMode,

    #[serde(default)]
    pub in_progress_alerts: AlertRoute,

    #[serde(default = "default_performance_file")]
    pub performance_file: PathBuf,

    /// When set, rendered alerts are appended here as JSON lines instead of logged.
    #[serde(default)]
    pub alert_outbox: Option<PathBuf>,

    #[serde(default = "default_suppression_window")]
    pub suppression_window_seconds: u64,
}

/// Longest accepted duration for any threshold or interval: one year.
const MAX_MINUTES: u64 = 365 * 24 * 60;

/// Upper bound for a duration setting, in the unit its name carries.
fn max_for(name: &str) -> u64 {
    if name.ends_with("_hours") {
        MAX_MINUTES / 60
    } else if name.ends_with("_seconds") {
        MAX_MINUTES * 60
    } else {
        MAX_MINUTES
    }
}

fn default_polling_seconds() -> u64 {
    2
}

fn default_stuck_hours() -> u64 {
    1
}

fn default_performance_file() -> PathBuf {
    PathBuf::from("transfer_performance.json")
}

fn default_suppression_window() -> u64 {
    30
}

impl Settings {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    /// Parse and validate a JSON settings document.
    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        let settings: Settings = serde_json::from_str(raw)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Reject configurations the engine cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let thresholds = &self.transfer_status_thresholds;
        let required = [
            (
                "no_transfer_threshold_minutes",
                thresholds.no_transfer_threshold_minutes,
            ),
            (
                "transfer_progress_threshold_minutes",
                thresholds.transfer_progress_threshold_minutes,
            ),
            ("alert_threshold_hours", self.alert_threshold_hours),
            ("validation_minutes", self.intervals.validation_minutes),
            ("report_minutes", self.intervals.report_minutes),
            (
                "performance_report_minutes",
                self.intervals.performance_report_minutes,
            ),
            (
                "transfer_status_alert_minutes",
                self.intervals.transfer_status_alert_minutes,
            ),
            ("polling_seconds", self.intervals.polling_seconds),
        ];
        if let Some((name, _)) = required.into_iter().find(|(_, value)| *value == 0) {
            return Err(ConfigError::ZeroValue(name));
        }

        let bounded = required
            .into_iter()
            .chain([(
                "suppression_window_seconds",
                self.suppression_window_seconds,
            )])
            .map(|(name, value)| (name, value, max_for(name)));
        for (field, value, max) in bounded {
            if value > max {
                return Err(ConfigError::OutOfRange { field, max });
            }
        }

        if thresholds.transfer_progress_threshold_minutes
            >= thresholds.no_transfer_threshold_minutes
        {
            return Err(ConfigError::InvertedThresholds {
                in_progress: thresholds.transfer_progress_threshold_minutes,
                no_transfer: thresholds.no_transfer_threshold_minutes,
            });
        }

        for source in self.watch_folders.keys() {
            if !self.destination_mapping.contains_key(source) {
                return Err(ConfigError::UnmappedSource(source.clone()));
            }
        }

        for (source, destinations) in &self.destination_mapping {
            if !self.watch_folders.contains_key(source) {
                return Err(ConfigError::UnknownSource(source.clone()));
            }
            if destinations.is_empty() {
                return Err(ConfigError::EmptyMapping(source.clone()));
            }
            if let Some(missing) = destinations
                .iter()
                .find(|dest| !self.destination_folders.contains_key(*dest))
            {
                return Err(ConfigError::UnknownDestination {
                    source_id: source.clone(),
                    destination: missing.clone(),
                });
            }
        }

        Ok(())
    }

    /// Destination ids and directories fed by `source`, in mapping order.
    pub fn destinations_for(&self, source: &str) -> Vec<(String, PathBuf)> {
        let Some(ids) = self.destination_mapping.get(source) else {
            return Vec::new();
        };

        let mut seen = HashSet::new();
        ids.iter()
            .filter(|id| seen.insert(id.as_str()))
            .filter_map(|id| {
                self.destination_folders
                    .get(id)
                    .map(|path| (id.clone(), path.clone()))
            })
            .collect()
    }

    pub fn source_root(&self, source: &str) -> Option<&Path> {
        self.watch_folders.get(source).map(PathBuf::as_path)
    }

    /// Every configured directory, sources first.
    pub fn all_folders(&self) -> impl Iterator<Item = &Path> {
        self.watch_folders
            .values()
            .chain(self.destination_folders.values())
            .map(PathBuf::as_path)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use serde_json::json;

    pub(crate) fn sample_json() -> serde_json::Value {
        json!({
            "watch_folders": { "INGEST": "/watch/ingest", "PROMO": "/watch/promo" },
            "destination_folders": { "ARCHIVE": "/dest/archive", "PLAYOUT": "/dest/playout" },
            "destination_mapping": {
                "INGEST": ["ARCHIVE", "PLAYOUT"],
                "PROMO": ["PLAYOUT"]
            },
            "transfer_status_thresholds": {
                "no_transfer_threshold_minutes": 15,
                "transfer_progress_threshold_minutes": 5
            },
            "intervals": {
                "validation_minutes": 1,
                "report_minutes": 60,
                "performance_report_minutes": 60,
                "transfer_status_alert_minutes": 15
            }
        })
    }

    #[test]
    fn parses_with_defaults() {
        let settings = Settings::from_json_str(&sample_json().to_string()).unwrap();
        assert_eq!(settings.alert_threshold_hours, 1);
        assert_eq!(settings.intervals.polling_seconds, 2);
        assert_eq!(settings.ingestion, IngestionMode::Polling);
        assert_eq!(settings.in_progress_alerts, AlertRoute::Immediate);
        assert_eq!(settings.suppression_window_seconds, 30);

        let dests = settings.destinations_for("INGEST");
        assert_eq!(dests.len(), 2);
        assert_eq!(dests[0].0, "ARCHIVE");
        assert_eq!(dests[1].1, PathBuf::from("/dest/playout"));
    }

    #[test]
    fn rejects_inverted_thresholds() {
        let mut raw = sample_json();
        raw["transfer_status_thresholds"]["transfer_progress_threshold_minutes"] = json!(15);
        let err = Settings::from_json_str(&raw.to_string()).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvertedThresholds {
                in_progress: 15,
                no_transfer: 15
            }
        ));
    }

    #[test]
    fn rejects_zero_threshold() {
        let mut raw = sample_json();
        raw["intervals"]["validation_minutes"] = json!(0);
        let err = Settings::from_json_str(&raw.to_string()).unwrap_err();
        assert!(matches!(err, ConfigError::ZeroValue("validation_minutes")));
    }

    #[test]
    fn rejects_durations_too_large_to_schedule() {
        let mut raw = sample_json();
        raw["alert_threshold_hours"] = json!(100_000_000_000_000_000u64);
        let err = Settings::from_json_str(&raw.to_string()).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::OutOfRange {
                field: "alert_threshold_hours",
                max: 8760
            }
        ));

        let mut raw = sample_json();
        raw["intervals"]["report_minutes"] = json!(u64::MAX);
        let err = Settings::from_json_str(&raw.to_string()).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::OutOfRange {
                field: "report_minutes",
                ..
            }
        ));

        let mut raw = sample_json();
        raw["suppression_window_seconds"] = json!(u64::MAX);
        assert!(Settings::from_json_str(&raw.to_string()).is_err());
    }

    #[test]
    fn accepts_one_year_limits() {
        let mut raw = sample_json();
        raw["alert_threshold_hours"] = json!(8760);
        raw["intervals"]["report_minutes"] = json!(525_600);
        let settings = Settings::from_json_str(&raw.to_string()).unwrap();
        let thresholds = crate::services::classifier::Thresholds::from_settings(&settings);
        assert_eq!(thresholds.stuck.num_hours(), 8760);
        assert_eq!(settings.intervals.report().as_secs(), 525_600 * 60);
    }

    #[test]
    fn rejects_unmapped_source() {
        let mut raw = sample_json();
        raw["destination_mapping"]
            .as_object_mut()
            .unwrap()
            .remove("PROMO");
        let err = Settings::from_json_str(&raw.to_string()).unwrap_err();
        assert!(matches!(err, ConfigError::UnmappedSource(ref s) if s == "PROMO"));
    }

    #[test]
    fn rejects_unknown_destination() {
        let mut raw = sample_json();
        raw["destination_mapping"]["PROMO"] = json!(["NOWHERE"]);
        let err = Settings::from_json_str(&raw.to_string()).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::UnknownDestination { ref destination, .. } if destination == "NOWHERE"
        ));
    }

    #[test]
    fn rejects_mapping_for_unknown_source() {
        let mut raw = sample_json();
        raw["destination_mapping"]["GHOST"] = json!(["ARCHIVE"]);
        let err = Settings::from_json_str(&raw.to_string()).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownSource(ref s) if s == "GHOST"));
    }
}
