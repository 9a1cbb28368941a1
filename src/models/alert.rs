//! Alerts produced by the engine and handed to the dispatcher.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::{fmt, path::PathBuf};

/// Number of body characters that take part in an alert fingerprint.
pub const FINGERPRINT_BODY_CHARS: usize = 50;

/// What produced an alert. Presentation switches on this tag.
#[derive(Serialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AlertKind {
    NewDrop,
    BlankFolder,
    DuplicateDetected,
    TransferStatus,
    ScheduledTransferStatus,
    StuckAsset,
    MonitoringReport,
    PerformanceReport,
}

impl AlertKind {
    pub fn severity(self) -> Severity {
        match self {
            AlertKind::BlankFolder
            | AlertKind::DuplicateDetected
            | AlertKind::TransferStatus
            | AlertKind::ScheduledTransferStatus
            | AlertKind::StuckAsset => Severity::Critical,
            AlertKind::MonitoringReport | AlertKind::PerformanceReport => Severity::Info,
            AlertKind::NewDrop => Severity::Success,
        }
    }

    /// Human-readable category label shown by the presentation layer.
    pub fn category(self) -> &'static str {
        match self {
            AlertKind::NewDrop => "Drop Alert Notification",
            AlertKind::BlankFolder => "Blank Folder Alert",
            AlertKind::DuplicateDetected | AlertKind::TransferStatus => "Transfer Status Alert",
            AlertKind::ScheduledTransferStatus => "Transfer Status Report",
            AlertKind::StuckAsset => "Stuck File Alert",
            AlertKind::MonitoringReport => "Monitor Report",
            AlertKind::PerformanceReport => "Performance Report",
        }
    }
}

#[derive(Serialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical,
    Info,
    Success,
}

impl Severity {
    /// Style class consumed by HTML templates.
    pub fn css_class(self) -> &'static str {
        match self {
            Severity::Critical => "danger",
            Severity::Info => "info",
            Severity::Success => "success",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.css_class())
    }
}

/// Whether an alert goes out at the end of the tick or joins the scheduled batch.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AlertRoute {
    #[default]
    Immediate,
    Scheduled,
}

/// An alert before suppression and rendering.
#[derive(Serialize, Clone, Debug)]
pub struct Alert {
    pub kind: AlertKind,
    pub subject: String,
    pub body: String,
    pub details: Value,
    pub attachment: Option<PathBuf>,
}

impl Alert {
    pub fn new(kind: AlertKind, subject: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            kind,
            subject: subject.into(),
            body: body.into(),
            details: Value::Null,
            attachment: None,
        }
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = details;
        self
    }

    pub fn with_attachment(mut self, path: PathBuf) -> Self {
        self.attachment = Some(path);
        self
    }

    /// Suppression key: subject plus a bounded prefix of the body.
    pub fn fingerprint(&self) -> String {
        let prefix: String = self.body.chars().take(FINGERPRINT_BODY_CHARS).collect();
        format!("{}_{}", self.subject, prefix)
    }
}
