//! Alert delivery collaborators.
//!
//! The dispatcher hands a fully rendered [`OutgoingAlert`] to a [`Notifier`].
//! Mail transport and HTML templating live outside this crate; the outbox
//! notifier writes one JSON document per alert for such a mailer to pick up.

use crate::models::alert::{Alert, AlertKind, Severity};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::{io, path::PathBuf};
use thiserror::Error;
use tokio::{fs::OpenOptions, io::AsyncWriteExt};
use tracing::info;

#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("encoding alert: {0}")]
    Encode(#[from] serde_json::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Everything a presentation layer needs to render and send one alert.
#[derive(Serialize, Clone, Debug)]
pub struct OutgoingAlert {
    pub kind: AlertKind,
    pub severity: Severity,
    pub category: &'static str,
    pub subject: String,
    pub body: String,
    pub details: Value,
    pub timestamp: DateTime<Utc>,
    pub attachment: Option<PathBuf>,
}

impl OutgoingAlert {
    pub fn render(alert: Alert, timestamp: DateTime<Utc>) -> Self {
        Self {
            severity: alert.kind.severity(),
            category: alert.kind.category(),
            kind: alert.kind,
            subject: alert.subject,
            body: alert.body,
            details: alert.details,
            timestamp,
            attachment: alert.attachment,
        }
    }
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn deliver(&self, alert: &OutgoingAlert) -> Result<(), DeliveryError>;
}

/// Writes alerts to the log. Used when no outbox is configured.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn deliver(&self, alert: &OutgoingAlert) -> Result<(), DeliveryError> {
        info!(
            target: "alerts",
            kind = ?alert.kind,
            severity = %alert.severity,
            category = alert.category,
            subject = %alert.subject,
            attachment = ?alert.attachment,
            "{}",
            alert.body
        );
        Ok(())
    }
}

/// Appends each alert as one JSON line to an outbox file.
#[derive(Clone, Debug)]
pub struct OutboxNotifier {
    path: PathBuf,
}

impl OutboxNotifier {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl Notifier for OutboxNotifier {
    async fn deliver(&self, alert: &OutgoingAlert) -> Result<(), DeliveryError> {
        let mut line = serde_json::to_vec(alert)?;
        line.push(b'\n');

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(&line).await?;
        file.flush().await?;
        Ok(())
    }
}
