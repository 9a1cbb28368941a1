//! Alert dispatcher: fingerprint suppression and delivery.
//!
//! An alert is admitted only if no alert with the same fingerprint was
//! admitted within the suppression window. The check-and-record happens in
//! one lock scope; delivery happens after the lock is released. Delivery
//! failures never propagate: they are logged and the alert content is echoed
//! to the fallback channel.

use crate::{
    models::alert::Alert,
    services::notifier::{Notifier, OutgoingAlert},
};
use chrono::{DateTime, Duration, Utc};
use std::{collections::HashMap, sync::Arc};
use tokio::{fs, sync::Mutex};
use tracing::{debug, error, warn};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DispatchOutcome {
    Delivered,
    /// An identical alert went out within the suppression window.
    Suppressed,
    /// Delivery failed; content went to the fallback channel.
    Fallback,
}

pub struct Dispatcher {
    notifier: Arc<dyn Notifier>,
    window: Duration,
    last_sent: Mutex<HashMap<String, DateTime<Utc>>>,
}

impl Dispatcher {
    pub fn new(notifier: Arc<dyn Notifier>, window: Duration) -> Self {
        Self {
            notifier,
            window,
            last_sent: Mutex::new(HashMap::new()),
        }
    }

    pub async fn notify_at(&self, mut alert: Alert, now: DateTime<Utc>) -> DispatchOutcome {
        let fingerprint = alert.fingerprint();
        if !self.admit(&fingerprint, now).await {
            debug!(subject = %alert.subject, "Suppressing repeated alert");
            return DispatchOutcome::Suppressed;
        }

        if let Some(path) = alert.attachment.take() {
            if fs::try_exists(&path).await.unwrap_or(false) {
                alert.attachment = Some(path);
            } else {
                warn!(path = %path.display(), "Attachment missing, sending without it");
            }
        }

        let outgoing = OutgoingAlert::render(alert, now);
        match self.notifier.deliver(&outgoing).await {
            Ok(()) => DispatchOutcome::Delivered,
            Err(err) => {
                error!(error = %err, subject = %outgoing.subject, "Alert delivery failed");
                fallback(&outgoing);
                DispatchOutcome::Fallback
            }
        }
    }

    /// Record `now` for `fingerprint` unless it was recorded less than one window ago.
    async fn admit(&self, fingerprint: &str, now: DateTime<Utc>) -> bool {
        let mut last_sent = self.last_sent.lock().await;
        if let Some(previous) = last_sent.get(fingerprint) {
            if now - *previous < self.window {
                return false;
            }
        }
        last_sent.insert(fingerprint.to_string(), now);
        true
    }
}

/// Console channel used when the notifier cannot deliver.
fn fallback(alert: &OutgoingAlert) {
    warn!(
        target: "alert_fallback",
        category = alert.category,
        subject = %alert.subject,
        "{}",
        alert.body
    );
    eprintln!("ALERT [{}] {}\n{}\n", alert.category, alert.subject, alert.body);
}
