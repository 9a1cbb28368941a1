//! Periodic background workers.
//!
//! Validation, monitoring report and performance report each run on their
//! own interval. Every loop waits on its timer and the shutdown token
//! together, so a cancelled worker exits within one tick.

use crate::services::monitor::TransferMonitor;
use chrono::Utc;
use std::{future::Future, sync::Arc, time::Duration};
use tokio::{
    task::JoinHandle,
    time::{Instant, MissedTickBehavior, interval_at},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

pub fn spawn_workers(
    monitor: Arc<TransferMonitor>,
    shutdown: CancellationToken,
) -> Vec<JoinHandle<()>> {
    let intervals = monitor.settings().intervals.clone();

    let validation = {
        let monitor = monitor.clone();
        tokio::spawn(run_periodic(
            "validation",
            intervals.validation(),
            shutdown.clone(),
            move || {
                let monitor = monitor.clone();
                async move { monitor.run_validation(Utc::now()).await }
            },
        ))
    };

    let report = {
        let monitor = monitor.clone();
        tokio::spawn(run_periodic(
            "report",
            intervals.report(),
            shutdown.clone(),
            move || {
                let monitor = monitor.clone();
                async move { monitor.run_report(Utc::now()).await }
            },
        ))
    };

    let performance = tokio::spawn(run_periodic(
        "performance",
        intervals.performance_report(),
        shutdown,
        move || {
            let monitor = monitor.clone();
            async move { monitor.run_performance_report(Utc::now()).await }
        },
    ));

    vec![validation, report, performance]
}

/// Run `tick` every `every`, starting one period from now, until `shutdown` fires.
pub async fn run_periodic<F, Fut>(
    name: &'static str,
    every: Duration,
    shutdown: CancellationToken,
    mut tick: F,
) where
    F: FnMut() -> Fut,
    Fut: Future<Output = ()>,
{
    info!(worker = name, interval_secs = every.as_secs(), "Starting worker");

    let mut timer = interval_at(Instant::now() + every, every);
    timer.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = timer.tick() => {
                debug!(worker = name, "Tick");
                tick().await;
            }
        }
    }

    info!(worker = name, "Worker stopped");
}
