//! Read-only HTTP surface.
//!
//! - `GET /healthz`          liveness
//! - `GET /readyz`           folder + snapshot directory checks
//! - `GET /status`           counts per source and per transfer status
//! - `GET /performance`      current performance snapshot
//! - `GET /drops/{source}`   ledger entries for one source

use crate::{
    handlers::{
        health_handlers::{healthz, readyz},
        status_handlers::{drops_for_source, performance, status},
    },
    services::monitor::TransferMonitor,
};
use axum::{Router, routing::get};
use std::sync::Arc;

/// Build the router; the shared monitor is attached with `with_state`.
pub fn routes() -> Router<Arc<TransferMonitor>> {
    Router::new()
        // health endpoints (mounted at root)
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/status", get(status))
        .route("/performance", get(performance))
        .route("/drops/{source}", get(drops_for_source))
}
