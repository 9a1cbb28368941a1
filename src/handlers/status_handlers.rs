//! Status handlers.
//!
//! - GET /status            -> drop counts, pair counts per status, duplicates
//! - GET /performance       -> live performance snapshot
//! - GET /drops/{source}    -> ledger entries for one configured source

use crate::{
    errors::AppError,
    models::{drop::AssetDrop, performance::PerformanceSnapshot},
    services::monitor::{StatusSummary, TransferMonitor},
};
use axum::{
    Json,
    extract::{Path, State},
};
use chrono::Utc;
use std::sync::Arc;

pub async fn status(State(monitor): State<Arc<TransferMonitor>>) -> Json<StatusSummary> {
    Json(monitor.status().await)
}

pub async fn performance(
    State(monitor): State<Arc<TransferMonitor>>,
) -> Json<PerformanceSnapshot> {
    Json(monitor.performance_snapshot(Utc::now()).await)
}

/// `GET /drops/{source}`
///
/// 404 when `source` is not a configured watch folder id; an empty list when
/// it is configured but nothing has arrived yet.
pub async fn drops_for_source(
    State(monitor): State<Arc<TransferMonitor>>,
    Path(source): Path<String>,
) -> Result<Json<Vec<AssetDrop>>, AppError> {
    if monitor.settings().source_root(&source).is_none() {
        return Err(AppError::not_found(format!("unknown source `{source}`")));
    }
    Ok(Json(monitor.ledger().for_source(&source).await))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::monitor::tests::harness;
    use axum::http::StatusCode;

    #[tokio::test]
    async fn drops_listed_per_source() {
        let h = harness();
        let path = h.source("INGEST").join("clip.mp4");
        std::fs::write(&path, b"clip").unwrap();
        h.monitor.on_asset_observed("INGEST", &path, Utc::now()).await;

        let Json(drops) = drops_for_source(State(h.monitor.clone()), Path("INGEST".into()))
            .await
            .unwrap();
        assert_eq!(drops.len(), 1);
        assert_eq!(drops[0].name, "clip.mp4");

        let Json(empty) = drops_for_source(State(h.monitor.clone()), Path("PROMO".into()))
            .await
            .unwrap();
        assert!(empty.is_empty());
    }

    #[tokio::test]
    async fn unknown_source_is_not_found() {
        let h = harness();
        let err = drops_for_source(State(h.monitor.clone()), Path("NOPE".into()))
            .await
            .unwrap_err();
        assert_eq!(err.status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn status_counts_pairs() {
        let h = harness();
        let path = h.source("PROMO").join("spot.mov");
        std::fs::write(&path, b"spot").unwrap();
        h.monitor.on_asset_observed("PROMO", &path, Utc::now()).await;

        let Json(summary) = status(State(h.monitor.clone())).await;
        assert_eq!(summary.total_drops, 1);
        assert_eq!(summary.pairs_by_status.get("Pending"), Some(&1));

        let Json(snapshot) = performance(State(h.monitor.clone())).await;
        assert_eq!(snapshot.pairs.len(), 1);
    }
}
