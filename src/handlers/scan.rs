//! Scan endpoints.
//!
//! `/scan` serves the cached result of the last scan and runs a new one
//! when none exists yet or `?refresh=true` is given.

use axum::{
    extract::{Query, State},
    Json,
};
use serde::Deserialize;
use tracing::{debug, instrument};

use procwarden::classify::ServiceDetails;

use crate::handlers::ApiError;
use crate::state::{ScanSummary, SharedState};

/// Query parameters for the scan endpoint.
#[derive(Deserialize, Debug, Default)]
pub struct ScanQuery {
    #[serde(default)]
    pub refresh: bool,
}

/// Handler for the /scan endpoint.
#[instrument(skip(state))]
pub async fn scan_handler(
    State(state): State<SharedState>,
    Query(query): Query<ScanQuery>,
) -> Result<Json<ScanSummary>, ApiError> {
    if !query.refresh {
        if let Some(summary) = state.last_scan.read().await.clone() {
            debug!("Serving cached scan from {}", summary.result.scanned_at);
            return Ok(Json(summary));
        }
    }

    let worker = state.clone();
    let summary = tokio::task::spawn_blocking(move || worker.scan_blocking()).await??;

    *state.last_scan.write().await = Some(summary.clone());
    Ok(Json(summary))
}

/// Handler for the /services/unnecessary endpoint.
#[instrument(skip(state))]
pub async fn unnecessary_services_handler(
    State(state): State<SharedState>,
) -> Result<Json<Vec<ServiceDetails>>, ApiError> {
    let engine = state.engine.clone();
    let details = tokio::task::spawn_blocking(move || {
        engine.find_unnecessary_services().map(|services| {
            services
                .iter()
                .map(|s| ServiceDetails::from_record(s, engine.registry()))
                .collect::<Vec<_>>()
        })
    })
    .await??;

    debug!("{} unnecessary services running", details.len());
    Ok(Json(details))
}
