//! Policy endpoint handler.

use axum::{extract::State, Json};
use serde::Serialize;
use tracing::{debug, instrument};

use procwarden::model::EntityKind;
use procwarden::policy::PolicyRegistry;

use crate::state::SharedState;

#[derive(Debug, Serialize)]
pub struct PolicyResponse {
    #[serde(flatten)]
    pub registry: PolicyRegistry,
    /// Names listed both as never-touch and as candidate.
    pub overlaps: Vec<(EntityKind, String)>,
}

/// Handler for the /policy endpoint.
#[instrument(skip(state))]
pub async fn policy_handler(State(state): State<SharedState>) -> Json<PolicyResponse> {
    debug!("Processing /policy request");
    let registry = state.engine.registry();
    Json(PolicyResponse {
        registry: registry.clone(),
        overlaps: registry.overlaps(),
    })
}
