//! Action endpoint handler.
//!
//! `POST /actions` runs one gated action. The body names the entity the
//! same way `EntityRef` serializes:
//!
//! ```json
//! {"entity": {"kind": "service", "name": "cups"}, "action": "stop"}
//! ```

use axum::{extract::State, Json};
use serde::Deserialize;
use tracing::{info, instrument};

use procwarden::action::ActionReport;
use procwarden::model::{Action, EntityRef};

use crate::handlers::ApiError;
use crate::state::SharedState;

#[derive(Debug, Deserialize)]
pub struct ActionRequest {
    pub entity: EntityRef,
    pub action: Action,
    #[serde(default)]
    pub force: bool,
}

/// Handler for the POST /actions endpoint.
#[instrument(skip(state))]
pub async fn actions_handler(
    State(state): State<SharedState>,
    Json(request): Json<ActionRequest>,
) -> Result<Json<ActionReport>, ApiError> {
    info!("Action requested: {} on {}", request.action, request.entity);

    let action = request.action;
    let worker = state.clone();
    let outcome = tokio::task::spawn_blocking(move || {
        worker
            .remediator
            .authorize_and_act(&request.entity, action, request.force)
    })
    .await?;

    state.metrics.observe_action(action, &outcome);
    Ok(Json(outcome?))
}
