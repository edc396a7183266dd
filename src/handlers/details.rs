//! Entity details endpoints.
//!
//! Every request performs a fresh lookup through the provider; a pid or
//! service that no longer exists answers 404.

use axum::{
    extract::{Path, State},
    Json,
};
use tracing::{debug, instrument};

use procwarden::classify::EntityDetails;
use procwarden::model::EntityRef;

use crate::handlers::ApiError;
use crate::state::SharedState;

async fn lookup(state: &SharedState, entity: EntityRef) -> Result<Json<EntityDetails>, ApiError> {
    let engine = state.engine.clone();
    let wanted = entity.clone();
    let details = tokio::task::spawn_blocking(move || engine.get_entity_details(&wanted)).await??;

    match details {
        Some(d) => Ok(Json(d)),
        None => {
            debug!("{} not found", entity);
            Err(ApiError::NotFound(entity.to_string()))
        }
    }
}

/// Handler for /details/process/{pid}.
#[instrument(skip(state))]
pub async fn process_details_handler(
    State(state): State<SharedState>,
    Path(pid): Path<u32>,
) -> Result<Json<EntityDetails>, ApiError> {
    lookup(&state, EntityRef::process(pid)).await
}

/// Handler for /details/service/{name}.
#[instrument(skip(state))]
pub async fn service_details_handler(
    State(state): State<SharedState>,
    Path(name): Path<String>,
) -> Result<Json<EntityDetails>, ApiError> {
    lookup(&state, EntityRef::service(name)).await
}
