//! HTTP endpoint handlers for the `serve` command.
//!
//! This module provides handlers for all HTTP endpoints:
//! - `/`: Landing page
//! - `/health`: Health check endpoint
//! - `/scan`: Latest classification result (JSON)
//! - `/services/unnecessary`: Running services from the candidate list
//! - `/details/process/{pid}`, `/details/service/{name}`: Fresh entity lookups
//! - `/policy`: Effective policy tables
//! - `/actions`: Gated remediation (POST)
//! - `/metrics`: Prometheus metrics endpoint

pub mod actions;
pub mod details;
pub mod health;
pub mod metrics;
pub mod policy;
pub mod root;
pub mod scan;

// Re-export handlers
pub use actions::actions_handler;
pub use details::{process_details_handler, service_details_handler};
pub use health::health_handler;
pub use metrics::metrics_handler;
pub use policy::policy_handler;
pub use root::root_handler;
pub use scan::{scan_handler, unnecessary_services_handler};

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tracing::error;

use procwarden::action::ActionError;
use procwarden::snapshot::ProviderError;

/// Error type shared by the JSON endpoints.
#[derive(Debug)]
pub enum ApiError {
    Provider(ProviderError),
    Action(ActionError),
    NotFound(String),
    Internal(String),
}

impl From<ProviderError> for ApiError {
    fn from(e: ProviderError) -> Self {
        ApiError::Provider(e)
    }
}

impl From<ActionError> for ApiError {
    fn from(e: ActionError) -> Self {
        ApiError::Action(e)
    }
}

impl From<tokio::task::JoinError> for ApiError {
    fn from(e: tokio::task::JoinError) -> Self {
        ApiError::Internal(format!("worker task failed: {e}"))
    }
}

impl ApiError {
    fn status_and_kind(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::Provider(_) => (StatusCode::INTERNAL_SERVER_ERROR, "provider"),
            ApiError::Action(e) => {
                let status = match e {
                    ActionError::Denied(_) | ActionError::AccessDenied(_) => StatusCode::FORBIDDEN,
                    ActionError::Vanished(_) => StatusCode::NOT_FOUND,
                    ActionError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
                    _ => StatusCode::INTERNAL_SERVER_ERROR,
                };
                (status, e.kind())
            }
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            ApiError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
        }
    }

    fn message(&self) -> String {
        match self {
            ApiError::Provider(e) => e.to_string(),
            ApiError::Action(e) => e.to_string(),
            ApiError::NotFound(what) => format!("{what} not found"),
            ApiError::Internal(msg) => msg.clone(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, kind) = self.status_and_kind();
        let message = self.message();
        if status.is_server_error() {
            error!("Request failed: {}", message);
        }
        (status, Json(json!({ "error": message, "kind": kind }))).into_response()
    }
}
