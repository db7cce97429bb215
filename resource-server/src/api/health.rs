use crate::openapi::HEALTH_TAG;
use crate::state::AppState;
use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use http::StatusCode;
use serde::Serialize;
use utoipa::ToSchema;

#[derive(Debug, Serialize, ToSchema)]
pub struct Health {
    status: &'static str,
    /// Algorithm of the loaded verification key
    #[serde(skip_serializing_if = "Option::is_none")]
    algorithm: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    key_id: Option<String>,
}

impl IntoResponse for Health {
    fn into_response(self) -> Response {
        (StatusCode::OK, Json(self)).into_response()
    }
}

/// Liveness check
#[utoipa::path(
    get,
    path = "/health",
    tag = HEALTH_TAG,
    responses((status = 200, description = "Service is alive", body = Health))
)]
pub(crate) async fn health_check() -> Health {
    Health {
        status: "ok",
        algorithm: None,
        key_id: None,
    }
}

/// Readiness check: reports the verification key in use.
///
/// The service only starts listening once a key is loaded.
#[utoipa::path(
    get,
    path = "/ready",
    tag = HEALTH_TAG,
    responses((status = 200, description = "Verification key loaded", body = Health))
)]
pub(crate) async fn ready_check(State(state): State<AppState>) -> Health {
    let verifier = state.guard.verifier();
    Health {
        status: "ok",
        algorithm: Some(verifier.algorithm().to_string()),
        key_id: Some(verifier.kid().to_string()),
    }
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health_check))
        .route("/ready", get(ready_check))
}
