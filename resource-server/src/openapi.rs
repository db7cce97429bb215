use crate::api::{health, messages};
use crate::errors::ErrorBody;
use crate::state::AppState;
use axum::routing::get;
use axum::{Json, Router};
use utoipa::OpenApi;

pub(crate) const HEALTH_TAG: &str = "Health API";
pub(crate) const MESSAGES_TAG: &str = "Messages";

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health_check,
        health::ready_check,
        messages::list_messages,
        messages::get_message,
        messages::create_message,
        messages::delete_message,
    ),
    components(schemas(
        ErrorBody,
        health::Health,
        crate::messages::Message,
        messages::NewMessage,
    )),
    tags(
        (name = HEALTH_TAG, description = "Health check endpoints"),
        (name = MESSAGES_TAG, description = "Messages protected by bearer tokens"),
    ),
    info(
        title = "Resource Server API",
        description = "Message API guarded by access tokens from the authorization server",
        version = "0.1.0"
    )
)]
pub(crate) struct ApiDoc;

/// Serves the OpenAPI document as JSON
async fn openapi_json_handler() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

/// Creates a router for OpenAPI documentation routes
pub(crate) fn router() -> Router<AppState> {
    Router::new().route("/openapi.json", get(openapi_json_handler))
}
