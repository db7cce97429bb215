use crate::api::{health, login, oauth, userinfo};
use crate::errors::ErrorBody;
use crate::state::AppState;
use axum::routing::get;
use axum::{Json, Router};
use utoipa::OpenApi;

pub(crate) const HEALTH_TAG: &str = "Health API";
pub(crate) const OAUTH_TAG: &str = "OAuth 2.0";
pub(crate) const LOGIN_TAG: &str = "Login";

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health_check,
        health::ready_check,
        login::login_form,
        login::login,
        login::logout,
        oauth::handlers::authorize,
        oauth::handlers::decide,
        oauth::handlers::token,
        oauth::handlers::token_key,
        userinfo::userinfo,
    ),
    components(schemas(
        ErrorBody,
        oauth::models::TokenRequest,
        oauth::models::TokenResponse,
        oauth::models::TokenKeyResponse,
        userinfo::UserInfoResponse,
    )),
    tags(
        (name = HEALTH_TAG, description = "Health check endpoints"),
        (name = OAUTH_TAG, description = "Authorization and token endpoints"),
        (name = LOGIN_TAG, description = "Interactive resource owner login"),
    ),
    info(
        title = "Authorization Server API",
        description = "Issues signed access tokens via the password and authorization-code grants",
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
