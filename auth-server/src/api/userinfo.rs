use crate::errors::{ApiError, ErrorBody};
use crate::openapi::OAUTH_TAG;
use crate::state::AppState;
use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use http::HeaderMap;
use oauth_core::{extract_bearer, UserInfo};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use utoipa::ToSchema;

/// The principal behind an access token
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UserInfoResponse {
    pub name: String,
    pub authorities: BTreeSet<String>,
    pub client_id: String,
    /// Scopes of the presented token, space separated
    pub scope: String,
}

impl From<UserInfo> for UserInfoResponse {
    fn from(info: UserInfo) -> Self {
        Self {
            name: info.name,
            authorities: info.authorities,
            client_id: info.client_id,
            scope: info.scope.to_string(),
        }
    }
}

/// Describe the user an access token was issued for
#[utoipa::path(
    get,
    path = "/userinfo",
    tag = OAUTH_TAG,
    responses(
        (status = 200, description = "Token principal", body = UserInfoResponse),
        (status = 401, description = "Missing, expired or invalid token", body = ErrorBody),
    )
)]
pub(crate) async fn userinfo(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<UserInfoResponse>, ApiError> {
    let token = extract_bearer(&headers)?;
    let info = state.core.userinfo(token)?;
    Ok(Json(info.into()))
}

pub fn router() -> Router<AppState> {
    Router::new().route("/userinfo", get(userinfo))
}
