use super::guard::{
    authenticate, inject_principal, require_scopes, AuthenticatedPrincipal, ScopeRequirement,
};
use crate::errors::{ApiError, ErrorBody};
use crate::messages::{Message, SortOrder};
use crate::openapi::MESSAGES_TAG;
use crate::state::AppState;
use axum::extract::{Path, Query, State};
use axum::routing::{delete, get, post};
use axum::{middleware, Json, Router};
use http::StatusCode;
use log::info;
use oauth_core::ScopeSet;
use serde::Deserialize;
use utoipa::ToSchema;

#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    /// `createdAt,DESC` (default) or `createdAt,ASC`
    pub sort: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct NewMessage {
    pub text: String,
}

/// List messages
#[utoipa::path(
    get,
    path = "/messages",
    tag = MESSAGES_TAG,
    params(("sort" = Option<String>, Query, description = "`createdAt,DESC` (default) or `createdAt,ASC`")),
    responses(
        (status = 200, description = "Messages", body = Vec<Message>),
        (status = 401, description = "Missing or invalid token", body = ErrorBody),
        (status = 403, description = "Token lacks the read scope", body = ErrorBody),
    )
)]
pub(crate) async fn list_messages(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<Message>>, ApiError> {
    let order = match query.sort.as_deref() {
        Some(sort) => sort.parse().map_err(ApiError::invalid_request)?,
        None => SortOrder::default(),
    };
    Ok(Json(state.messages.list(order).await))
}

/// Get one message
#[utoipa::path(
    get,
    path = "/messages/{id}",
    tag = MESSAGES_TAG,
    params(("id" = u64, Path, description = "Message id")),
    responses(
        (status = 200, description = "Message", body = Message),
        (status = 404, description = "No such message", body = ErrorBody),
    )
)]
pub(crate) async fn get_message(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> Result<Json<Message>, ApiError> {
    state
        .messages
        .get(id)
        .await
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("message {id}")))
}

/// Create a message authored by the token's user
#[utoipa::path(
    post,
    path = "/messages",
    tag = MESSAGES_TAG,
    request_body = NewMessage,
    responses(
        (status = 201, description = "Created", body = Message),
        (status = 400, description = "Empty text", body = ErrorBody),
        (status = 403, description = "Token lacks the write scope", body = ErrorBody),
    )
)]
pub(crate) async fn create_message(
    State(state): State<AppState>,
    AuthenticatedPrincipal(author): AuthenticatedPrincipal,
    Json(new): Json<NewMessage>,
) -> Result<(StatusCode, Json<Message>), ApiError> {
    let text = new.text.trim();
    if text.is_empty() {
        return Err(ApiError::invalid_request("text must not be empty"));
    }
    let message = state.messages.create(text.to_string(), &author).await;
    info!("'{}' created message {}", message.username, message.id);
    Ok((StatusCode::CREATED, Json(message)))
}

/// Delete a message (admin scope)
#[utoipa::path(
    delete,
    path = "/messages/{id}",
    tag = MESSAGES_TAG,
    params(("id" = u64, Path, description = "Message id")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 403, description = "Token lacks the admin scope", body = ErrorBody),
        (status = 404, description = "No such message", body = ErrorBody),
    )
)]
pub(crate) async fn delete_message(
    State(state): State<AppState>,
    AuthenticatedPrincipal(principal): AuthenticatedPrincipal,
    Path(id): Path<u64>,
) -> Result<StatusCode, ApiError> {
    if state.messages.delete(id).await {
        info!("'{}' deleted message {}", principal.username, id);
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound(format!("message {id}")))
    }
}

/// Wrap `routes` in the guard chain with the given scope requirement
fn protected(state: &AppState, required: ScopeSet, routes: Router<AppState>) -> Router<AppState> {
    routes
        .route_layer(middleware::from_fn(inject_principal))
        .route_layer(middleware::from_fn_with_state(
            ScopeRequirement::new(state, required),
            require_scopes,
        ))
        .route_layer(middleware::from_fn_with_state(state.clone(), authenticate))
}

pub fn router(state: &AppState) -> Router<AppState> {
    let settings = &state.settings;
    let read = Router::new()
        .route("/messages", get(list_messages))
        .route("/messages/{id}", get(get_message));
    let write = Router::new().route("/messages", post(create_message));
    let admin = Router::new().route("/messages/{id}", delete(delete_message));

    Router::new()
        .merge(protected(state, settings.read_scopes(), read))
        .merge(protected(state, settings.write_scopes(), write))
        .merge(protected(state, settings.admin_scopes(), admin))
}
