use crate::errors::ApiError;
use crate::openapi::LOGIN_TAG;
use crate::pages;
use crate::session;
use crate::state::AppState;
use axum::extract::{Form, Query, State};
use axum::response::{IntoResponse, Redirect, Response};
use axum::routing::get;
use axum::Router;
use http::header::SET_COOKIE;
use http::{HeaderMap, StatusCode};
use log::{info, warn};
use serde::Deserialize;

#[derive(Debug, Default, Deserialize)]
pub struct LoginQuery {
    pub return_to: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoginForm {
    pub username: String,
    pub password: String,
    pub return_to: Option<String>,
}

/// Only same-origin paths; anything else falls back to `/`
fn safe_return_to(return_to: Option<&str>) -> &str {
    match return_to {
        Some(path) if path.starts_with('/') && !path.starts_with("//") && !path.contains('\\') => {
            path
        }
        _ => "/",
    }
}

/// Login form
#[utoipa::path(
    get,
    path = "/login",
    tag = LOGIN_TAG,
    params(("return_to" = Option<String>, Query, description = "Local path to continue to after login")),
    responses((status = 200, description = "Login page"))
)]
pub(crate) async fn login_form(Query(query): Query<LoginQuery>) -> Response {
    pages::login_page(StatusCode::OK, safe_return_to(query.return_to.as_deref()), None)
}

/// Authenticate a resource owner and start a login session
#[utoipa::path(
    post,
    path = "/login",
    tag = LOGIN_TAG,
    request_body(content_type = "application/x-www-form-urlencoded", description = "`username`, `password` and optional `return_to`"),
    responses(
        (status = 303, description = "Logged in, redirecting to `return_to`"),
        (status = 401, description = "Bad credentials"),
    )
)]
pub(crate) async fn login(State(state): State<AppState>, Form(form): Form<LoginForm>) -> Response {
    let return_to = safe_return_to(form.return_to.as_deref());
    let owner = match state.core.users().authenticate(&form.username, &form.password).await {
        Ok(owner) => owner,
        Err(e) => {
            warn!("Login failed for '{}': {}", form.username, e);
            return pages::login_page(StatusCode::UNAUTHORIZED, return_to, Some("Bad credentials"));
        }
    };

    match session::start(&state, &owner.username).await {
        Ok(cookie) => {
            info!("User '{}' logged in", owner.username);
            let mut response = Redirect::to(return_to).into_response();
            response
                .headers_mut()
                .append(SET_COOKIE, cookie.to_header_value());
            response
        }
        Err(e) => ApiError::internal(format!("failed to store login session: {e}")).into_response(),
    }
}

/// End the login session
#[utoipa::path(
    post,
    path = "/logout",
    tag = LOGIN_TAG,
    responses((status = 303, description = "Logged out, redirecting to the login page"))
)]
pub(crate) async fn logout(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let cookie = session::end(&state, &headers).await;
    let mut response = Redirect::to("/login").into_response();
    response
        .headers_mut()
        .append(SET_COOKIE, cookie.to_header_value());
    response
}

async fn home(State(state): State<AppState>, headers: HeaderMap) -> Response {
    match session::current(&state, &headers).await {
        Some(login) => pages::home_page(&login.username),
        None => Redirect::to("/login").into_response(),
    }
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(home))
        .route("/login", get(login_form).post(login))
        .route("/logout", axum::routing::post(logout))
}
