pub(crate) mod handlers;
pub(crate) mod models;

use crate::state::AppState;
use axum::routing::{get, post};
use axum::Router;

pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/oauth/authorize",
            get(handlers::authorize).post(handlers::decide),
        )
        .route("/oauth/token", post(handlers::token))
        .route("/oauth/token_key", get(handlers::token_key))
}
