pub(crate) mod health;
pub(crate) mod home;
pub(crate) mod proxy;
pub(crate) mod sso;

use crate::state::AppState;
use axum::routing::{any, get, post};
use axum::Router;

/// Combines all routes into a single router
pub(super) fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(home::home))
        .route("/messages", post(home::post_message))
        .route("/api/{*path}", any(proxy::proxy))
        .route("/login", get(sso::callback))
        .route("/logout", post(sso::logout))
        .route("/health", get(health::health_check))
        .route("/ready", get(health::ready_check))
}
