pub(crate) mod health;
pub(crate) mod login;
pub(crate) mod oauth;
pub(crate) mod userinfo;

use crate::state::AppState;
use axum::Router;

/// Combines all routes into a single router
pub(super) fn router() -> Router<AppState> {
    Router::new()
        .merge(health::router())
        .merge(login::router())
        .merge(oauth::router())
        .merge(userinfo::router())
}
