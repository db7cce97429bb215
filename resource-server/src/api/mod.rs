pub(crate) mod guard;
pub(crate) mod health;
pub(crate) mod messages;

use crate::state::AppState;
use axum::Router;

/// Combines all routes into a single router
pub(super) fn router(state: &AppState) -> Router<AppState> {
    Router::new()
        .merge(health::router())
        .merge(messages::router(state))
}
