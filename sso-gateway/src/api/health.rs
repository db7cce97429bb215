use crate::state::AppState;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;

pub(crate) async fn health_check() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

/// Ready when the session store is reachable
pub(crate) async fn ready_check(State(app): State<AppState>) -> impl IntoResponse {
    if app.health_check().await {
        (StatusCode::OK, Json(json!({ "status": "ok" })))
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "status": "error", "error": "Session store is not reachable" })),
        )
    }
}

#[cfg(test)]
mod tests {
    use crate::test_utils::TestFixture;
    use http::StatusCode;

    #[tokio::test]
    async fn test_health_and_ready() {
        let fixture = TestFixture::new().await;
        let response = fixture.get("/health").await;
        response.assert_status(StatusCode::OK);

        let response = fixture.get("/ready").await;
        response.assert_status(StatusCode::OK);
        assert!(response.text().contains("ok"));
    }
}
