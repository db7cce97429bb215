use axum::response::{IntoResponse, Response};
use axum::Json;
use http::header::WWW_AUTHENTICATE;
use http::HeaderValue;
use log::{error, warn};
use oauth_core::OAuthError;
use serde::Serialize;
use utoipa::ToSchema;

/// RFC 6749 error body
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorBody {
    /// Machine-readable error code, e.g. `invalid_grant`
    pub error: String,
    pub error_description: String,
}

/// JSON error response built from an [`OAuthError`]
#[derive(Debug, Clone)]
pub struct ApiError(pub OAuthError);

impl ApiError {
    pub fn invalid_request<S: ToString>(detail: S) -> Self {
        Self(OAuthError::InvalidRequest(detail.to_string()))
    }

    pub fn internal<S: ToString>(detail: S) -> Self {
        Self(OAuthError::Server(detail.to_string()))
    }
}

impl From<OAuthError> for ApiError {
    fn from(error: OAuthError) -> Self {
        Self(error)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let error = self.0;
        match &error {
            OAuthError::Server(detail) => error!("Request failed: {}", detail),
            other => warn!("Request rejected: {}", other),
        }

        let body = ErrorBody {
            error: error.code().to_string(),
            error_description: error.public_description(),
        };
        let mut response = (error.status(), Json(body)).into_response();

        let challenge = match &error {
            OAuthError::InvalidClient(_) => Some("Basic realm=\"oauth\"".to_string()),
            OAuthError::Unauthenticated(_) => Some("Bearer error=\"invalid_token\"".to_string()),
            OAuthError::InsufficientScope { required } => Some(format!(
                "Bearer error=\"insufficient_scope\", scope=\"{required}\""
            )),
            _ => None,
        };
        if let Some(value) = challenge.and_then(|c| HeaderValue::from_str(&c).ok()) {
            response.headers_mut().insert(WWW_AUTHENTICATE, value);
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::StatusCode;
    use http_body_util::BodyExt;

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_invalid_client_response() {
        let response =
            ApiError(OAuthError::InvalidClient("unknown client 'x'".to_string())).into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(response.headers()[WWW_AUTHENTICATE], "Basic realm=\"oauth\"");
        let body = body_json(response).await;
        assert_eq!(body["error"], "invalid_client");
        assert_eq!(body["error_description"], "Client authentication failed");
    }

    #[tokio::test]
    async fn test_unauthenticated_response() {
        let response = ApiError(OAuthError::Unauthenticated("expired".to_string())).into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            response.headers()[WWW_AUTHENTICATE],
            "Bearer error=\"invalid_token\""
        );
        assert_eq!(body_json(response).await["error"], "invalid_token");
    }

    #[tokio::test]
    async fn test_server_error_hides_detail() {
        let response = ApiError::internal("redis connection refused").into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = body_json(response).await;
        assert_eq!(body["error_description"], "Internal server error");
    }
}
