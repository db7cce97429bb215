use axum::response::{IntoResponse, Response};
use axum::Json;
use http::header::WWW_AUTHENTICATE;
use http::{HeaderValue, StatusCode};
use log::{error, warn};
use oauth_core::OAuthError;
use serde::Serialize;
use thiserror::Error;
use utoipa::ToSchema;

#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorBody {
    pub error: String,
    pub error_description: String,
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Auth(#[from] OAuthError),
    #[error("{0} not found")]
    NotFound(String),
}

impl ApiError {
    pub fn invalid_request<S: ToString>(detail: S) -> Self {
        Self::Auth(OAuthError::InvalidRequest(detail.to_string()))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let error = match self {
            Self::NotFound(what) => {
                let body = ErrorBody {
                    error: "not_found".to_string(),
                    error_description: format!("{what} not found"),
                };
                return (StatusCode::NOT_FOUND, Json(body)).into_response();
            }
            Self::Auth(error) => error,
        };
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

    #[test]
    fn test_insufficient_scope_challenge() {
        let response = ApiError::from(OAuthError::InsufficientScope {
            required: "admin".to_string(),
        })
        .into_response();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(
            response.headers()[WWW_AUTHENTICATE],
            "Bearer error=\"insufficient_scope\", scope=\"admin\""
        );
    }

    #[test]
    fn test_not_found() {
        let response = ApiError::NotFound("message 7".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(response.headers().get(WWW_AUTHENTICATE).is_none());
    }
}
