use crate::pages;
use crate::upstream::UpstreamError;
use axum::response::{IntoResponse, Response};
use http::StatusCode;
use log::{error, warn};
use oauth_core::OAuthError;

impl IntoResponse for UpstreamError {
    fn into_response(self) -> Response {
        match &self {
            Self::Unavailable(_) | Self::Failed(_) | Self::InvalidResponse(..) => {
                error!("Upstream call failed: {}", self);
                let unavailable = OAuthError::UpstreamUnavailable(
                    "The service is temporarily unavailable, please try again later".to_string(),
                );
                pages::error_page(
                    unavailable.status(),
                    "Service unavailable",
                    &unavailable.public_description(),
                )
            }
            Self::Unauthenticated => {
                warn!("Upstream refused the session's access token");
                pages::error_page(
                    StatusCode::UNAUTHORIZED,
                    "Not signed in",
                    "Your session has expired",
                )
            }
            Self::Rejected { status, error, .. } => {
                warn!("Upstream rejected the request: {}", self);
                let status = if status.is_client_error() {
                    *status
                } else {
                    StatusCode::BAD_GATEWAY
                };
                pages::error_page(status, "Request failed", error)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exhausted_retries_are_bad_gateway() {
        let response = UpstreamError::Unavailable("resource server answered 503".to_string())
            .into_response();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn test_client_errors_keep_their_status() {
        let response = UpstreamError::Rejected {
            what: "resource server",
            status: StatusCode::FORBIDDEN,
            error: "insufficient_scope".to_string(),
        }
        .into_response();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }
}
