use http::StatusCode;
use thiserror::Error;

/// Errors surfaced by the grant state machines and the resource guard.
///
/// The `Display` text is meant for logs. What goes on the wire is [`OAuthError::code`]
/// plus [`OAuthError::public_description`], which never tells an unknown client apart
/// from a wrong secret.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum OAuthError {
    #[error("Invalid client: {0}")]
    InvalidClient(String),
    #[error("Invalid grant: {0}")]
    InvalidGrant(String),
    #[error("Invalid scope: {0}")]
    InvalidScope(String),
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
    #[error("Unsupported grant type: {0}")]
    UnsupportedGrantType(String),
    #[error("Unsupported response type: {0}")]
    UnsupportedResponseType(String),
    #[error("Client is not allowed to use grant type: {0}")]
    UnauthorizedClient(String),
    #[error("Access denied: {0}")]
    AccessDenied(String),
    #[error("Unauthenticated: {0}")]
    Unauthenticated(String),
    #[error("Insufficient scope, required: {required}")]
    InsufficientScope { required: String },
    #[error("Upstream unavailable: {0}")]
    UpstreamUnavailable(String),
    #[error("Server error: {0}")]
    Server(String),
}

impl OAuthError {
    /// RFC 6749 / RFC 6750 error code
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidClient(_) => "invalid_client",
            Self::InvalidGrant(_) => "invalid_grant",
            Self::InvalidScope(_) => "invalid_scope",
            Self::InvalidRequest(_) => "invalid_request",
            Self::UnsupportedGrantType(_) => "unsupported_grant_type",
            Self::UnsupportedResponseType(_) => "unsupported_response_type",
            Self::UnauthorizedClient(_) => "unauthorized_client",
            Self::AccessDenied(_) => "access_denied",
            Self::Unauthenticated(_) => "invalid_token",
            Self::InsufficientScope { .. } => "insufficient_scope",
            Self::UpstreamUnavailable(_) => "temporarily_unavailable",
            Self::Server(_) => "server_error",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::InvalidClient(_) | Self::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            Self::InsufficientScope { .. } | Self::AccessDenied(_) => StatusCode::FORBIDDEN,
            Self::UpstreamUnavailable(_) => StatusCode::BAD_GATEWAY,
            Self::Server(_) => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::BAD_REQUEST,
        }
    }

    /// Description safe to show to the caller
    pub fn public_description(&self) -> String {
        match self {
            Self::InvalidClient(_) => "Client authentication failed".to_string(),
            Self::InvalidGrant(_) => {
                "The provided authorization grant is invalid, expired or already used".to_string()
            }
            Self::Unauthenticated(_) => "Full authentication is required".to_string(),
            Self::InsufficientScope { required } => {
                format!("The request requires higher privileges: {required}")
            }
            Self::Server(_) => "Internal server error".to_string(),
            Self::InvalidScope(detail)
            | Self::InvalidRequest(detail)
            | Self::UnsupportedGrantType(detail)
            | Self::UnsupportedResponseType(detail)
            | Self::UnauthorizedClient(detail)
            | Self::AccessDenied(detail)
            | Self::UpstreamUnavailable(detail) => detail.clone(),
        }
    }
}
