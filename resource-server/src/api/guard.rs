//! Bearer token middleware chain: authenticate, require scopes, inject principal.
//!
//! Each step is its own layer with a narrow contract. Later steps read what earlier
//! ones put into the request extensions.

use crate::errors::ApiError;
use crate::state::AppState;
use axum::extract::{FromRequestParts, Request, State};
use axum::middleware::Next;
use axum::response::Response;
use http::request::Parts;
use log::debug;
use oauth_core::{AccessTokenClaims, OAuthError, Principal, ResourceGuard, ScopeSet};

fn not_authenticated() -> ApiError {
    ApiError::Auth(OAuthError::Unauthenticated(
        "request did not pass authentication".to_string(),
    ))
}

/// Verify the bearer token and store its claims in the request extensions
pub async fn authenticate(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let claims = state.guard.authenticate(request.headers())?;
    debug!("Authenticated '{}' via client '{}'", claims.sub, claims.client_id);
    request.extensions_mut().insert(claims);
    Ok(next.run(request).await)
}

/// Scopes a route group requires
#[derive(Debug, Clone)]
pub struct ScopeRequirement {
    guard: ResourceGuard,
    required: ScopeSet,
}

impl ScopeRequirement {
    pub fn new(state: &AppState, required: ScopeSet) -> Self {
        Self {
            guard: state.guard.clone(),
            required,
        }
    }
}

/// Reject tokens that lack the group's scopes. Must run after [`authenticate`].
pub async fn require_scopes(
    State(requirement): State<ScopeRequirement>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let claims = request
        .extensions()
        .get::<AccessTokenClaims>()
        .ok_or_else(not_authenticated)?;
    requirement.guard.authorize(claims, &requirement.required)?;
    Ok(next.run(request).await)
}

/// Resolve the token's principal for the handlers. Must run after [`authenticate`].
pub async fn inject_principal(mut request: Request, next: Next) -> Result<Response, ApiError> {
    let principal = request
        .extensions()
        .get::<AccessTokenClaims>()
        .map(Principal::from)
        .ok_or_else(not_authenticated)?;
    request.extensions_mut().insert(principal);
    Ok(next.run(request).await)
}

/// The principal the request's access token was issued for
#[derive(Debug, Clone)]
pub struct AuthenticatedPrincipal(pub Principal);

impl<S: Send + Sync> FromRequestParts<S> for AuthenticatedPrincipal {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Principal>()
            .cloned()
            .map(Self)
            .ok_or_else(not_authenticated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::TestFixture;
    use axum::middleware;
    use axum::routing::get;
    use axum::Router;
    use http::StatusCode;

    async fn whoami(AuthenticatedPrincipal(principal): AuthenticatedPrincipal) -> String {
        principal.username
    }

    fn app(state: AppState, required: &str) -> Router {
        let requirement = ScopeRequirement::new(&state, ScopeSet::parse(required));
        Router::new()
            .route("/whoami", get(whoami))
            .route_layer(middleware::from_fn(inject_principal))
            .route_layer(middleware::from_fn_with_state(requirement, require_scopes))
            .route_layer(middleware::from_fn_with_state(state.clone(), authenticate))
            .with_state(state)
    }

    #[tokio::test]
    async fn test_chain_passes_principal() {
        let fixture = TestFixture::new().await;
        let state = fixture.state.clone();
        let fixture = fixture.with_app(app(state, "openid"));
        let token = fixture.token("alice", "openid", 60);
        let response = fixture.get_with_bearer("/whoami", &token).await;
        response.assert_ok();
        assert_eq!(response.text(), "alice");
    }

    #[tokio::test]
    async fn test_missing_scope_is_forbidden_not_unauthenticated() {
        let fixture = TestFixture::new().await;
        let state = fixture.state.clone();
        let fixture = fixture.with_app(app(state, "admin"));
        let token = fixture.token("alice", "openid", 60);
        let response = fixture.get_with_bearer("/whoami", &token).await;
        response.assert_status(StatusCode::FORBIDDEN);
        assert_eq!(response.json["error"], "insufficient_scope");
    }

    #[tokio::test]
    async fn test_extractor_without_chain_is_unauthenticated() {
        let fixture = TestFixture::new().await;
        let state = fixture.state.clone();
        let fixture = fixture.with_app(Router::new().route("/whoami", get(whoami)).with_state(state));
        let response = fixture.get("/whoami").await;
        response.assert_status(StatusCode::UNAUTHORIZED);
    }
}
