//! Bearer token checks for protected resources

use crate::codec::{AccessTokenClaims, TokenVerifier, VerificationError};
use crate::error::OAuthError;
use crate::identity::Principal;
use crate::scope::ScopeSet;
use http::header::AUTHORIZATION;
use http::HeaderMap;
use log::{debug, warn};
use std::sync::{Arc, RwLock};

/// Token from an `Authorization: Bearer <token>` header. The scheme is case-insensitive.
pub fn extract_bearer(headers: &HeaderMap) -> Result<&str, OAuthError> {
    let value = headers
        .get(AUTHORIZATION)
        .ok_or_else(|| OAuthError::Unauthenticated("Missing Authorization header".to_string()))?;
    let value = value.to_str().map_err(|_| {
        OAuthError::Unauthenticated("Authorization header is not valid text".to_string())
    })?;
    match value.split_once(' ') {
        Some((scheme, token)) if scheme.eq_ignore_ascii_case("bearer") && !token.trim().is_empty() => {
            Ok(token.trim())
        }
        _ => Err(OAuthError::Unauthenticated(
            "Authorization header is not a bearer token".to_string(),
        )),
    }
}

/// Verifies bearer tokens with a locally cached key and enforces scope requirements.
///
/// The verifier can be swapped while requests are in flight; each request uses the key
/// that was current when it started.
#[derive(Debug, Clone)]
pub struct ResourceGuard {
    verifier: Arc<RwLock<Arc<TokenVerifier>>>,
}

impl ResourceGuard {
    pub fn new(verifier: TokenVerifier) -> Self {
        Self {
            verifier: Arc::new(RwLock::new(Arc::new(verifier))),
        }
    }

    /// Install a new verification key
    pub fn replace_verifier(&self, verifier: TokenVerifier) {
        match self.verifier.write() {
            Ok(mut current) => *current = Arc::new(verifier),
            Err(poisoned) => *poisoned.into_inner() = Arc::new(verifier),
        }
    }

    pub fn verifier(&self) -> Arc<TokenVerifier> {
        match self.verifier.read() {
            Ok(current) => current.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Extract and verify the bearer token of a request
    pub fn authenticate(&self, headers: &HeaderMap) -> Result<AccessTokenClaims, OAuthError> {
        let token = extract_bearer(headers).inspect_err(|e| debug!("Rejected request: {}", e))?;
        self.verify(token)
    }

    pub fn verify(&self, token: &str) -> Result<AccessTokenClaims, OAuthError> {
        self.verifier().verify(token).map_err(|e| {
            match &e {
                VerificationError::Expired { .. } => debug!("Rejected expired token"),
                _ => warn!("Rejected bearer token: {}", e),
            }
            OAuthError::Unauthenticated(e.to_string())
        })
    }

    /// Check that the token carries every scope in `required`
    pub fn authorize(
        &self,
        claims: &AccessTokenClaims,
        required: &ScopeSet,
    ) -> Result<(), OAuthError> {
        if claims.has_scopes(required) {
            Ok(())
        } else {
            warn!(
                "Token for '{}' has scope '{}', route requires '{}'",
                claims.sub, claims.scope, required
            );
            Err(OAuthError::InsufficientScope {
                required: required.to_string(),
            })
        }
    }
}

impl From<&AccessTokenClaims> for Principal {
    fn from(claims: &AccessTokenClaims) -> Self {
        Principal {
            username: claims.sub.clone(),
            authorities: claims.authorities.clone(),
        }
    }
}
