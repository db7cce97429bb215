//! Login sessions and pending consent decisions, kept in the session cache

use crate::state::AppState;
use http::HeaderMap;
use log::{debug, warn};
use oauth_core::headers::{read_cookie, SetCookie};
use oauth_core::{random, CacheBackend, CacheError, ValidatedAuthorization};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginSession {
    pub username: String,
    pub authenticated_at: i64,
}

/// An authorization request waiting for the user's decision on the consent page
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingConsent {
    pub username: String,
    pub request: ValidatedAuthorization,
}

fn session_key(id: &str) -> String {
    format!("session:{id}")
}

fn consent_key(token: &str) -> String {
    format!("consent:{token}")
}

/// Session of the request's cookie, if it is still live
pub async fn current(state: &AppState, headers: &HeaderMap) -> Option<LoginSession> {
    let id = read_cookie(headers, &state.settings.session.cookie_name)?;
    match state.sessions.get::<LoginSession>(&session_key(&id)).await {
        Ok(session) => session,
        Err(e) => {
            warn!("Failed to read login session: {}", e);
            None
        }
    }
}

/// Create a session for `username` and return the cookie that carries it
pub async fn start(state: &AppState, username: &str) -> Result<SetCookie, CacheError> {
    let id = random::secure_token();
    let session = LoginSession {
        username: username.to_string(),
        authenticated_at: chrono::Utc::now().timestamp(),
    };
    state.sessions.set(&session_key(&id), &session).await?;
    debug!("Started login session {} for '{}'", random::redact(&id), username);
    Ok(cookie(state, id))
}

/// Drop the session of the request's cookie and return a cookie that clears it
pub async fn end(state: &AppState, headers: &HeaderMap) -> SetCookie {
    if let Some(id) = read_cookie(headers, &state.settings.session.cookie_name) {
        if let Err(e) = state.sessions.delete(&session_key(&id)).await {
            warn!("Failed to delete login session: {}", e);
        }
    }
    SetCookie::removal(state.settings.session.cookie_name.clone())
        .secure(state.settings.session.cookie_secure)
}

fn cookie(state: &AppState, id: String) -> SetCookie {
    SetCookie::new(state.settings.session.cookie_name.clone(), id)
        .max_age(state.settings.session.ttl)
        .secure(state.settings.session.cookie_secure)
}

/// Park a validated request until the user decides; returns the consent token
pub async fn park_consent(
    state: &AppState,
    username: &str,
    request: ValidatedAuthorization,
) -> Result<String, CacheError> {
    let token = random::secure_token();
    let pending = PendingConsent {
        username: username.to_string(),
        request,
    };
    state.sessions.set(&consent_key(&token), &pending).await?;
    Ok(token)
}

/// Take a parked request. Each consent token can be used once.
pub async fn take_consent(
    state: &AppState,
    token: &str,
) -> Result<Option<PendingConsent>, CacheError> {
    state.sessions.take::<PendingConsent>(&consent_key(token)).await
}
