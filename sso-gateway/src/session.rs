//! Per-browser SSO session state machine and its storage.
//!
//! `Anonymous -> Authenticating -> Authenticated -> Expired -> Authenticating`. A failed
//! callback goes back to `Anonymous`. The access token only ever lives here, server side.

use crate::state::AppState;
use http::HeaderMap;
use log::{debug, warn};
use oauth_core::headers::{read_cookie, SetCookie};
use oauth_core::{random, CacheBackend, CacheError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Who the gateway session belongs to, as reported by `/userinfo`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub name: String,
    #[serde(default)]
    pub authorities: BTreeSet<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SessionState {
    #[default]
    Anonymous,
    /// Sent to the authorization server; `state` must come back on the callback
    Authenticating { state: String, return_to: String },
    Authenticated {
        user: UserProfile,
        access_token: String,
        /// Unix seconds after which the token is treated as expired
        token_expiry: i64,
    },
    /// The token stopped working; a new authorization is needed
    Expired { return_to: String },
}

impl SessionState {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Anonymous => "anonymous",
            Self::Authenticating { .. } => "authenticating",
            Self::Authenticated { .. } => "authenticated",
            Self::Expired { .. } => "expired",
        }
    }

    /// Start an authorization round trip. Returns the new state and its CSRF `state` value.
    pub fn begin_authentication(&self, return_to: &str) -> (Self, String) {
        let return_to = match self {
            Self::Expired { return_to } => return_to.clone(),
            _ => return_to.to_string(),
        };
        let csrf = random::secure_token();
        (
            Self::Authenticating {
                state: csrf.clone(),
                return_to,
            },
            csrf,
        )
    }

    /// `return_to` of a pending authorization whose `state` matches
    pub fn callback_target(&self, returned_state: &str) -> Option<&str> {
        match self {
            Self::Authenticating { state, return_to } if state == returned_state => {
                Some(return_to.as_str())
            }
            _ => None,
        }
    }

    pub fn authenticated(user: UserProfile, access_token: String, expires_in: i64, now: i64) -> Self {
        Self::Authenticated {
            user,
            access_token,
            token_expiry: now.saturating_add(expires_in),
        }
    }

    /// The bearer token to send upstream, if it has not expired at `now`
    pub fn live_token(&self, now: i64) -> Option<&str> {
        match self {
            Self::Authenticated {
                access_token,
                token_expiry,
                ..
            } if now < *token_expiry => Some(access_token.as_str()),
            _ => None,
        }
    }

    pub fn user(&self) -> Option<&UserProfile> {
        match self {
            Self::Authenticated { user, .. } => Some(user),
            _ => None,
        }
    }

    /// Authenticated sessions whose token was refused or ran out
    pub fn expire(self, return_to: &str) -> Self {
        match self {
            Self::Authenticated { .. } => Self::Expired {
                return_to: return_to.to_string(),
            },
            other => other,
        }
    }
}

fn key(id: &str) -> String {
    format!("session:{id}")
}

/// A session loaded for one request
#[derive(Debug, Clone)]
pub struct Session {
    /// None until the session is first saved
    pub id: Option<String>,
    pub state: SessionState,
}

impl Session {
    /// Session of the request's cookie; unknown or unreadable sessions are anonymous
    pub async fn load(app: &AppState, headers: &HeaderMap) -> Self {
        let Some(id) = read_cookie(headers, &app.settings.session.cookie_name) else {
            return Self {
                id: None,
                state: SessionState::Anonymous,
            };
        };
        let state = match app.sessions.get::<SessionState>(&key(&id)).await {
            Ok(Some(state)) => state,
            Ok(None) => {
                debug!("Unknown or expired gateway session");
                SessionState::Anonymous
            }
            Err(e) => {
                warn!("Failed to read gateway session: {}", e);
                SessionState::Anonymous
            }
        };
        Self {
            id: Some(id),
            state,
        }
    }

    /// Persist `state`; returns a cookie when the browser needs a new one
    pub async fn save(&mut self, app: &AppState, state: SessionState) -> Result<Option<SetCookie>, CacheError> {
        let (id, cookie) = match &self.id {
            Some(id) => (id.clone(), None),
            None => {
                let id = random::secure_token();
                (id.clone(), Some(cookie(app, id)))
            }
        };
        debug!("Gateway session {} -> {}", self.state.name(), state.name());
        app.sessions.set(&key(&id), &state).await?;
        self.id = Some(id);
        self.state = state;
        Ok(cookie)
    }

    /// Persist `state` under a fresh id and drop the old one, so an id handed out
    /// before login is never authenticated
    pub async fn rotate(&mut self, app: &AppState, state: SessionState) -> Result<SetCookie, CacheError> {
        if let Some(old) = self.id.take() {
            if let Err(e) = app.sessions.delete(&key(&old)).await {
                warn!("Failed to delete previous gateway session: {}", e);
            }
        }
        let id = random::secure_token();
        debug!("Gateway session {} -> {} (new id)", self.state.name(), state.name());
        app.sessions.set(&key(&id), &state).await?;
        self.id = Some(id.clone());
        self.state = state;
        Ok(cookie(app, id))
    }

    /// Forget the session; returns a cookie that clears it
    pub async fn destroy(self, app: &AppState) -> SetCookie {
        if let Some(id) = &self.id {
            if let Err(e) = app.sessions.delete(&key(id)).await {
                warn!("Failed to delete gateway session: {}", e);
            }
        }
        SetCookie::removal(app.settings.session.cookie_name.clone())
            .secure(app.settings.session.cookie_secure)
    }
}

fn cookie(app: &AppState, id: String) -> SetCookie {
    SetCookie::new(app.settings.session.cookie_name.clone(), id)
        .max_age(app.settings.session.ttl)
        .secure(app.settings.session.cookie_secure)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alice() -> UserProfile {
        UserProfile {
            name: "alice".to_string(),
            authorities: BTreeSet::new(),
        }
    }

    #[test]
    fn test_state_machine() {
        let anonymous = SessionState::Anonymous;
        let (authenticating, csrf) = anonymous.begin_authentication("/");
        assert_eq!(authenticating.callback_target(&csrf), Some("/"));
        assert_eq!(authenticating.callback_target("forged"), None);

        let authenticated = SessionState::authenticated(alice(), "tok".to_string(), 60, 1_000);
        assert_eq!(authenticated.live_token(1_000), Some("tok"));
        assert_eq!(authenticated.live_token(1_060), None);
        assert_eq!(authenticated.user().map(|u| u.name.as_str()), Some("alice"));

        let expired = authenticated.expire("/api/messages");
        assert_eq!(
            expired,
            SessionState::Expired {
                return_to: "/api/messages".to_string()
            }
        );
        assert_eq!(expired.live_token(0), None);

        // Re-authentication goes back to where the token expired
        let (again, csrf) = expired.begin_authentication("/");
        assert_eq!(again.callback_target(&csrf), Some("/api/messages"));
    }

    #[test]
    fn test_only_authenticated_sessions_expire() {
        assert_eq!(SessionState::Anonymous.expire("/"), SessionState::Anonymous);
    }

    #[test]
    fn test_session_state_is_tagged() {
        let json = serde_json::to_value(SessionState::Expired {
            return_to: "/".to_string(),
        })
        .unwrap();
        assert_eq!(json["status"], "expired");
    }
}
