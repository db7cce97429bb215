//! The password and authorization-code grants.
//!
//! [`AuthorizationCore`] owns the client and authorization code lifecycles. Its
//! collaborators (client registry, user directory, code store, codec) are injected so
//! any of them can be replaced by a persistent or distributed implementation.

use crate::clients::{ClientRegistry, GrantType, RegistryError};
use crate::codec::{AccessTokenClaims, TokenCodec, TokenKey};
use crate::codes::{AuthorizationCode, CodeStore, ConsumeError};
use crate::error::OAuthError;
use crate::identity::{Principal, UserDirectory};
use crate::random;
use crate::scope::{ScopePolicy, ScopeSet};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use url::Url;

#[derive(Debug, Clone)]
pub struct GrantPolicy {
    /// `iss` claim of issued tokens
    pub issuer: String,
    pub scope_policy: ScopePolicy,
    pub access_token_ttl: Duration,
    pub code_ttl: Duration,
}

impl Default for GrantPolicy {
    fn default() -> Self {
        Self {
            issuer: "http://localhost:9999".to_string(),
            scope_policy: ScopePolicy::Reject,
            access_token_ttl: Duration::from_secs(43200),
            code_ttl: Duration::from_secs(300),
        }
    }
}

/// Resource owner password credentials grant input
#[derive(Debug, Clone)]
pub struct PasswordGrant {
    pub client_id: String,
    pub client_secret: String,
    pub username: String,
    pub password: String,
    pub scope: Option<ScopeSet>,
}

/// Authorization-code exchange input
#[derive(Debug, Clone)]
pub struct CodeExchange {
    pub client_id: String,
    pub client_secret: String,
    pub code: String,
    pub redirect_uri: Option<String>,
}

/// Query of an authorization request
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthorizeRequest {
    #[serde(default)]
    pub response_type: String,
    #[serde(default)]
    pub client_id: String,
    pub redirect_uri: Option<String>,
    pub scope: Option<String>,
    pub state: Option<String>,
}

/// An authorization request that passed client and redirect URI checks
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatedAuthorization {
    pub client_id: String,
    pub redirect_uri: String,
    /// The request named `redirect_uri`, so the exchange must repeat it
    #[serde(default)]
    pub redirect_uri_explicit: bool,
    /// Scopes as requested; resolved against the owner's ceiling at approval
    pub requested_scope: Option<ScopeSet>,
    pub state: Option<String>,
}

impl ValidatedAuthorization {
    pub fn redirect_with_code(&self, code: &str) -> String {
        self.redirect_with(&[("code", code)])
    }

    pub fn redirect_with_error(&self, error: &OAuthError) -> String {
        let description = error.public_description();
        self.redirect_with(&[
            ("error", error.code()),
            ("error_description", description.as_str()),
        ])
    }

    fn redirect_with(&self, params: &[(&str, &str)]) -> String {
        match Url::parse(&self.redirect_uri) {
            Ok(mut url) => {
                {
                    let mut query = url.query_pairs_mut();
                    for (key, value) in params {
                        query.append_pair(key, value);
                    }
                    if let Some(state) = &self.state {
                        query.append_pair("state", state);
                    }
                }
                url.to_string()
            }
            // Validated URIs always parse; fall back to the bare URI otherwise.
            Err(_) => self.redirect_uri.clone(),
        }
    }
}

/// How an authorization request failed
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AuthorizeError {
    /// The client or redirect URI cannot be trusted; show the error, never redirect
    #[error("{0}")]
    Fatal(OAuthError),
    /// Send the user agent back to the client with the error
    #[error("{error}")]
    Redirect {
        location: String,
        error: OAuthError,
    },
}

impl AuthorizeError {
    fn redirect(validated: &ValidatedAuthorization, error: OAuthError) -> Self {
        Self::Redirect {
            location: validated.redirect_with_error(&error),
            error,
        }
    }
}

/// Successful token response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedToken {
    pub access_token: String,
    pub token_type: &'static str,
    pub expires_in: i64,
    pub scope: ScopeSet,
    pub claims: AccessTokenClaims,
}

/// Identity resolved from a presented token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserInfo {
    pub name: String,
    pub authorities: BTreeSet<String>,
    pub client_id: String,
    pub scope: ScopeSet,
}

pub struct AuthorizationCore {
    clients: Arc<dyn ClientRegistry>,
    users: Arc<dyn UserDirectory>,
    codes: Arc<dyn CodeStore>,
    codec: Arc<TokenCodec>,
    policy: GrantPolicy,
}

impl AuthorizationCore {
    pub fn new(
        clients: Arc<dyn ClientRegistry>,
        users: Arc<dyn UserDirectory>,
        codes: Arc<dyn CodeStore>,
        codec: Arc<TokenCodec>,
        policy: GrantPolicy,
    ) -> Self {
        Self {
            clients,
            users,
            codes,
            codec,
            policy,
        }
    }

    pub fn policy(&self) -> &GrantPolicy {
        &self.policy
    }

    pub fn users(&self) -> &Arc<dyn UserDirectory> {
        &self.users
    }

    pub fn codes(&self) -> &Arc<dyn CodeStore> {
        &self.codes
    }

    /// Resource owner password credentials grant
    pub async fn password(&self, grant: PasswordGrant) -> Result<IssuedToken, OAuthError> {
        let client = self
            .clients
            .authenticate_client(&grant.client_id, &grant.client_secret)
            .await?;
        if !client.allows_grant(GrantType::Password) {
            warn!("Client '{}' is not allowed the password grant", client.client_id);
            return Err(OAuthError::UnauthorizedClient(
                GrantType::Password.to_string(),
            ));
        }

        let owner = self
            .users
            .authenticate(&grant.username, &grant.password)
            .await?;
        let ceiling = client.allowed_scopes.intersection(&owner.allowed_scopes);
        let scope = self
            .policy
            .scope_policy
            .resolve(grant.scope.as_ref(), &ceiling)
            .inspect_err(|e| {
                warn!(
                    "Password grant for '{}' via '{}' rejected: {}",
                    owner.username, client.client_id, e
                )
            })?;

        let token = self.issue(&client.client_id, &owner.principal(), scope)?;
        info!(
            "Issued password-grant token for '{}' via client '{}' with scope '{}'",
            owner.username, client.client_id, token.scope
        );
        Ok(token)
    }

    /// First phase of the authorization-code grant: check who is asking and where the
    /// answer goes, before any user interaction.
    pub async fn validate_authorize(
        &self,
        request: &AuthorizeRequest,
    ) -> Result<ValidatedAuthorization, AuthorizeError> {
        if request.client_id.is_empty() {
            return Err(AuthorizeError::Fatal(OAuthError::InvalidRequest(
                "client_id is required".to_string(),
            )));
        }
        let client = match self.clients.lookup(&request.client_id).await {
            Ok(client) => client,
            Err(RegistryError::NotFound(_)) => {
                warn!("Authorization request from unknown client '{}'", request.client_id);
                return Err(AuthorizeError::Fatal(OAuthError::InvalidClient(format!(
                    "unknown client '{}'",
                    request.client_id
                ))));
            }
            Err(RegistryError::Unavailable(e)) => {
                return Err(AuthorizeError::Fatal(OAuthError::Server(e)))
            }
        };
        let redirect_uri = client
            .resolve_redirect_uri(request.redirect_uri.as_deref())
            .map_err(AuthorizeError::Fatal)?;

        let requested_scope = request
            .scope
            .as_deref()
            .map(ScopeSet::parse)
            .filter(|scope| !scope.is_empty());
        let validated = ValidatedAuthorization {
            client_id: client.client_id.clone(),
            redirect_uri,
            redirect_uri_explicit: request.redirect_uri.is_some(),
            requested_scope,
            state: request.state.clone(),
        };

        if request.response_type != "code" {
            return Err(AuthorizeError::redirect(
                &validated,
                OAuthError::UnsupportedResponseType(format!(
                    "Unsupported response type: '{}'",
                    request.response_type
                )),
            ));
        }
        if !client.allows_grant(GrantType::AuthorizationCode) {
            return Err(AuthorizeError::redirect(
                &validated,
                OAuthError::UnauthorizedClient(GrantType::AuthorizationCode.to_string()),
            ));
        }
        if let Err(e) = self
            .policy
            .scope_policy
            .resolve(validated.requested_scope.as_ref(), &client.allowed_scopes)
        {
            return Err(AuthorizeError::redirect(&validated, e));
        }

        debug!(
            "Validated authorization request from '{}' redirecting to {}",
            validated.client_id, validated.redirect_uri
        );
        Ok(validated)
    }

    /// The resource owner approved: mint and store a code bound to the request
    pub async fn approve(
        &self,
        validated: &ValidatedAuthorization,
        username: &str,
    ) -> Result<AuthorizationCode, AuthorizeError> {
        let client = self
            .clients
            .lookup(&validated.client_id)
            .await
            .map_err(|e| AuthorizeError::Fatal(OAuthError::InvalidClient(e.to_string())))?;
        let owner = self.users.find(username).await.ok_or_else(|| {
            AuthorizeError::redirect(
                validated,
                OAuthError::AccessDenied("Unknown resource owner".to_string()),
            )
        })?;

        let ceiling = client.allowed_scopes.intersection(&owner.allowed_scopes);
        let scopes = self
            .policy
            .scope_policy
            .resolve(validated.requested_scope.as_ref(), &ceiling)
            .map_err(|e| AuthorizeError::redirect(validated, e))?;

        let code = AuthorizationCode {
            code: random::secure_token(),
            client_id: client.client_id.clone(),
            principal: owner.principal(),
            scopes,
            redirect_uri: validated.redirect_uri.clone(),
            redirect_uri_explicit: validated.redirect_uri_explicit,
            expires_at: chrono::Utc::now().timestamp() + self.policy.code_ttl.as_secs() as i64,
        };
        self.codes.save(&code).await.map_err(|e| {
            AuthorizeError::redirect(validated, OAuthError::Server(e.to_string()))
        })?;

        info!(
            "Issued authorization code {} for '{}' to client '{}'",
            random::redact(&code.code),
            username,
            client.client_id
        );
        Ok(code)
    }

    /// Second phase of the authorization-code grant
    pub async fn exchange(&self, exchange: CodeExchange) -> Result<IssuedToken, OAuthError> {
        let client = self
            .clients
            .authenticate_client(&exchange.client_id, &exchange.client_secret)
            .await?;
        if !client.allows_grant(GrantType::AuthorizationCode) {
            warn!(
                "Client '{}' is not allowed the authorization_code grant",
                client.client_id
            );
            return Err(OAuthError::UnauthorizedClient(
                GrantType::AuthorizationCode.to_string(),
            ));
        }

        let redacted = random::redact(&exchange.code);
        let code = match self.codes.consume(&exchange.code).await {
            Ok(code) => code,
            Err(ConsumeError::AlreadyUsed) => {
                warn!("Authorization code {} was already used", redacted);
                return Err(OAuthError::InvalidGrant("code already used".to_string()));
            }
            Err(ConsumeError::NotFound) => {
                warn!("Authorization code {} not found", redacted);
                return Err(OAuthError::InvalidGrant("code not found".to_string()));
            }
            Err(ConsumeError::Store(e)) => return Err(OAuthError::Server(e.to_string())),
        };

        if code.is_expired_at(chrono::Utc::now().timestamp()) {
            warn!("Authorization code {} expired", redacted);
            return Err(OAuthError::InvalidGrant("code expired".to_string()));
        }
        if code.client_id != client.client_id {
            warn!(
                "Authorization code {} issued to '{}' presented by '{}'",
                redacted, code.client_id, client.client_id
            );
            return Err(OAuthError::InvalidGrant("client mismatch".to_string()));
        }
        let redirect_matches = match exchange.redirect_uri.as_deref() {
            Some(uri) => uri == code.redirect_uri,
            None => !code.redirect_uri_explicit && client.redirect_uris.len() == 1,
        };
        if !redirect_matches {
            warn!("Authorization code {} presented with another redirect_uri", redacted);
            return Err(OAuthError::InvalidGrant("redirect_uri mismatch".to_string()));
        }

        let token = self.issue(&client.client_id, &code.principal, code.scopes)?;
        info!(
            "Exchanged authorization code {} for '{}' via client '{}'",
            redacted, code.principal.username, client.client_id
        );
        Ok(token)
    }

    /// Identity behind a presented access token
    pub fn userinfo(&self, token: &str) -> Result<UserInfo, OAuthError> {
        let claims = self
            .codec
            .verify(token)
            .map_err(|e| OAuthError::Unauthenticated(e.to_string()))?;
        Ok(UserInfo {
            name: claims.sub,
            authorities: claims.authorities,
            client_id: claims.client_id,
            scope: claims.scope,
        })
    }

    pub fn token_key(&self) -> TokenKey {
        self.codec.token_key()
    }

    fn issue(
        &self,
        client_id: &str,
        principal: &Principal,
        scope: ScopeSet,
    ) -> Result<IssuedToken, OAuthError> {
        let ttl = self.policy.access_token_ttl.as_secs() as i64;
        let claims = AccessTokenClaims::new(
            self.policy.issuer.clone(),
            principal.username.clone(),
            client_id,
            scope,
            principal.authorities.clone(),
            chrono::Utc::now().timestamp(),
            ttl,
        );
        let access_token = self
            .codec
            .issue(&claims)
            .map_err(|e| OAuthError::Server(e.to_string()))?;
        Ok(IssuedToken {
            access_token,
            token_type: "bearer",
            expires_in: ttl,
            scope: claims.scope.clone(),
            claims,
        })
    }
}
