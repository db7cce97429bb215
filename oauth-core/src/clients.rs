//! Registered OAuth clients and the registry the grant logic looks them up in

use crate::error::OAuthError;
use crate::scope::ScopeSet;
use crate::secret::SecretHash;
use async_trait::async_trait;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, LazyLock};
use thiserror::Error;

/// Grant types a client may be allowed to use
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrantType {
    Password,
    AuthorizationCode,
}

impl GrantType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Password => "password",
            Self::AuthorizationCode => "authorization_code",
        }
    }
}

impl fmt::Display for GrantType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GrantType {
    type Err = OAuthError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "password" => Ok(Self::Password),
            "authorization_code" => Ok(Self::AuthorizationCode),
            other => Err(OAuthError::UnsupportedGrantType(format!(
                "Unsupported grant type: {other}"
            ))),
        }
    }
}

/// A registered client. Immutable once registered.
#[derive(Debug, Clone)]
pub struct Client {
    pub client_id: String,
    pub secret: SecretHash,
    pub allowed_grant_types: BTreeSet<GrantType>,
    pub allowed_scopes: ScopeSet,
    /// Registered callback URIs; empty accepts any absolute http(s) URI
    pub redirect_uris: Vec<String>,
}

impl Client {
    pub fn allows_grant(&self, grant_type: GrantType) -> bool {
        self.allowed_grant_types.contains(&grant_type)
    }

    /// Pick the redirect URI for an authorization request.
    ///
    /// With registered URIs the requested one must match exactly; a missing request falls
    /// back to the single registered URI.
    pub fn resolve_redirect_uri(&self, requested: Option<&str>) -> Result<String, OAuthError> {
        match (requested, self.redirect_uris.as_slice()) {
            (Some(uri), []) => {
                let parsed = url::Url::parse(uri).map_err(|_| {
                    OAuthError::InvalidRequest("Invalid redirect_uri format".to_string())
                })?;
                if parsed.scheme() != "http" && parsed.scheme() != "https" {
                    return Err(OAuthError::InvalidRequest(
                        "redirect_uri must be an http(s) URI".to_string(),
                    ));
                }
                Ok(uri.to_string())
            }
            (Some(uri), registered) => registered
                .iter()
                .find(|candidate| candidate.as_str() == uri)
                .cloned()
                .ok_or_else(|| {
                    OAuthError::InvalidRequest(
                        "redirect_uri does not match any registered redirect URI".to_string(),
                    )
                }),
            (None, [only]) => Ok(only.clone()),
            (None, _) => Err(OAuthError::InvalidRequest(
                "redirect_uri is required".to_string(),
            )),
        }
    }
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Client not found: {0}")]
    NotFound(String),
    #[error("Client registry unavailable: {0}")]
    Unavailable(String),
}

/// Unknown clients are compared against this digest so that a lookup miss costs the same
/// as a secret mismatch.
static DUMMY_SECRET: LazyLock<SecretHash> =
    LazyLock::new(|| SecretHash::from_plain("not-a-registered-client-secret"));

/// Source of registered clients.
///
/// Grant logic only talks to this trait, so a persistent or remote backing store can be
/// swapped in without touching it.
#[async_trait]
pub trait ClientRegistry: Send + Sync {
    async fn lookup(&self, client_id: &str) -> Result<Client, RegistryError>;

    /// Check a client's credentials
    async fn authenticate(&self, client_id: &str, client_secret: &str) -> bool {
        match self.authenticate_client(client_id, client_secret).await {
            Ok(_) => true,
            Err(_) => false,
        }
    }

    /// Check a client's credentials and return the client on success
    async fn authenticate_client(
        &self,
        client_id: &str,
        client_secret: &str,
    ) -> Result<Client, OAuthError> {
        match self.lookup(client_id).await {
            Ok(client) => {
                if client.secret.verify(client_secret) {
                    debug!("Authenticated client '{}'", client_id);
                    Ok(client)
                } else {
                    warn!("Client authentication failed for '{}': bad secret", client_id);
                    Err(OAuthError::InvalidClient(format!(
                        "bad secret for client '{client_id}'"
                    )))
                }
            }
            Err(RegistryError::NotFound(_)) => {
                let _ = DUMMY_SECRET.verify(client_secret);
                warn!("Client authentication failed for '{}': unknown client", client_id);
                Err(OAuthError::InvalidClient(format!(
                    "unknown client '{client_id}'"
                )))
            }
            Err(RegistryError::Unavailable(e)) => Err(OAuthError::Server(e)),
        }
    }
}

/// Client registry loaded once from configuration
#[derive(Debug, Clone, Default)]
pub struct StaticClientRegistry {
    clients: Arc<HashMap<String, Client>>,
}

impl StaticClientRegistry {
    pub fn new(clients: Vec<Client>) -> Self {
        let clients = clients
            .into_iter()
            .map(|client| (client.client_id.clone(), client))
            .collect();
        Self {
            clients: Arc::new(clients),
        }
    }

    /// The `demo`/`demo` client with the password and authorization-code grants and the
    /// `openid` scope
    pub fn demo() -> Self {
        Self::new(vec![Client {
            client_id: "demo".to_string(),
            secret: SecretHash::from_plain("demo"),
            allowed_grant_types: [GrantType::Password, GrantType::AuthorizationCode]
                .into_iter()
                .collect(),
            allowed_scopes: ScopeSet::parse("openid"),
            redirect_uris: Vec::new(),
        }])
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}

#[async_trait]
impl ClientRegistry for StaticClientRegistry {
    async fn lookup(&self, client_id: &str) -> Result<Client, RegistryError> {
        self.clients
            .get(client_id)
            .cloned()
            .ok_or_else(|| RegistryError::NotFound(client_id.to_string()))
    }
}
