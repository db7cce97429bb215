//! Resource owners and the directory that authenticates them

use crate::error::OAuthError;
use crate::scope::ScopeSet;
use crate::secret::SecretHash;
use async_trait::async_trait;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, LazyLock};

/// An end user that can be authenticated by username and password
#[derive(Debug, Clone)]
pub struct ResourceOwner {
    pub username: String,
    pub credential_hash: SecretHash,
    pub authorities: BTreeSet<String>,
    /// Owner-level ceiling on the scopes any client may obtain for this user
    pub allowed_scopes: ScopeSet,
}

impl ResourceOwner {
    pub fn principal(&self) -> Principal {
        Principal {
            username: self.username.clone(),
            authorities: self.authorities.clone(),
        }
    }
}

/// The authenticated identity a request acts on behalf of
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub username: String,
    #[serde(default)]
    pub authorities: BTreeSet<String>,
}

impl Principal {
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            authorities: BTreeSet::new(),
        }
    }
}

static DUMMY_CREDENTIAL: LazyLock<SecretHash> =
    LazyLock::new(|| SecretHash::from_plain("not-a-registered-user-password"));

/// External identity collaborator consulted by the grant logic
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn find(&self, username: &str) -> Option<ResourceOwner>;

    /// Authenticate a resource owner. Any failure is `InvalidGrant`.
    async fn authenticate(
        &self,
        username: &str,
        password: &str,
    ) -> Result<ResourceOwner, OAuthError> {
        match self.find(username).await {
            Some(owner) if owner.credential_hash.verify(password) => {
                debug!("Authenticated resource owner '{}'", username);
                Ok(owner)
            }
            Some(_) => {
                warn!("Bad credentials for resource owner '{}'", username);
                Err(OAuthError::InvalidGrant("Bad credentials".to_string()))
            }
            None => {
                let _ = DUMMY_CREDENTIAL.verify(password);
                warn!("Unknown resource owner '{}'", username);
                Err(OAuthError::InvalidGrant("Bad credentials".to_string()))
            }
        }
    }
}

/// Users loaded once from configuration
#[derive(Debug, Clone, Default)]
pub struct StaticUserDirectory {
    users: Arc<HashMap<String, ResourceOwner>>,
}

impl StaticUserDirectory {
    pub fn new(users: Vec<ResourceOwner>) -> Self {
        let users = users
            .into_iter()
            .map(|user| (user.username.clone(), user))
            .collect();
        Self {
            users: Arc::new(users),
        }
    }

    /// `alice`/`alice` with `openid`, and `admin`/`admin` with `openid admin`
    pub fn demo() -> Self {
        Self::new(vec![
            ResourceOwner {
                username: "alice".to_string(),
                credential_hash: SecretHash::from_plain("alice"),
                authorities: ["ROLE_USER".to_string()].into_iter().collect(),
                allowed_scopes: ScopeSet::parse("openid"),
            },
            ResourceOwner {
                username: "admin".to_string(),
                credential_hash: SecretHash::from_plain("admin"),
                authorities: ["ROLE_USER".to_string(), "ROLE_ADMIN".to_string()]
                    .into_iter()
                    .collect(),
                allowed_scopes: ScopeSet::parse("openid admin"),
            },
        ])
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}

#[async_trait]
impl UserDirectory for StaticUserDirectory {
    async fn find(&self, username: &str) -> Option<ResourceOwner> {
        self.users.get(username).cloned()
    }
}
