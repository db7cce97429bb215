//! Single-use authorization code storage.
//!
//! Consumption is one atomic step on the backing store: exactly one of any number of
//! concurrent `consume` calls for the same code gets the code back.

use crate::identity::Principal;
use crate::scope::ScopeSet;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod memory;
pub mod redis;

pub use memory::InMemoryCodeStore;
pub use self::redis::RedisCodeStore;

/// A minted authorization code and everything it is bound to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizationCode {
    pub code: String,
    pub client_id: String,
    pub principal: Principal,
    pub scopes: ScopeSet,
    pub redirect_uri: String,
    /// Whether the authorization request named `redirect_uri` itself
    #[serde(default)]
    pub redirect_uri_explicit: bool,
    /// Unix seconds
    pub expires_at: i64,
}

impl AuthorizationCode {
    pub fn is_expired_at(&self, now: i64) -> bool {
        now > self.expires_at
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("Failed to serialize authorization code: {0}")]
    Serialization(String),
    #[error("Redis error: {0}")]
    Redis(String),
    #[error("Configuration error: {0}")]
    Config(String),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConsumeError {
    #[error("Authorization code not found")]
    NotFound,
    #[error("Authorization code already used")]
    AlreadyUsed,
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[async_trait]
pub trait CodeStore: Send + Sync {
    async fn save(&self, code: &AuthorizationCode) -> Result<(), StoreError>;

    /// Atomically claim a code. Every call after the first successful one fails with
    /// [`ConsumeError::AlreadyUsed`] for as long as the store remembers the code.
    async fn consume(&self, code: &str) -> Result<AuthorizationCode, ConsumeError>;

    async fn health_check(&self) -> Result<(), String>;
}
