//! Key/value cache backends for login and gateway sessions

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

pub mod memory;
pub mod redis;

pub use memory::InMemoryCache;
pub use self::redis::RedisCache;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Failed to serialize value: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Failed to parse value: {0}")]
    Deserialization(String),
    #[error("Redis error: {0}")]
    Redis(String),
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Which backend holds sessions and authorization codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StoreKind {
    #[default]
    InMemory,
    Redis,
}

impl FromStr for StoreKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "in-memory" => Ok(Self::InMemory),
            "redis" => Ok(Self::Redis),
            other => Err(format!("unknown store kind '{other}'")),
        }
    }
}

impl fmt::Display for StoreKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InMemory => f.write_str("in-memory"),
            Self::Redis => f.write_str("redis"),
        }
    }
}

/// Interface every session backend fulfils.
///
/// Values are stored as JSON and expire after the backend's TTL.
#[async_trait::async_trait]
pub trait CacheBackend: Send + Sync {
    async fn set<T: Serialize + Send + Sync>(&self, key: &str, value: &T)
        -> Result<(), CacheError>;

    async fn get<T: DeserializeOwned + Send + Sync>(
        &self,
        key: &str,
    ) -> Result<Option<T>, CacheError>;

    /// Ok(()) when the backend is reachable
    async fn health_check(&self) -> Result<(), String>;

    async fn delete(&self, key: &str) -> Result<(), CacheError>;

    /// Read and delete in one step; of several concurrent callers at most one gets the value
    async fn take<T: DeserializeOwned + Send + Sync>(
        &self,
        key: &str,
    ) -> Result<Option<T>, CacheError>;
}

/// Session cache selected at startup from configuration
#[derive(Clone)]
pub enum Cache {
    InMemory(InMemoryCache),
    Redis(RedisCache),
}

#[async_trait::async_trait]
impl CacheBackend for Cache {
    async fn set<T: Serialize + Send + Sync>(
        &self,
        key: &str,
        value: &T,
    ) -> Result<(), CacheError> {
        match self {
            Self::InMemory(cache) => cache.set(key, value).await,
            Self::Redis(cache) => cache.set(key, value).await,
        }
    }

    async fn get<T: DeserializeOwned + Send + Sync>(
        &self,
        key: &str,
    ) -> Result<Option<T>, CacheError> {
        match self {
            Self::InMemory(cache) => cache.get(key).await,
            Self::Redis(cache) => cache.get(key).await,
        }
    }

    async fn health_check(&self) -> Result<(), String> {
        match self {
            Self::InMemory(cache) => cache.health_check().await,
            Self::Redis(cache) => cache.health_check().await,
        }
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        match self {
            Self::InMemory(cache) => cache.delete(key).await,
            Self::Redis(cache) => cache.delete(key).await,
        }
    }

    async fn take<T: DeserializeOwned + Send + Sync>(
        &self,
        key: &str,
    ) -> Result<Option<T>, CacheError> {
        match self {
            Self::InMemory(cache) => cache.take(key).await,
            Self::Redis(cache) => cache.take(key).await,
        }
    }
}

/// Build the configured backend. `key_prefix` namespaces keys in a shared redis.
pub async fn create_cache(
    kind: StoreKind,
    redis_url: &str,
    key_prefix: &str,
    ttl_secs: u64,
) -> Result<Cache, CacheError> {
    match kind {
        StoreKind::InMemory => Ok(Cache::InMemory(InMemoryCache::new(ttl_secs, 64))),
        StoreKind::Redis => {
            if redis_url.is_empty() {
                return Err(CacheError::Config(
                    "Redis URL is required for the redis store".to_string(),
                ));
            }
            let cache = RedisCache::new(redis_url, key_prefix, ttl_secs)
                .await
                .map_err(CacheError::Config)?;
            Ok(Cache::Redis(cache))
        }
    }
}
