use super::{CacheBackend, CacheError};
use async_trait::async_trait;
use log::error;
use redis::{aio::ConnectionManager, AsyncCommands, Client};
use serde::{de::DeserializeOwned, Serialize};

#[derive(Clone)]
pub struct RedisCache {
    conn_manager: ConnectionManager,
    key_prefix: String,
    ttl_secs: u64,
}

impl RedisCache {
    pub async fn new(redis_url: &str, key_prefix: &str, ttl_secs: u64) -> Result<Self, String> {
        let client = match Client::open(redis_url) {
            Ok(client) => client,
            Err(err) => {
                return Err(format!("Failed to connect to Redis: {}", err));
            }
        };

        let conn_manager = match ConnectionManager::new(client).await {
            Ok(manager) => manager,
            Err(err) => {
                return Err(format!(
                    "Failed to create Redis connection manager: {}",
                    err
                ));
            }
        };

        let cache = Self {
            conn_manager,
            key_prefix: key_prefix.to_string(),
            ttl_secs: ttl_secs.max(1),
        };
        cache.health_check().await?;
        Ok(cache)
    }

    fn key(&self, key: &str) -> String {
        format!("{}{}", self.key_prefix, key)
    }
}

#[async_trait]
impl CacheBackend for RedisCache {
    async fn set<T: Serialize + Send + Sync>(
        &self,
        key: &str,
        value: &T,
    ) -> Result<(), CacheError> {
        let serialized = serde_json::to_string(value)?;
        let mut conn = self.conn_manager.clone();

        match conn
            .set_ex::<_, _, ()>(self.key(key), serialized, self.ttl_secs)
            .await
        {
            Ok(_) => Ok(()),
            Err(err) => {
                error!("Redis error while setting a session key: {}", err);
                Err(CacheError::Redis(err.to_string()))
            }
        }
    }

    async fn get<T: DeserializeOwned + Send + Sync>(
        &self,
        key: &str,
    ) -> Result<Option<T>, CacheError> {
        let mut conn = self.conn_manager.clone();

        let result: Option<String> = match conn.get(self.key(key)).await {
            Ok(value) => value,
            Err(err) => {
                if err.kind() == redis::ErrorKind::TypeError {
                    return Ok(None);
                }
                error!("Redis error while getting a session key: {}", err);
                return Err(CacheError::Redis(err.to_string()));
            }
        };

        match result {
            Some(value) => serde_json::from_str(&value)
                .map_err(|e| CacheError::Deserialization(e.to_string()))
                .map(Some),
            None => Ok(None),
        }
    }

    async fn health_check(&self) -> Result<(), String> {
        let mut conn = self.conn_manager.clone();
        match redis::cmd("PING").query_async::<String>(&mut conn).await {
            Ok(_) => Ok(()),
            Err(err) => Err(format!("Redis health check failed: {}", err)),
        }
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        let mut conn = self.conn_manager.clone();

        match conn.del::<_, ()>(self.key(key)).await {
            Ok(_) => Ok(()),
            Err(err) => {
                error!("Redis error while deleting a session key: {}", err);
                Err(CacheError::Redis(err.to_string()))
            }
        }
    }

    async fn take<T: DeserializeOwned + Send + Sync>(
        &self,
        key: &str,
    ) -> Result<Option<T>, CacheError> {
        let mut conn = self.conn_manager.clone();

        let result = redis::cmd("GETDEL")
            .arg(self.key(key))
            .query_async::<Option<String>>(&mut conn)
            .await
            .map_err(|err| {
                error!("Redis error while taking a session key: {}", err);
                CacheError::Redis(err.to_string())
            })?;

        match result {
            Some(value) => serde_json::from_str(&value)
                .map_err(|e| CacheError::Deserialization(e.to_string()))
                .map(Some),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use redis_test::server::RedisServer;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Session {
        user: String,
    }

    #[tokio::test]
    #[ignore]
    async fn test_redis_cache_prefixes_keys() {
        let server = RedisServer::new();
        let url = match &server.addr {
            redis::ConnectionAddr::Tcp(host, port) => format!("redis://{host}:{port}/"),
            _ => "redis://127.0.0.1:6379/".to_string(),
        };
        let cache = RedisCache::new(&url, "gw:", 60).await.unwrap();
        let session = Session {
            user: "alice".to_string(),
        };
        cache.set("abc", &session).await.unwrap();
        assert_eq!(cache.get::<Session>("abc").await.unwrap(), Some(session));

        let mut conn = cache.conn_manager.clone();
        let raw: Option<String> = conn.get("gw:abc").await.unwrap();
        assert!(raw.is_some());

        let taken = cache.take::<Session>("abc").await.unwrap();
        assert_eq!(taken.map(|s| s.user).as_deref(), Some("alice"));
        assert!(cache.take::<Session>("abc").await.unwrap().is_none());
    }
}
