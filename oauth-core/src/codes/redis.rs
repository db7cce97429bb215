use super::{AuthorizationCode, CodeStore, ConsumeError, StoreError};
use async_trait::async_trait;
use log::error;
use redis::{aio::ConnectionManager, AsyncCommands, Client};

const CODE_PREFIX: &str = "oauth:code:";
const USED_PREFIX: &str = "oauth:code-used:";

/// Code store shared by every authorization server instance pointing at the same redis.
///
/// Consumption first claims a `used` marker with `SET NX`, which only one caller can win,
/// then reads and deletes the code itself.
#[derive(Clone)]
pub struct RedisCodeStore {
    conn_manager: ConnectionManager,
    ttl_secs: u64,
}

impl RedisCodeStore {
    pub async fn new(redis_url: &str, ttl_secs: u64) -> Result<Self, StoreError> {
        let client = Client::open(redis_url)
            .map_err(|err| StoreError::Config(format!("Failed to connect to Redis: {err}")))?;
        let conn_manager = ConnectionManager::new(client).await.map_err(|err| {
            StoreError::Config(format!("Failed to create Redis connection manager: {err}"))
        })?;

        let store = Self {
            conn_manager,
            ttl_secs: ttl_secs.max(1),
        };
        store.health_check().await.map_err(StoreError::Config)?;
        Ok(store)
    }
}

#[async_trait]
impl CodeStore for RedisCodeStore {
    async fn save(&self, code: &AuthorizationCode) -> Result<(), StoreError> {
        let serialized =
            serde_json::to_string(code).map_err(|e| StoreError::Serialization(e.to_string()))?;
        let mut conn = self.conn_manager.clone();
        conn.set_ex::<_, _, ()>(format!("{CODE_PREFIX}{}", code.code), serialized, self.ttl_secs)
            .await
            .map_err(|err| {
                error!("Redis error while saving authorization code: {}", err);
                StoreError::Redis(err.to_string())
            })
    }

    async fn consume(&self, code: &str) -> Result<AuthorizationCode, ConsumeError> {
        let mut conn = self.conn_manager.clone();
        let code_key = format!("{CODE_PREFIX}{code}");

        let claimed: Option<String> = redis::cmd("SET")
            .arg(format!("{USED_PREFIX}{code}"))
            .arg(1)
            .arg("NX")
            .arg("EX")
            .arg(self.ttl_secs)
            .query_async(&mut conn)
            .await
            .map_err(|err| StoreError::Redis(err.to_string()))?;
        if claimed.is_none() {
            return Err(ConsumeError::AlreadyUsed);
        }

        let stored: Option<String> = conn
            .get(&code_key)
            .await
            .map_err(|err| StoreError::Redis(err.to_string()))?;
        let stored = stored.ok_or(ConsumeError::NotFound)?;
        conn.del::<_, ()>(&code_key)
            .await
            .map_err(|err| StoreError::Redis(err.to_string()))?;

        serde_json::from_str(&stored)
            .map_err(|e| ConsumeError::Store(StoreError::Serialization(e.to_string())))
    }

    async fn health_check(&self) -> Result<(), String> {
        let mut conn = self.conn_manager.clone();
        match redis::cmd("PING").query_async::<String>(&mut conn).await {
            Ok(_) => Ok(()),
            Err(err) => Err(format!("Redis health check failed: {err}")),
        }
    }
}
