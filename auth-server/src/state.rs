use crate::config::{Settings, SettingsError};
use log::info;
use oauth_core::store::{create_cache, InMemoryCache};
use oauth_core::{
    AuthorizationCore, Cache, CacheBackend, CodeStore, InMemoryCodeStore, RedisCodeStore,
    StoreKind,
};
use std::sync::Arc;
use std::time::Duration;

/// Key prefix for everything this service keeps in a shared redis
const REDIS_PREFIX: &str = "auth:";

#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub core: Arc<AuthorizationCore>,
    /// Login sessions and pending consent decisions
    pub sessions: Arc<Cache>,
}

impl AppState {
    pub async fn new(settings: Settings) -> Result<Self, SettingsError> {
        let (sessions, codes): (Cache, Arc<dyn CodeStore>) = match settings.store_kind()? {
            StoreKind::InMemory => (
                Cache::InMemory(InMemoryCache::new(settings.session.ttl, 64)),
                Arc::new(InMemoryCodeStore::new(Duration::from_secs(
                    settings.token.code_ttl,
                ))),
            ),
            StoreKind::Redis => {
                let sessions = create_cache(
                    StoreKind::Redis,
                    &settings.store.redis_url,
                    REDIS_PREFIX,
                    settings.session.ttl,
                )
                .await
                .map_err(|e| SettingsError::Invalid(e.to_string()))?;
                let codes = RedisCodeStore::new(&settings.store.redis_url, settings.token.code_ttl)
                    .await
                    .map_err(|e| SettingsError::Invalid(e.to_string()))?;
                (sessions, Arc::new(codes))
            }
        };
        info!("Using {} store for sessions and authorization codes", settings.store.kind);
        Self::with_stores(settings, sessions, codes)
    }

    pub fn with_stores(
        settings: Settings,
        sessions: Cache,
        codes: Arc<dyn CodeStore>,
    ) -> Result<Self, SettingsError> {
        let codec = settings.codec()?;
        info!(
            "Signing access tokens with {} (kid '{}')",
            codec.algorithm(),
            settings.token.key_id
        );
        let core = AuthorizationCore::new(
            Arc::new(settings.client_registry()?),
            Arc::new(settings.user_directory()?),
            codes,
            Arc::new(codec),
            settings.grant_policy()?,
        );
        Ok(Self {
            settings: Arc::new(settings),
            core: Arc::new(core),
            sessions: Arc::new(sessions),
        })
    }

    /// Check if the session and code stores are reachable
    pub async fn health_check(&self) -> bool {
        self.sessions.health_check().await.is_ok() && self.core.codes().health_check().await.is_ok()
    }

    #[cfg(test)]
    pub fn for_testing(settings: Settings) -> Self {
        let sessions = Cache::InMemory(InMemoryCache::new(settings.session.ttl, 16));
        let codes = Arc::new(InMemoryCodeStore::new(Duration::from_secs(
            settings.token.code_ttl,
        )));
        match Self::with_stores(settings, sessions, codes) {
            Ok(state) => state,
            Err(e) => panic!("invalid test settings: {e}"),
        }
    }
}
