use crate::config::{Settings, SettingsError};
use crate::upstream::Upstream;
use log::info;
use oauth_core::store::{create_cache, InMemoryCache};
use oauth_core::{Cache, CacheBackend};
use std::sync::Arc;

/// Key prefix for sessions in a shared redis
const REDIS_PREFIX: &str = "gateway:";

#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub sessions: Arc<Cache>,
    pub upstream: Upstream,
}

impl AppState {
    pub async fn new(settings: Settings) -> Result<Self, SettingsError> {
        let kind = settings.store_kind()?;
        let sessions = create_cache(
            kind,
            &settings.session.redis_url,
            REDIS_PREFIX,
            settings.session.ttl,
        )
        .await
        .map_err(|e| SettingsError::Invalid(e.to_string()))?;
        info!("Using {} store for gateway sessions", kind);
        Self::with_sessions(settings, sessions)
    }

    pub fn with_sessions(settings: Settings, sessions: Cache) -> Result<Self, SettingsError> {
        let settings = Arc::new(settings);
        let upstream = Upstream::new(settings.clone())
            .map_err(|e| SettingsError::Invalid(format!("HTTP client: {e}")))?;
        Ok(Self {
            settings,
            sessions: Arc::new(sessions),
            upstream,
        })
    }

    pub async fn health_check(&self) -> bool {
        self.sessions.health_check().await.is_ok()
    }

    #[cfg(test)]
    pub fn for_testing(settings: Settings) -> Self {
        let sessions = Cache::InMemory(InMemoryCache::new(settings.session.ttl, 16));
        match Self::with_sessions(settings, sessions) {
            Ok(state) => state,
            Err(e) => panic!("invalid test settings: {e}"),
        }
    }
}
