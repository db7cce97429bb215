use super::{AuthorizationCode, CodeStore, ConsumeError, StoreError};
use async_trait::async_trait;
use moka::future::Cache as MokaCache;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

struct CodeEntry {
    code: AuthorizationCode,
    redeemed: AtomicBool,
}

/// Process-local code store. Entries stay until TTL eviction so a replayed code is
/// reported as already used rather than unknown.
#[derive(Clone)]
pub struct InMemoryCodeStore {
    codes: MokaCache<String, Arc<CodeEntry>>,
}

impl InMemoryCodeStore {
    pub fn new(ttl: Duration) -> Self {
        let codes = MokaCache::builder()
            .time_to_live(ttl)
            .max_capacity(100_000)
            .build();
        Self { codes }
    }
}

#[async_trait]
impl CodeStore for InMemoryCodeStore {
    async fn save(&self, code: &AuthorizationCode) -> Result<(), StoreError> {
        let entry = CodeEntry {
            code: code.clone(),
            redeemed: AtomicBool::new(false),
        };
        self.codes.insert(code.code.clone(), Arc::new(entry)).await;
        Ok(())
    }

    async fn consume(&self, code: &str) -> Result<AuthorizationCode, ConsumeError> {
        let entry = self.codes.get(code).await.ok_or(ConsumeError::NotFound)?;
        entry
            .redeemed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| ConsumeError::AlreadyUsed)?;
        Ok(entry.code.clone())
    }

    async fn health_check(&self) -> Result<(), String> {
        Ok(())
    }
}
