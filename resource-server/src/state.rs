use crate::config::Settings;
use crate::messages::MessageStore;
use oauth_core::{ResourceGuard, TokenVerifier};
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub guard: ResourceGuard,
    pub messages: Arc<MessageStore>,
}

impl AppState {
    pub fn new(settings: Settings, verifier: TokenVerifier) -> Self {
        Self {
            settings: Arc::new(settings),
            guard: ResourceGuard::new(verifier),
            messages: Arc::new(MessageStore::new()),
        }
    }
}
