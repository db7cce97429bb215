//! Gateway configuration, read from `GATEWAY_*` environment variables and an optional
//! TOML file.

use confique::Config;
use oauth_core::{Backoff, StoreKind};
use std::time::Duration;
use thiserror::Error;

/// File read when `GATEWAY_CONFIG_FILE` is not set. Missing files are ignored.
pub const DEFAULT_CONFIG_FILE: &str = "sso-gateway.toml";

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] confique::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Config, Clone)]
pub struct Settings {
    /// Listen port (default: 8080)
    #[config(env = "GATEWAY_PORT", default = 8080)]
    pub port: u16,

    #[config(nested)]
    pub sso: SsoConfig,

    #[config(nested)]
    pub upstream: UpstreamConfig,

    #[config(nested)]
    pub session: SessionConfig,
}

/// This gateway's registration with the authorization server
#[derive(Debug, Config, Clone)]
pub struct SsoConfig {
    #[config(env = "GATEWAY_SSO_CLIENT_ID", default = "demo")]
    pub client_id: String,

    #[config(env = "GATEWAY_SSO_CLIENT_SECRET", default = "demo")]
    pub client_secret: String,

    #[config(
        env = "GATEWAY_SSO_AUTHORIZE_URI",
        default = "http://localhost:9999/oauth/authorize"
    )]
    pub authorize_uri: String,

    #[config(env = "GATEWAY_SSO_TOKEN_URI", default = "http://localhost:9999/oauth/token")]
    pub token_uri: String,

    #[config(env = "GATEWAY_SSO_USERINFO_URI", default = "http://localhost:9999/userinfo")]
    pub userinfo_uri: String,

    /// Callback URI registered for the client; must point at this gateway's `/login`
    #[config(env = "GATEWAY_SSO_REDIRECT_URI", default = "http://localhost:8080/login")]
    pub redirect_uri: String,

    /// Space-separated scopes requested at authorization
    #[config(env = "GATEWAY_SSO_SCOPE", default = "openid")]
    pub scope: String,
}

/// The resource server the gateway proxies to
#[derive(Debug, Config, Clone)]
pub struct UpstreamConfig {
    #[config(env = "GATEWAY_UPSTREAM_API_BASE_URL", default = "http://localhost:18080")]
    pub api_base_url: String,

    /// Per-request timeout in seconds
    #[config(env = "GATEWAY_UPSTREAM_TIMEOUT", default = 10)]
    pub timeout: u64,

    /// Attempts for transient failures, including the first
    #[config(env = "GATEWAY_UPSTREAM_RETRIES", default = 3)]
    pub retries: u32,

    /// Delay before the first retry; doubles after each one
    #[config(env = "GATEWAY_UPSTREAM_BACKOFF_MS", default = 200)]
    pub backoff_ms: u64,
}

#[derive(Debug, Config, Clone)]
pub struct SessionConfig {
    #[config(env = "GATEWAY_SESSION_COOKIE_NAME", default = "GATEWAYSESSION")]
    pub cookie_name: String,

    #[config(env = "GATEWAY_SESSION_COOKIE_SECURE", default = false)]
    pub cookie_secure: bool,

    /// Session lifetime in seconds
    #[config(env = "GATEWAY_SESSION_TTL", default = 1800)]
    pub ttl: u64,

    /// `in-memory` or `redis`
    #[config(env = "GATEWAY_SESSION_STORE", default = "in-memory")]
    pub store: String,

    #[config(env = "GATEWAY_SESSION_REDIS_URL", default = "")]
    pub redis_url: String,
}

impl Settings {
    /// Load from the environment, then the config file
    pub fn load() -> Result<Self, SettingsError> {
        let path = std::env::var("GATEWAY_CONFIG_FILE")
            .unwrap_or_else(|_| DEFAULT_CONFIG_FILE.to_string());
        let settings = Settings::builder().env().file(path).load()?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        for (name, value) in [
            ("sso.authorize_uri", &self.sso.authorize_uri),
            ("sso.token_uri", &self.sso.token_uri),
            ("sso.userinfo_uri", &self.sso.userinfo_uri),
            ("sso.redirect_uri", &self.sso.redirect_uri),
            ("upstream.api_base_url", &self.upstream.api_base_url),
        ] {
            url::Url::parse(value)
                .map_err(|e| SettingsError::Invalid(format!("{name} '{value}': {e}")))?;
        }
        self.store_kind()?;
        if self.upstream.timeout == 0 {
            return Err(SettingsError::Invalid(
                "upstream.timeout must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn store_kind(&self) -> Result<StoreKind, SettingsError> {
        self.session.store.parse().map_err(SettingsError::Invalid)
    }

    pub fn upstream_timeout(&self) -> Duration {
        Duration::from_secs(self.upstream.timeout)
    }

    pub fn upstream_backoff(&self) -> Backoff {
        Backoff::new(
            Duration::from_millis(self.upstream.backoff_ms),
            Duration::from_secs(5),
            self.upstream.retries,
        )
    }

    /// Resource server URL for `path` (with or without a leading slash)
    pub fn api_url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.upstream.api_base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    /// Settings pointing at mock authorization and resource servers
    #[cfg(test)]
    pub fn for_test(auth_base: &str, api_base: &str) -> Self {
        Self {
            port: 0,
            sso: SsoConfig {
                client_id: "demo".to_string(),
                client_secret: "demo".to_string(),
                authorize_uri: format!("{auth_base}/oauth/authorize"),
                token_uri: format!("{auth_base}/oauth/token"),
                userinfo_uri: format!("{auth_base}/userinfo"),
                redirect_uri: "http://gateway.test/login".to_string(),
                scope: "openid".to_string(),
            },
            upstream: UpstreamConfig {
                api_base_url: api_base.to_string(),
                timeout: 2,
                retries: 3,
                backoff_ms: 10,
            },
            session: SessionConfig {
                cookie_name: "GATEWAYSESSION".to_string(),
                cookie_secure: false,
                ttl: 600,
                store: "in-memory".to_string(),
                redis_url: String::new(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = Settings::builder().load().unwrap();
        assert_eq!(settings.port, 8080);
        assert_eq!(settings.sso.client_id, "demo");
        assert_eq!(settings.sso.redirect_uri, "http://localhost:8080/login");
        assert_eq!(settings.upstream.api_base_url, "http://localhost:18080");
        assert_eq!(settings.upstream.retries, 3);
        assert_eq!(settings.session.cookie_name, "GATEWAYSESSION");
        assert_eq!(settings.store_kind().unwrap(), StoreKind::InMemory);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_api_url_joins_paths() {
        let mut settings = Settings::for_test("http://auth", "http://api/");
        assert_eq!(settings.api_url("/messages"), "http://api/messages");
        settings.upstream.api_base_url = "http://api".to_string();
        assert_eq!(settings.api_url("messages/1"), "http://api/messages/1");
    }

    #[test]
    fn test_invalid_settings() {
        let mut settings = Settings::for_test("http://auth", "http://api");
        settings.sso.token_uri = "not a uri".to_string();
        assert!(settings.validate().is_err());

        let mut settings = Settings::for_test("http://auth", "http://api");
        settings.session.store = "memcached".to_string();
        assert!(settings.validate().is_err());
    }
}
