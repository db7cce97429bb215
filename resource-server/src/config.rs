//! Resource server configuration, read from `RESOURCE_*` environment variables and an
//! optional TOML file.

use confique::Config;
use oauth_core::{Algorithm, Backoff, KeyError, ScopeSet};
use std::time::Duration;
use thiserror::Error;

/// File read when `RESOURCE_CONFIG_FILE` is not set. Missing files are ignored.
pub const DEFAULT_CONFIG_FILE: &str = "resource-server.toml";

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] confique::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
    #[error("Invalid verification key: {0}")]
    Key(#[from] KeyError),
}

#[derive(Debug, Config, Clone)]
pub struct Settings {
    /// Listen port (default: 18080)
    #[config(env = "RESOURCE_PORT", default = 18080)]
    pub port: u16,

    #[config(nested)]
    pub token: TokenConfig,

    #[config(nested)]
    pub messages: MessagesConfig,
}

/// How access tokens are verified
#[derive(Debug, Config, Clone)]
pub struct TokenConfig {
    /// `EdDSA` (public key fetched from `key_uri`) or `HS256` (shared `secret`)
    #[config(env = "RESOURCE_TOKEN_ALGORITHM", default = "EdDSA")]
    pub algorithm: String,

    /// HS256 shared secret, the same one the authorization server signs with
    #[config(env = "RESOURCE_TOKEN_SECRET", default = "")]
    pub secret: String,

    /// Key id used with a shared secret
    #[config(env = "RESOURCE_TOKEN_KEY_ID", default = "default")]
    pub key_id: String,

    #[config(
        env = "RESOURCE_TOKEN_KEY_URI",
        default = "http://localhost:9999/oauth/token_key"
    )]
    pub key_uri: String,

    /// Attempts to fetch the key at startup before giving up
    #[config(env = "RESOURCE_TOKEN_FETCH_ATTEMPTS", default = 10)]
    pub fetch_attempts: u32,

    #[config(env = "RESOURCE_TOKEN_FETCH_INITIAL_BACKOFF_MS", default = 250)]
    pub fetch_initial_backoff_ms: u64,

    #[config(env = "RESOURCE_TOKEN_FETCH_MAX_BACKOFF_MS", default = 5000)]
    pub fetch_max_backoff_ms: u64,

    /// Seconds between key refreshes; 0 fetches only at startup
    #[config(env = "RESOURCE_TOKEN_REFRESH_INTERVAL", default = 0)]
    pub refresh_interval: u64,

    /// Seconds of clock skew tolerated on `exp`
    #[config(env = "RESOURCE_TOKEN_LEEWAY", default = 0)]
    pub leeway: i64,
}

/// Scopes required by the message API
#[derive(Debug, Config, Clone)]
pub struct MessagesConfig {
    #[config(env = "RESOURCE_MESSAGES_READ_SCOPE", default = "openid")]
    pub read_scope: String,

    #[config(env = "RESOURCE_MESSAGES_WRITE_SCOPE", default = "openid")]
    pub write_scope: String,

    #[config(env = "RESOURCE_MESSAGES_ADMIN_SCOPE", default = "admin")]
    pub admin_scope: String,
}

impl Settings {
    /// Load from the environment, then the config file
    pub fn load() -> Result<Self, SettingsError> {
        let path = std::env::var("RESOURCE_CONFIG_FILE")
            .unwrap_or_else(|_| DEFAULT_CONFIG_FILE.to_string());
        let settings = Settings::builder().env().file(path).load()?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        match self.algorithm()? {
            Algorithm::Hs256 => {
                oauth_core::TokenVerifier::hs256(self.token.secret.as_bytes(), "check")?;
            }
            Algorithm::EdDsa => {
                url::Url::parse(&self.token.key_uri).map_err(|e| {
                    SettingsError::Invalid(format!("token.key_uri '{}': {e}", self.token.key_uri))
                })?;
            }
        }
        if self.token.leeway < 0 {
            return Err(SettingsError::Invalid("token.leeway must not be negative".to_string()));
        }
        Ok(())
    }

    pub fn algorithm(&self) -> Result<Algorithm, SettingsError> {
        Ok(self.token.algorithm.parse::<Algorithm>()?)
    }

    /// Backoff for fetching the verification key
    pub fn fetch_backoff(&self) -> Backoff {
        Backoff::new(
            Duration::from_millis(self.token.fetch_initial_backoff_ms),
            Duration::from_millis(self.token.fetch_max_backoff_ms),
            self.token.fetch_attempts,
        )
    }

    pub fn refresh_interval(&self) -> Option<Duration> {
        (self.token.refresh_interval > 0).then(|| Duration::from_secs(self.token.refresh_interval))
    }

    pub fn read_scopes(&self) -> ScopeSet {
        ScopeSet::parse(&self.messages.read_scope)
    }

    pub fn write_scopes(&self) -> ScopeSet {
        ScopeSet::parse(&self.messages.write_scope)
    }

    pub fn admin_scopes(&self) -> ScopeSet {
        ScopeSet::parse(&self.messages.admin_scope)
    }

    #[cfg(test)]
    pub fn for_test(key_uri: &str) -> Self {
        Self {
            port: 0,
            token: TokenConfig {
                algorithm: "EdDSA".to_string(),
                secret: String::new(),
                key_id: "default".to_string(),
                key_uri: key_uri.to_string(),
                fetch_attempts: 3,
                fetch_initial_backoff_ms: 10,
                fetch_max_backoff_ms: 50,
                refresh_interval: 0,
                leeway: 0,
            },
            messages: MessagesConfig {
                read_scope: "openid".to_string(),
                write_scope: "openid".to_string(),
                admin_scope: "admin".to_string(),
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
        assert_eq!(settings.port, 18080);
        assert_eq!(settings.token.algorithm, "EdDSA");
        assert_eq!(settings.token.key_uri, "http://localhost:9999/oauth/token_key");
        assert_eq!(settings.token.fetch_attempts, 10);
        assert_eq!(settings.refresh_interval(), None);
        assert_eq!(settings.read_scopes(), ScopeSet::parse("openid"));
        assert_eq!(settings.admin_scopes(), ScopeSet::parse("admin"));
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_fetch_backoff() {
        let settings = Settings::for_test("http://localhost/key");
        let backoff = settings.fetch_backoff();
        assert_eq!(backoff.attempts, 3);
        assert_eq!(backoff.delay(0), Duration::from_millis(10));
        assert_eq!(backoff.delay(5), Duration::from_millis(50));
    }

    #[test]
    fn test_invalid_settings() {
        let mut settings = Settings::for_test("http://localhost/key");
        settings.token.algorithm = "HS256".to_string();
        settings.token.secret = "short".to_string();
        assert!(matches!(
            settings.validate(),
            Err(SettingsError::Key(KeyError::WeakSecret(5)))
        ));

        let mut settings = Settings::for_test("not a uri");
        assert!(settings.validate().is_err());
        settings.token.key_uri = "http://localhost/key".to_string();
        settings.token.leeway = -1;
        assert!(settings.validate().is_err());
    }
}
