//! Authorization server configuration, read from `AUTH_*` environment variables and an
//! optional TOML file.

use confique::Config;
use oauth_core::{
    Algorithm, GrantPolicy, KeyError, ScopePolicy, StaticClientRegistry, StaticUserDirectory,
    StoreKind, TokenCodec,
};
use std::time::Duration;
use thiserror::Error;

pub mod registry;

pub use registry::{ClientEntry, UserEntry};

/// File read when `AUTH_CONFIG_FILE` is not set. Missing files are ignored.
pub const DEFAULT_CONFIG_FILE: &str = "auth-server.toml";

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] confique::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
    #[error("Invalid signing key: {0}")]
    Key(#[from] KeyError),
}

#[derive(Debug, Config, Clone)]
pub struct Settings {
    /// Listen port (default: 9999)
    #[config(env = "AUTH_PORT", default = 9999)]
    pub port: u16,

    /// `iss` claim of issued tokens
    #[config(env = "AUTH_ISSUER", default = "http://localhost:9999")]
    pub issuer: String,

    #[config(nested)]
    pub token: TokenConfig,

    #[config(nested)]
    pub oauth: OAuthConfig,

    #[config(nested)]
    pub session: SessionConfig,

    #[config(nested)]
    pub store: StoreConfig,

    /// Registered clients (file only). Unset means the built-in `demo` client.
    pub clients: Option<Vec<ClientEntry>>,

    /// Resource owners (file only). Unset means the built-in `alice` and `admin` users.
    pub users: Option<Vec<UserEntry>>,
}

/// Token signing configuration
#[derive(Debug, Config, Clone)]
pub struct TokenConfig {
    /// `EdDSA` (public key published at /oauth/token_key) or `HS256` (shared secret)
    #[config(env = "AUTH_TOKEN_ALGORITHM", default = "EdDSA")]
    pub algorithm: String,

    /// HS256 shared secret, at least 32 bytes
    #[config(env = "AUTH_TOKEN_SECRET", default = "")]
    pub secret: String,

    /// base64url 32-byte Ed25519 seed; empty generates a key per process start
    #[config(env = "AUTH_TOKEN_SIGNING_SEED", default = "")]
    pub signing_seed: String,

    #[config(env = "AUTH_TOKEN_KEY_ID", default = "default")]
    pub key_id: String,

    /// Access token lifetime in seconds (default: 12 hours)
    #[config(env = "AUTH_TOKEN_ACCESS_TOKEN_TTL", default = 43200)]
    pub access_token_ttl: u64,

    /// Authorization code lifetime in seconds
    #[config(env = "AUTH_TOKEN_CODE_TTL", default = 300)]
    pub code_ttl: u64,
}

#[derive(Debug, Config, Clone)]
pub struct OAuthConfig {
    /// `reject` fails requests for scopes beyond what is allowed, `narrow` grants the
    /// allowed part
    #[config(env = "AUTH_OAUTH_SCOPE_POLICY", default = "reject")]
    pub scope_policy: String,

    /// Skip the consent page and approve every valid authorization request
    #[config(env = "AUTH_OAUTH_AUTO_APPROVE", default = false)]
    pub auto_approve: bool,
}

#[derive(Debug, Config, Clone)]
pub struct SessionConfig {
    #[config(env = "AUTH_SESSION_COOKIE_NAME", default = "AUTHSESSION")]
    pub cookie_name: String,

    /// Add the `Secure` attribute to the login cookie
    #[config(env = "AUTH_SESSION_COOKIE_SECURE", default = false)]
    pub cookie_secure: bool,

    /// Login session lifetime in seconds
    #[config(env = "AUTH_SESSION_TTL", default = 1800)]
    pub ttl: u64,
}

#[derive(Debug, Config, Clone)]
pub struct StoreConfig {
    /// `in-memory` or `redis`; holds login sessions and authorization codes
    #[config(env = "AUTH_STORE_KIND", default = "in-memory")]
    pub kind: String,

    #[config(env = "AUTH_STORE_REDIS_URL", default = "")]
    pub redis_url: String,
}

impl Settings {
    /// Load from the environment, then the config file
    pub fn load() -> Result<Self, SettingsError> {
        let path =
            std::env::var("AUTH_CONFIG_FILE").unwrap_or_else(|_| DEFAULT_CONFIG_FILE.to_string());
        let settings = Settings::builder().env().file(path).load()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Check everything that can be checked without touching the network
    pub fn validate(&self) -> Result<(), SettingsError> {
        self.algorithm()?;
        self.scope_policy()?;
        self.store_kind()?;
        self.codec()?;
        self.client_registry()?;
        self.user_directory()?;
        Ok(())
    }

    pub fn algorithm(&self) -> Result<Algorithm, SettingsError> {
        Ok(self.token.algorithm.parse::<Algorithm>()?)
    }

    pub fn scope_policy(&self) -> Result<ScopePolicy, SettingsError> {
        self.oauth
            .scope_policy
            .parse()
            .map_err(SettingsError::Invalid)
    }

    pub fn store_kind(&self) -> Result<StoreKind, SettingsError> {
        self.store.kind.parse().map_err(SettingsError::Invalid)
    }

    pub fn grant_policy(&self) -> Result<GrantPolicy, SettingsError> {
        Ok(GrantPolicy {
            issuer: self.issuer.clone(),
            scope_policy: self.scope_policy()?,
            access_token_ttl: Duration::from_secs(self.token.access_token_ttl),
            code_ttl: Duration::from_secs(self.token.code_ttl),
        })
    }

    /// Signing codec for the configured algorithm
    pub fn codec(&self) -> Result<TokenCodec, SettingsError> {
        match self.algorithm()? {
            Algorithm::Hs256 => Ok(TokenCodec::hs256(
                self.token.secret.as_bytes(),
                self.token.key_id.clone(),
            )?),
            Algorithm::EdDsa if self.token.signing_seed.is_empty() => {
                Ok(TokenCodec::generate_ed25519(self.token.key_id.clone())?)
            }
            Algorithm::EdDsa => {
                use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
                let seed = URL_SAFE_NO_PAD
                    .decode(self.token.signing_seed.trim())
                    .map_err(|e| KeyError::InvalidSeed(e.to_string()))?;
                Ok(TokenCodec::ed25519(&seed, self.token.key_id.clone())?)
            }
        }
    }

    pub fn client_registry(&self) -> Result<StaticClientRegistry, SettingsError> {
        match &self.clients {
            None => Ok(StaticClientRegistry::demo()),
            Some(entries) => {
                let clients = entries
                    .iter()
                    .map(ClientEntry::to_client)
                    .collect::<Result<Vec<_>, _>>()
                    .map_err(SettingsError::Invalid)?;
                Ok(StaticClientRegistry::new(clients))
            }
        }
    }

    pub fn user_directory(&self) -> Result<StaticUserDirectory, SettingsError> {
        match &self.users {
            None => Ok(StaticUserDirectory::demo()),
            Some(entries) => {
                let users = entries
                    .iter()
                    .map(UserEntry::to_owner)
                    .collect::<Result<Vec<_>, _>>()
                    .map_err(SettingsError::Invalid)?;
                Ok(StaticUserDirectory::new(users))
            }
        }
    }

    #[cfg(test)]
    pub fn for_test() -> Self {
        Self {
            port: 0,
            issuer: "http://auth.test".to_string(),
            token: TokenConfig {
                algorithm: "EdDSA".to_string(),
                secret: String::new(),
                // 32 zero bytes
                signing_seed: "AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA".to_string(),
                key_id: "test".to_string(),
                access_token_ttl: 3600,
                code_ttl: 60,
            },
            oauth: OAuthConfig {
                scope_policy: "reject".to_string(),
                auto_approve: false,
            },
            session: SessionConfig {
                cookie_name: "AUTHSESSION".to_string(),
                cookie_secure: false,
                ttl: 600,
            },
            store: StoreConfig {
                kind: "in-memory".to_string(),
                redis_url: String::new(),
            },
            clients: None,
            users: None,
        }
    }
}
