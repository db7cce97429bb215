//! Verification key bootstrap and background refresh

use crate::config::{Settings, SettingsError};
use log::{debug, info, warn};
use oauth_core::{Algorithm, KeyError, ResourceGuard, TokenKey, TokenVerifier};
use reqwest::StatusCode;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Error)]
pub enum KeyFetchError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("authorization server answered {0}")]
    Status(StatusCode),
    #[error("unusable key: {0}")]
    Key(#[from] KeyError),
    #[error("expected a {expected} key, got {got}")]
    AlgorithmMismatch { expected: Algorithm, got: Algorithm },
    #[error(transparent)]
    Settings(#[from] SettingsError),
}

impl KeyFetchError {
    /// The authorization server may still be starting; anything else will not fix itself
    fn is_retryable(&self) -> bool {
        match self {
            Self::Http(_) => true,
            Self::Status(status) => status.is_server_error(),
            _ => false,
        }
    }
}

/// Fetch the published key once
pub async fn fetch_verifier(
    client: &reqwest::Client,
    settings: &Settings,
) -> Result<TokenVerifier, KeyFetchError> {
    let response = client.get(&settings.token.key_uri).send().await?;
    if !response.status().is_success() {
        return Err(KeyFetchError::Status(response.status()));
    }
    let key: TokenKey = response.json().await?;
    let expected = settings.algorithm()?;
    if key.alg != expected {
        return Err(KeyFetchError::AlgorithmMismatch {
            expected,
            got: key.alg,
        });
    }
    let verifier = TokenVerifier::from_token_key(&key)?;
    debug!("Fetched {} verification key '{}'", key.alg, key.kid);
    Ok(verifier.with_leeway(settings.token.leeway))
}

/// Build the verifier the service starts with.
///
/// With a shared secret nothing is fetched. Otherwise the key endpoint is polled with
/// exponential backoff until it answers or the attempts run out.
pub async fn bootstrap(
    client: &reqwest::Client,
    settings: &Settings,
) -> Result<TokenVerifier, KeyFetchError> {
    match settings.algorithm()? {
        Algorithm::Hs256 => {
            let verifier =
                TokenVerifier::hs256(settings.token.secret.as_bytes(), settings.token.key_id.clone())?;
            info!("Verifying HS256 tokens with the configured shared secret");
            Ok(verifier.with_leeway(settings.token.leeway))
        }
        Algorithm::EdDsa => {
            let verifier = settings
                .fetch_backoff()
                .retry(
                    "Fetching verification key",
                    |_| fetch_verifier(client, settings),
                    KeyFetchError::is_retryable,
                )
                .await?;
            info!(
                "Loaded EdDSA verification key '{}' from {}",
                verifier.kid(),
                settings.token.key_uri
            );
            Ok(verifier)
        }
    }
}

/// Periodically re-fetch the key and install it in `guard`.
///
/// Returns `None` when refreshing is disabled or tokens use a shared secret. A failed
/// refresh keeps the current key.
pub fn spawn_refresh(
    guard: ResourceGuard,
    client: reqwest::Client,
    settings: Settings,
    shutdown: CancellationToken,
) -> Option<JoinHandle<()>> {
    let interval = settings.refresh_interval()?;
    if !matches!(settings.algorithm(), Ok(Algorithm::EdDsa)) {
        return None;
    }
    Some(tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // The first tick completes immediately; the startup fetch already covered it
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Key refresh shutting down");
                    break;
                }
                _ = ticker.tick() => {}
            }
            match fetch_verifier(&client, &settings).await {
                Ok(verifier) => {
                    if verifier.kid() != guard.verifier().kid() {
                        info!("Verification key rotated to '{}'", verifier.kid());
                    }
                    guard.replace_verifier(verifier);
                }
                Err(e) => warn!("Key refresh failed, keeping the current key: {}", e),
            }
        }
    }))
}
