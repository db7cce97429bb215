//! Calls to the authorization server and the resource server.
//!
//! Transient failures (connection errors, timeouts, 502/503/504) are retried with bounded
//! exponential backoff. Requests that change state are only retried when the previous
//! attempt could not connect.

use crate::config::Settings;
use crate::session::UserProfile;
use axum::body::Bytes;
use http::header::{self, HeaderName};
use http::{HeaderMap, Method, StatusCode};
use log::{debug, warn};
use oauth_core::Backoff;
use serde::Deserialize;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum UpstreamError {
    /// Worth retrying; reported as 502 once retries run out
    #[error("{0}")]
    Unavailable(String),
    /// The request may have been processed; not retried
    #[error("{0}")]
    Failed(String),
    /// The resource server refused the access token
    #[error("access token was refused")]
    Unauthenticated,
    #[error("{what} answered {status}: {error}")]
    Rejected {
        what: &'static str,
        status: StatusCode,
        error: String,
    },
    #[error("invalid response from {0}: {1}")]
    InvalidResponse(&'static str, String),
}

impl UpstreamError {
    fn is_retryable(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

/// Token endpoint response
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub expires_in: i64,
    #[serde(default)]
    pub scope: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: u64,
    pub text: String,
    pub username: String,
    pub created_at: String,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
}

/// Connection-level headers that never cross a proxy, plus the browser's credentials
const STRIPPED_REQUEST_HEADERS: &[HeaderName] = &[
    header::CONNECTION,
    header::HOST,
    header::CONTENT_LENGTH,
    header::PROXY_AUTHENTICATE,
    header::PROXY_AUTHORIZATION,
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
    header::COOKIE,
    header::AUTHORIZATION,
];

const STRIPPED_RESPONSE_HEADERS: &[HeaderName] = &[
    header::CONNECTION,
    header::CONTENT_LENGTH,
    header::PROXY_AUTHENTICATE,
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
    header::SET_COOKIE,
];

/// Copy of `headers` without hop-by-hop and credential headers
pub fn forwardable(headers: &HeaderMap, stripped: &[HeaderName]) -> HeaderMap {
    let mut forwarded = headers.clone();
    for name in stripped {
        forwarded.remove(name);
    }
    forwarded.remove("keep-alive");
    forwarded
}

pub fn forwardable_request_headers(headers: &HeaderMap) -> HeaderMap {
    forwardable(headers, STRIPPED_REQUEST_HEADERS)
}

pub fn forwardable_response_headers(headers: &HeaderMap) -> HeaderMap {
    forwardable(headers, STRIPPED_RESPONSE_HEADERS)
}

/// Response of a proxied call
#[derive(Debug)]
pub struct Proxied {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

#[derive(Clone)]
pub struct Upstream {
    client: reqwest::Client,
    settings: Arc<Settings>,
    backoff: Backoff,
}

impl Upstream {
    pub fn new(settings: Arc<Settings>) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(settings.upstream_timeout())
            .build()?;
        Ok(Self {
            client,
            backoff: settings.upstream_backoff(),
            settings,
        })
    }

    /// Send the request `build` makes, retrying transient failures
    async fn send(
        &self,
        what: &'static str,
        idempotent: bool,
        build: impl Fn(&reqwest::Client) -> reqwest::RequestBuilder,
    ) -> Result<reqwest::Response, UpstreamError> {
        self.backoff
            .retry(
                what,
                |_| {
                    let request = build(&self.client);
                    async move {
                        match request.send().await {
                            Ok(response)
                                if matches!(
                                    response.status(),
                                    StatusCode::BAD_GATEWAY
                                        | StatusCode::SERVICE_UNAVAILABLE
                                        | StatusCode::GATEWAY_TIMEOUT
                                ) =>
                            {
                                let reason = format!("{what} answered {}", response.status());
                                if idempotent {
                                    Err(UpstreamError::Unavailable(reason))
                                } else {
                                    Err(UpstreamError::Failed(reason))
                                }
                            }
                            Ok(response) => Ok(response),
                            Err(e) if idempotent || e.is_connect() => {
                                Err(UpstreamError::Unavailable(format!("{what}: {e}")))
                            }
                            Err(e) => Err(UpstreamError::Failed(format!("{what}: {e}"))),
                        }
                    }
                },
                UpstreamError::is_retryable,
            )
            .await
    }

    async fn rejected(what: &'static str, response: reqwest::Response) -> UpstreamError {
        let status = response.status();
        let error = match response.json::<ErrorBody>().await {
            Ok(body) => body.error,
            Err(_) => status.canonical_reason().unwrap_or("error").to_string(),
        };
        UpstreamError::Rejected {
            what,
            status,
            error,
        }
    }

    /// Redeem an authorization code. Never retried once the request may have arrived,
    /// since a code is good for one exchange.
    pub async fn exchange_code(&self, code: &str) -> Result<TokenResponse, UpstreamError> {
        let sso = &self.settings.sso;
        let response = self
            .send("token endpoint", false, |client| {
                client
                    .post(&sso.token_uri)
                    .basic_auth(form_encode(&sso.client_id), Some(form_encode(&sso.client_secret)))
                    .form(&[
                        ("grant_type", "authorization_code"),
                        ("code", code),
                        ("redirect_uri", sso.redirect_uri.as_str()),
                    ])
            })
            .await?;
        if !response.status().is_success() {
            return Err(Self::rejected("token endpoint", response).await);
        }
        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| UpstreamError::InvalidResponse("token endpoint", e.to_string()))?;
        debug!("Exchanged code for a token with scope '{}'", token.scope);
        Ok(token)
    }

    pub async fn userinfo(&self, access_token: &str) -> Result<UserProfile, UpstreamError> {
        let uri = &self.settings.sso.userinfo_uri;
        let response = self
            .send("userinfo endpoint", true, |client| {
                client.get(uri).bearer_auth(access_token)
            })
            .await?;
        if !response.status().is_success() {
            return Err(Self::rejected("userinfo endpoint", response).await);
        }
        response
            .json()
            .await
            .map_err(|e| UpstreamError::InvalidResponse("userinfo endpoint", e.to_string()))
    }

    /// Newest messages first
    pub async fn list_messages(&self, access_token: &str) -> Result<Vec<Message>, UpstreamError> {
        let url = self.settings.api_url("/messages");
        let response = self
            .send("resource server", true, |client| {
                client
                    .get(&url)
                    .query(&[("sort", "createdAt,DESC")])
                    .bearer_auth(access_token)
            })
            .await?;
        match response.status() {
            StatusCode::UNAUTHORIZED => Err(UpstreamError::Unauthenticated),
            status if status.is_success() => response
                .json()
                .await
                .map_err(|e| UpstreamError::InvalidResponse("resource server", e.to_string())),
            _ => Err(Self::rejected("resource server", response).await),
        }
    }

    pub async fn create_message(&self, access_token: &str, text: &str) -> Result<(), UpstreamError> {
        let url = self.settings.api_url("/messages");
        let body = serde_json::json!({ "text": text });
        let response = self
            .send("resource server", false, |client| {
                client.post(&url).bearer_auth(access_token).json(&body)
            })
            .await?;
        match response.status() {
            StatusCode::UNAUTHORIZED => Err(UpstreamError::Unauthenticated),
            status if status.is_success() => Ok(()),
            _ => Err(Self::rejected("resource server", response).await),
        }
    }

    /// Forward a browser request to the resource server with the session's token
    pub async fn proxy(
        &self,
        access_token: &str,
        method: Method,
        path_and_query: &str,
        headers: &HeaderMap,
        body: Bytes,
    ) -> Result<Proxied, UpstreamError> {
        let url = self.settings.api_url(path_and_query);
        let headers = forwardable_request_headers(headers);
        let idempotent = matches!(
            method,
            Method::GET | Method::HEAD | Method::OPTIONS | Method::PUT | Method::DELETE
        );
        let response = self
            .send("resource server", idempotent, |client| {
                client
                    .request(method.clone(), &url)
                    .headers(headers.clone())
                    .bearer_auth(access_token)
                    .body(body.clone())
            })
            .await?;
        if response.status() == StatusCode::UNAUTHORIZED {
            return Err(UpstreamError::Unauthenticated);
        }
        let status = response.status();
        let headers = forwardable_response_headers(response.headers());
        let body = response.bytes().await.map_err(|e| {
            warn!("Failed to read proxied response: {}", e);
            UpstreamError::Failed(format!("resource server: {e}"))
        })?;
        Ok(Proxied {
            status,
            headers,
            body,
        })
    }
}

/// Basic credentials for the token endpoint are form-urlencoded before base64
fn form_encode(value: &str) -> String {
    url::form_urlencoded::byte_serialize(value.as_bytes()).collect()
}
