use crate::config::Settings;
use crate::create_app;
use crate::state::AppState;
use axum::body::{Body, Bytes};
use axum::Router;
use http::header::{AUTHORIZATION, CONTENT_TYPE};
use http::{HeaderMap, Method, Request, StatusCode};
use http_body_util::BodyExt;
use log::LevelFilter;
use oauth_core::{
    AccessTokenClaims, AuthorizationCore, GrantPolicy, InMemoryCodeStore, PasswordGrant, ScopeSet,
    StaticClientRegistry, StaticUserDirectory, TokenCodec,
};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

/// Test fixture with the full router and a signing key the router trusts.
///
/// The key is installed directly, so no key endpoint is contacted. Use
/// [`TestFixture::token`] to mint access tokens for requests.
pub struct TestFixture {
    pub app: Router,
    pub state: AppState,
    /// Signs tokens the app accepts
    pub codec: Arc<TokenCodec>,
}

impl TestFixture {
    pub async fn new() -> Self {
        let _ = env_logger::builder()
            .filter_level(LevelFilter::Debug)
            .is_test(true)
            .try_init();

        let codec = Arc::new(TokenCodec::ed25519(&[7u8; 32], "test").expect("valid test seed"));
        let settings = Settings::for_test("http://127.0.0.1:9/oauth/token_key");
        let state = AppState::new(settings, codec.verifier());
        Self {
            app: create_app(state.clone()),
            state,
            codec,
        }
    }

    /// Same key and state, different router
    pub fn with_app(self, app: Router) -> Self {
        Self { app, ..self }
    }

    /// Access token for `username` with space-separated `scope`, valid for `ttl` seconds
    pub fn token(&self, username: &str, scope: &str, ttl: i64) -> String {
        self.token_from(&self.codec, username, scope, ttl)
    }

    pub fn token_from(&self, codec: &TokenCodec, username: &str, scope: &str, ttl: i64) -> String {
        let claims = AccessTokenClaims::new(
            "http://auth.test",
            username,
            "demo",
            ScopeSet::parse(scope),
            BTreeSet::from(["ROLE_USER".to_string()]),
            chrono::Utc::now().timestamp(),
            ttl,
        );
        codec.issue(&claims).expect("Failed to sign test token")
    }

    /// Token from the password grant of an authorization core sharing the fixture's key,
    /// with the built-in `demo` client and users
    pub async fn password_token(&self, username: &str, password: &str) -> String {
        let core = AuthorizationCore::new(
            Arc::new(StaticClientRegistry::demo()),
            Arc::new(StaticUserDirectory::demo()),
            Arc::new(InMemoryCodeStore::new(Duration::from_secs(60))),
            self.codec.clone(),
            GrantPolicy::default(),
        );
        let issued = core
            .password(PasswordGrant {
                client_id: "demo".to_string(),
                client_secret: "demo".to_string(),
                username: username.to_string(),
                password: password.to_string(),
                scope: Some(ScopeSet::parse("openid")),
            })
            .await
            .expect("password grant");
        issued.access_token
    }

    pub async fn get(&self, uri: impl AsRef<str>) -> TestResponse {
        let request = Request::builder()
            .method(Method::GET)
            .uri(uri.as_ref())
            .body(Body::empty())
            .expect("Failed to build request");
        self.send(request).await
    }

    pub async fn get_with_bearer(&self, uri: impl AsRef<str>, token: &str) -> TestResponse {
        let request = Request::builder()
            .method(Method::GET)
            .uri(uri.as_ref())
            .header(AUTHORIZATION, format!("Bearer {token}"))
            .body(Body::empty())
            .expect("Failed to build request");
        self.send(request).await
    }

    pub async fn post_json_with_bearer<T: Serialize>(
        &self,
        uri: impl AsRef<str>,
        body: &T,
        token: &str,
    ) -> TestResponse {
        let json_body = serde_json::to_vec(body).expect("Failed to serialize body to JSON");
        let request = Request::builder()
            .method(Method::POST)
            .uri(uri.as_ref())
            .header(AUTHORIZATION, format!("Bearer {token}"))
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from(json_body))
            .expect("Failed to build request");
        self.send(request).await
    }

    pub async fn delete_with_bearer(&self, uri: impl AsRef<str>, token: &str) -> TestResponse {
        let request = Request::builder()
            .method(Method::DELETE)
            .uri(uri.as_ref())
            .header(AUTHORIZATION, format!("Bearer {token}"))
            .body(Body::empty())
            .expect("Failed to build request");
        self.send(request).await
    }

    pub async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self
            .app
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to send request");

        let status = response.status();
        let headers = response.headers().clone();
        let body = response
            .into_body()
            .collect()
            .await
            .expect("Failed to read response body")
            .to_bytes();
        let json = if !body.is_empty() {
            serde_json::from_slice(&body).unwrap_or_else(|_| serde_json::json!({}))
        } else {
            serde_json::json!({})
        };

        TestResponse {
            status,
            headers,
            body,
            json,
        }
    }
}

/// Response from a test request
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
    pub json: Value,
}

impl TestResponse {
    pub fn assert_status(&self, expected: StatusCode) {
        assert_eq!(
            self.status,
            expected,
            "Expected status code {}, got {}, body: {}",
            expected,
            self.status,
            self.text()
        );
    }

    pub fn assert_ok(&self) {
        self.assert_status(StatusCode::OK);
    }

    pub fn json_as<T: DeserializeOwned>(&self) -> T {
        serde_json::from_value(self.json.clone()).expect("Failed to deserialize JSON response")
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}
