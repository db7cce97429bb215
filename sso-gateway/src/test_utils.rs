use crate::config::Settings;
use crate::create_app;
use crate::state::AppState;
use axum::body::{Body, Bytes};
use axum::Router;
use http::header::{CONTENT_TYPE, COOKIE, LOCATION, SET_COOKIE};
use http::{HeaderMap, Method, Request, StatusCode};
use http_body_util::BodyExt;
use log::LevelFilter;
use serde_json::json;
use tower::ServiceExt;
use url::Url;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Gateway router wired to a mock authorization server and a mock resource server.
///
/// ```ignore
/// let fixture = TestFixture::new().await;
/// let cookie = fixture.sign_in("alice").await;
/// let response = fixture.get_with_cookie("/", &cookie).await;
/// ```
pub struct TestFixture {
    pub app: Router,
    pub state: AppState,
    pub auth_server: MockServer,
    pub resource_server: MockServer,
}

impl TestFixture {
    pub async fn new() -> Self {
        let _ = env_logger::builder()
            .filter_level(LevelFilter::Debug)
            .is_test(true)
            .try_init();

        let auth_server = MockServer::start().await;
        let resource_server = MockServer::start().await;
        let settings = Settings::for_test(&auth_server.uri(), &resource_server.uri());
        let state = AppState::for_testing(settings);
        Self {
            app: create_app(state.clone()),
            state,
            auth_server,
            resource_server,
        }
    }

    /// Make the mock authorization server redeem `code` for `token` and describe its
    /// holder as `username`
    pub async fn mock_authorization(&self, code: &str, token: &str, username: &str) {
        Mock::given(method("POST"))
            .and(path("/oauth/token"))
            .and(body_string_contains(format!("code={code}")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": token,
                "token_type": "bearer",
                "expires_in": 3600,
                "scope": "openid",
            })))
            .mount(&self.auth_server)
            .await;
        Mock::given(method("GET"))
            .and(path("/userinfo"))
            .and(wiremock::matchers::header(
                "authorization",
                format!("Bearer {token}").as_str(),
            ))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "name": username,
                "authorities": ["ROLE_USER"],
                "client_id": "demo",
                "scope": "openid",
            })))
            .mount(&self.auth_server)
            .await;
    }

    /// Start a login at `uri`; returns the session cookie and the `state` sent to the
    /// authorization server
    pub async fn begin_login(&self, uri: &str) -> (String, String) {
        let response = self.get(uri).await;
        response.assert_status(StatusCode::SEE_OTHER);
        let cookie = response.cookie().expect("session cookie");
        let state = response
            .location_param("state")
            .expect("state in authorize redirect");
        (cookie, state)
    }

    /// Run the full authorization code round trip for `username`; returns the
    /// authenticated session cookie
    pub async fn sign_in(&self, username: &str) -> String {
        let code = format!("code-{username}");
        self.mock_authorization(&code, &format!("token-{username}"), username)
            .await;
        let (cookie, state) = self.begin_login("/").await;
        let response = self
            .get_with_cookie(format!("/login?code={code}&state={state}"), &cookie)
            .await;
        response.assert_status(StatusCode::SEE_OTHER);
        response.cookie().expect("rotated session cookie")
    }

    pub async fn get(&self, uri: impl AsRef<str>) -> TestResponse {
        self.request(Method::GET, uri, None, Body::empty(), None)
            .await
    }

    pub async fn get_with_cookie(&self, uri: impl AsRef<str>, cookie: &str) -> TestResponse {
        self.request(Method::GET, uri, Some(cookie), Body::empty(), None)
            .await
    }

    pub async fn post_form_with_cookie(
        &self,
        uri: impl AsRef<str>,
        form: &str,
        cookie: &str,
    ) -> TestResponse {
        self.request(
            Method::POST,
            uri,
            Some(cookie),
            Body::from(form.to_string()),
            Some("application/x-www-form-urlencoded"),
        )
        .await
    }

    pub async fn request(
        &self,
        method: Method,
        uri: impl AsRef<str>,
        cookie: Option<&str>,
        body: Body,
        content_type: Option<&str>,
    ) -> TestResponse {
        let mut builder = Request::builder().method(method).uri(uri.as_ref());
        if let Some(cookie) = cookie {
            builder = builder.header(COOKIE, cookie);
        }
        if let Some(content_type) = content_type {
            builder = builder.header(CONTENT_TYPE, content_type);
        }
        let request = builder.body(body).expect("Failed to build request");
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

        TestResponse {
            status,
            headers,
            body,
        }
    }
}

/// Response from a test request
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
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

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn location(&self) -> String {
        self.headers
            .get(LOCATION)
            .and_then(|value| value.to_str().ok())
            .expect("Location header")
            .to_string()
    }

    pub fn set_cookie(&self) -> Option<String> {
        self.headers
            .get(SET_COOKIE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string)
    }

    /// `name=value` part of the Set-Cookie header, ready to send back
    pub fn cookie(&self) -> Option<String> {
        self.set_cookie()
            .and_then(|value| value.split(';').next().map(str::to_string))
    }

    /// Query parameter of the absolute URL in the Location header
    pub fn location_param(&self, name: &str) -> Option<String> {
        let url = Url::parse(&self.location()).ok()?;
        url.query_pairs()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.into_owned())
    }
}
