use crate::config::Settings;
use crate::create_app;
use crate::state::AppState;
use axum::body::{Body, Bytes};
use axum::Router;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use http::header::{AUTHORIZATION, CONTENT_TYPE, COOKIE, LOCATION, SET_COOKIE};
use http::{HeaderMap, Method, Request, StatusCode};
use http_body_util::BodyExt;
use log::LevelFilter;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tower::ServiceExt;

/// `Authorization` header value for HTTP Basic client authentication, with both parts
/// form-urlencoded first
pub fn basic_auth(client_id: &str, secret: &str) -> String {
    let encode = |part: &str| url::form_urlencoded::byte_serialize(part.as_bytes()).collect::<String>();
    format!(
        "Basic {}",
        STANDARD.encode(format!("{}:{}", encode(client_id), encode(secret)))
    )
}

/// Test fixture running the full router in memory.
///
/// Uses [`Settings::for_test`] unless other settings are given, so the demo client
/// (`demo`/`demo`) and the demo users `alice` and `admin` are registered.
///
/// ```rust
/// #[tokio::test]
/// async fn test_endpoint() {
///     let fixture = TestFixture::new().await;
///     let token = fixture.password_token("alice", "alice").await;
///     let response = fixture.get_with_bearer("/userinfo", &token).await;
///     response.assert_ok();
/// }
/// ```
pub struct TestFixture {
    pub app: Router,
    pub settings: Settings,
}

impl TestFixture {
    pub async fn new() -> Self {
        Self::with_settings(Settings::for_test()).await
    }

    pub async fn with_settings(settings: Settings) -> Self {
        Self::setup_logger(LevelFilter::Debug);
        let state = AppState::for_testing(settings.clone());
        Self {
            app: create_app(state),
            settings,
        }
    }

    pub fn setup_logger(level: LevelFilter) {
        let _ = env_logger::builder()
            .filter_level(level)
            .is_test(true)
            .try_init();
    }

    pub async fn get(&self, uri: impl AsRef<str>) -> TestResponse {
        self.get_with_headers(uri, &[]).await
    }

    pub async fn get_with_cookie(&self, uri: impl AsRef<str>, cookie: &str) -> TestResponse {
        self.get_with_headers(uri, &[(COOKIE.as_str(), cookie)]).await
    }

    pub async fn get_with_bearer(&self, uri: impl AsRef<str>, token: &str) -> TestResponse {
        let value = format!("Bearer {token}");
        self.get_with_headers(uri, &[(AUTHORIZATION.as_str(), value.as_str())])
            .await
    }

    pub async fn get_with_headers(
        &self,
        uri: impl AsRef<str>,
        headers: &[(&str, &str)],
    ) -> TestResponse {
        let mut builder = Request::builder().method(Method::GET).uri(uri.as_ref());
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        let request = builder.body(Body::empty()).expect("Failed to build request");
        self.send(request).await
    }

    /// POST an `application/x-www-form-urlencoded` body
    pub async fn post_form(
        &self,
        uri: impl AsRef<str>,
        form: &[(&str, &str)],
        headers: &[(&str, &str)],
    ) -> TestResponse {
        let body = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(form)
            .finish();
        let mut builder = Request::builder()
            .method(Method::POST)
            .uri(uri.as_ref())
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded");
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        let request = builder.body(Body::from(body)).expect("Failed to build request");
        self.send(request).await
    }

    pub async fn post_form_with_cookie(
        &self,
        uri: impl AsRef<str>,
        form: &[(&str, &str)],
        cookie: &str,
    ) -> TestResponse {
        self.post_form(uri, form, &[(COOKIE.as_str(), cookie)]).await
    }

    /// Log in through the form and return the `Cookie` header value for the session
    pub async fn login(&self, username: &str, password: &str) -> String {
        let response = self
            .post_form(
                "/login",
                &[("username", username), ("password", password)],
                &[],
            )
            .await;
        response.assert_status(StatusCode::SEE_OTHER);
        let set_cookie = response.set_cookie().expect("login sets a session cookie");
        set_cookie
            .split(';')
            .next()
            .expect("cookie pair")
            .to_string()
    }

    /// Access token for the demo client via the password grant
    pub async fn password_token(&self, username: &str, password: &str) -> String {
        let auth = basic_auth("demo", "demo");
        let response = self
            .post_form(
                "/oauth/token",
                &[
                    ("grant_type", "password"),
                    ("username", username),
                    ("password", password),
                ],
                &[(AUTHORIZATION.as_str(), auth.as_str())],
            )
            .await;
        response.assert_ok();
        response.json["access_token"]
            .as_str()
            .expect("access_token in response")
            .to_string()
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
    /// Parsed JSON body, `{}` if the body is not JSON
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

    /// Value of a hidden form field in an HTML body
    pub fn hidden_input(&self, name: &str) -> Option<String> {
        let text = self.text();
        let marker = format!("name=\"{name}\" value=\"");
        let start = text.find(&marker)? + marker.len();
        let end = text[start..].find('"')?;
        Some(text[start..start + end].to_string())
    }
}
