//! Authorization round trip with the authorization server

use crate::pages;
use crate::session::{Session, SessionState};
use crate::state::AppState;
use crate::upstream::UpstreamError;
use axum::extract::{Query, State};
use axum::response::{IntoResponse, Redirect, Response};
use http::header::SET_COOKIE;
use http::{HeaderMap, StatusCode};
use log::{error, info, warn};
use oauth_core::headers::SetCookie;
use serde::Deserialize;
use url::Url;

fn with_cookie(mut response: Response, cookie: Option<SetCookie>) -> Response {
    if let Some(cookie) = cookie {
        response
            .headers_mut()
            .append(SET_COOKIE, cookie.to_header_value());
    }
    response
}

fn authorize_url(app: &AppState, csrf: &str) -> Result<Url, url::ParseError> {
    let sso = &app.settings.sso;
    Url::parse_with_params(
        &sso.authorize_uri,
        &[
            ("response_type", "code"),
            ("client_id", sso.client_id.as_str()),
            ("redirect_uri", sso.redirect_uri.as_str()),
            ("scope", sso.scope.as_str()),
            ("state", csrf),
        ],
    )
}

/// Send the browser to the authorization server, remembering where it was going
pub(crate) async fn start_authorization(
    app: &AppState,
    mut session: Session,
    return_to: &str,
) -> Response {
    let (next, csrf) = session.state.begin_authentication(return_to);
    let location = match authorize_url(app, &csrf) {
        Ok(url) => url,
        Err(e) => {
            error!("Invalid authorize URI: {}", e);
            return pages::error_page(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Configuration error",
                "Single sign-on is misconfigured",
            );
        }
    };
    match session.save(app, next).await {
        Ok(cookie) => with_cookie(Redirect::to(location.as_str()).into_response(), cookie),
        Err(e) => {
            error!("Failed to store gateway session: {}", e);
            pages::error_page(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Session error",
                "Could not start a session",
            )
        }
    }
}

/// Expire an authenticated session whose token no longer works and authorize again.
/// Anonymous sessions simply start authorizing.
pub(crate) async fn reauthorize(app: &AppState, mut session: Session, return_to: &str) -> Response {
    if let Some(user) = session.state.user() {
        info!("Access token of '{}' expired, re-authorizing", user.name);
    }
    session.state = session.state.expire(return_to);
    start_authorization(app, session, return_to).await
}

#[derive(Debug, Default, Deserialize)]
pub struct CallbackQuery {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

async fn fail(app: &AppState, mut session: Session, status: StatusCode, reason: &str) -> Response {
    warn!("SSO login failed: {}", reason);
    if session.id.is_some() {
        if let Err(e) = session.save(app, SessionState::Anonymous).await {
            warn!("Failed to reset gateway session: {}", e);
        }
    }
    pages::login_failed(status, reason)
}

/// OAuth2 redirect callback: check `state`, redeem the code once, look up the user
pub(crate) async fn callback(
    State(app): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<CallbackQuery>,
) -> Response {
    let session = Session::load(&app, &headers).await;
    let Some(return_to) = query
        .state
        .as_deref()
        .and_then(|state| session.state.callback_target(state))
        .map(str::to_string)
    else {
        return fail(
            &app,
            session,
            StatusCode::BAD_REQUEST,
            "The login response does not belong to this session",
        )
        .await;
    };

    if let Some(error) = &query.error {
        let reason = match &query.error_description {
            Some(description) => format!("{error}: {description}"),
            None => error.clone(),
        };
        return fail(&app, session, StatusCode::UNAUTHORIZED, &reason).await;
    }
    let Some(code) = query.code.as_deref().filter(|code| !code.is_empty()) else {
        return fail(&app, session, StatusCode::BAD_REQUEST, "No authorization code").await;
    };

    let token = match app.upstream.exchange_code(code).await {
        Ok(token) => token,
        Err(e) => return fail(&app, session, login_failure_status(&e), &e.to_string()).await,
    };
    let user = match app.upstream.userinfo(&token.access_token).await {
        Ok(user) => user,
        Err(e) => return fail(&app, session, login_failure_status(&e), &e.to_string()).await,
    };

    let name = user.name.clone();
    let now = chrono::Utc::now().timestamp();
    let authenticated =
        SessionState::authenticated(user, token.access_token, token.expires_in, now);
    let mut session = session;
    match session.rotate(&app, authenticated).await {
        Ok(cookie) => {
            info!("User '{}' signed in through SSO", name);
            with_cookie(Redirect::to(&return_to).into_response(), Some(cookie))
        }
        Err(e) => {
            error!("Failed to store gateway session: {}", e);
            pages::error_page(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Session error",
                "Could not store the session",
            )
        }
    }
}

fn login_failure_status(error: &UpstreamError) -> StatusCode {
    match error {
        UpstreamError::Unavailable(_)
        | UpstreamError::Failed(_)
        | UpstreamError::InvalidResponse(..) => StatusCode::BAD_GATEWAY,
        _ => StatusCode::UNAUTHORIZED,
    }
}

pub(crate) async fn logout(State(app): State<AppState>, headers: HeaderMap) -> Response {
    let session = Session::load(&app, &headers).await;
    if let Some(user) = session.state.user() {
        info!("User '{}' signed out", user.name);
    }
    let cookie = session.destroy(&app).await;
    with_cookie(pages::signed_out(), Some(cookie))
}

#[cfg(test)]
mod tests {
    use crate::test_utils::TestFixture;
    use http::StatusCode;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, ResponseTemplate};

    #[tokio::test]
    async fn test_anonymous_visit_redirects_to_authorize() {
        let fixture = TestFixture::new().await;
        let response = fixture.get("/").await;

        response.assert_status(StatusCode::SEE_OTHER);
        let location = response.location();
        assert!(location.starts_with(&format!("{}/oauth/authorize?", fixture.auth_server.uri())));
        assert_eq!(response.location_param("response_type").as_deref(), Some("code"));
        assert_eq!(response.location_param("client_id").as_deref(), Some("demo"));
        assert_eq!(
            response.location_param("redirect_uri").as_deref(),
            Some("http://gateway.test/login")
        );
        assert_eq!(response.location_param("scope").as_deref(), Some("openid"));
        assert!(response.location_param("state").is_some_and(|s| !s.is_empty()));

        let cookie = response.set_cookie().expect("session cookie");
        assert!(cookie.starts_with("GATEWAYSESSION="));
        assert!(cookie.contains("HttpOnly"));
    }

    #[tokio::test]
    async fn test_callback_signs_in_and_rotates_session() {
        let fixture = TestFixture::new().await;
        fixture.mock_authorization("abc", "token-abc", "alice").await;

        let (cookie, state) = fixture.begin_login("/").await;
        let response = fixture
            .get_with_cookie(format!("/login?code=abc&state={state}"), &cookie)
            .await;

        response.assert_status(StatusCode::SEE_OTHER);
        assert_eq!(response.location(), "/");
        let rotated = response.cookie().expect("new session cookie");
        assert_ne!(rotated, cookie);

        // The pre-login id is not authenticated
        let stale = fixture.get_with_cookie("/", &cookie).await;
        stale.assert_status(StatusCode::SEE_OTHER);
        assert!(stale.location().contains("/oauth/authorize"));
    }

    #[tokio::test]
    async fn test_callback_returns_to_original_target() {
        let fixture = TestFixture::new().await;
        fixture.mock_authorization("xyz", "token-xyz", "alice").await;

        let (cookie, state) = fixture.begin_login("/api/messages?sort=createdAt").await;
        let response = fixture
            .get_with_cookie(format!("/login?code=xyz&state={state}"), &cookie)
            .await;

        response.assert_status(StatusCode::SEE_OTHER);
        assert_eq!(response.location(), "/api/messages?sort=createdAt");
    }

    #[tokio::test]
    async fn test_state_mismatch_is_rejected() {
        let fixture = TestFixture::new().await;
        fixture.mock_authorization("abc", "token-abc", "alice").await;

        let (cookie, _) = fixture.begin_login("/").await;
        let response = fixture
            .get_with_cookie("/login?code=abc&state=forged", &cookie)
            .await;
        response.assert_status(StatusCode::BAD_REQUEST);
        assert!(response.set_cookie().is_none());

        // No session at all
        let response = fixture.get("/login?code=abc&state=forged").await;
        response.assert_status(StatusCode::BAD_REQUEST);

        // The code was never redeemed
        let requests = fixture.auth_server.received_requests().await.unwrap();
        assert!(requests.iter().all(|r| r.url.path() != "/oauth/token"));
    }

    #[tokio::test]
    async fn test_callback_state_is_single_use() {
        let fixture = TestFixture::new().await;
        fixture.mock_authorization("abc", "token-abc", "alice").await;

        let (cookie, state) = fixture.begin_login("/").await;
        let response = fixture
            .get_with_cookie(
                format!("/login?code=abc&state={state}&error=access_denied"),
                &cookie,
            )
            .await;
        response.assert_status(StatusCode::UNAUTHORIZED);
        assert!(response.text().contains("access_denied"));

        let response = fixture
            .get_with_cookie(format!("/login?code=abc&state={state}"), &cookie)
            .await;
        response.assert_status(StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_failed_exchange_leaves_session_anonymous() {
        let fixture = TestFixture::new().await;
        Mock::given(method("POST"))
            .and(path("/oauth/token"))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "error": "invalid_grant",
                "error_description": "Invalid authorization code",
            })))
            .expect(1)
            .mount(&fixture.auth_server)
            .await;

        let (cookie, state) = fixture.begin_login("/").await;
        let response = fixture
            .get_with_cookie(format!("/login?code=used&state={state}"), &cookie)
            .await;
        response.assert_status(StatusCode::UNAUTHORIZED);
        assert!(response.text().contains("invalid_grant"));

        let session = crate::session::Session::load(
            &fixture.state,
            &http::HeaderMap::from_iter([(
                http::header::COOKIE,
                http::HeaderValue::from_str(&cookie).unwrap(),
            )]),
        )
        .await;
        assert_eq!(session.state, crate::session::SessionState::Anonymous);
    }

    #[tokio::test]
    async fn test_unreachable_token_endpoint_is_bad_gateway() {
        let fixture = TestFixture::new().await;
        Mock::given(method("POST"))
            .and(path("/oauth/token"))
            .respond_with(ResponseTemplate::new(503))
            .expect(1)
            .mount(&fixture.auth_server)
            .await;

        let (cookie, state) = fixture.begin_login("/").await;
        let response = fixture
            .get_with_cookie(format!("/login?code=abc&state={state}"), &cookie)
            .await;
        response.assert_status(StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn test_logout_clears_session() {
        let fixture = TestFixture::new().await;
        let cookie = fixture.sign_in("alice").await;

        let response = fixture
            .request(
                http::Method::POST,
                "/logout",
                Some(cookie.as_str()),
                axum::body::Body::empty(),
                None,
            )
            .await;
        response.assert_status(StatusCode::OK);
        let cleared = response.set_cookie().expect("clearing cookie");
        assert!(cleared.contains("Max-Age=0"));

        let response = fixture.get_with_cookie("/", &cookie).await;
        response.assert_status(StatusCode::SEE_OTHER);
        assert!(response.location().contains("/oauth/authorize"));
    }
}
