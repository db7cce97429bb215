use super::sso::reauthorize;
use crate::session::Session;
use crate::state::AppState;
use crate::upstream::UpstreamError;
use axum::body::Body;
use axum::extract::{Request, State};
use axum::response::{IntoResponse, Response};
use http::{Method, StatusCode};
use log::warn;

/// Largest request body forwarded to the resource server
const MAX_BODY_BYTES: usize = 1024 * 1024;

/// `/api/...` passthrough to the resource server with the session's bearer token
pub(crate) async fn proxy(State(app): State<AppState>, request: Request) -> Response {
    let (parts, body) = request.into_parts();
    let path_and_query = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/api");
    let upstream_path = path_and_query.strip_prefix("/api").unwrap_or(path_and_query);

    let session = Session::load(&app, &parts.headers).await;
    let now = chrono::Utc::now().timestamp();
    let return_to = if parts.method == Method::GET {
        path_and_query
    } else {
        "/"
    };
    let Some(token) = session.state.live_token(now) else {
        return reauthorize(&app, session, return_to).await;
    };

    let body = match axum::body::to_bytes(body, MAX_BODY_BYTES).await {
        Ok(body) => body,
        Err(e) => {
            warn!("Rejected proxied request body: {}", e);
            return StatusCode::PAYLOAD_TOO_LARGE.into_response();
        }
    };

    let proxied = app
        .upstream
        .proxy(token, parts.method.clone(), upstream_path, &parts.headers, body)
        .await;
    match proxied {
        Ok(proxied) => {
            let mut response = Response::new(Body::from(proxied.body));
            *response.status_mut() = proxied.status;
            *response.headers_mut() = proxied.headers;
            response
        }
        Err(UpstreamError::Unauthenticated) => reauthorize(&app, session, return_to).await,
        Err(e) => e.into_response(),
    }
}

#[cfg(test)]
mod tests {
    use crate::test_utils::TestFixture;
    use axum::body::Body;
    use http::header::{COOKIE, SET_COOKIE};
    use http::{Method, Request, StatusCode};
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, ResponseTemplate};

    #[tokio::test]
    async fn test_proxy_forwards_with_bearer_and_without_cookies() {
        let fixture = TestFixture::new().await;
        Mock::given(method("GET"))
            .and(path("/messages/7"))
            .and(query_param("verbose", "true"))
            .and(header("authorization", "Bearer token-alice"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("x-upstream", "yes")
                    .insert_header("set-cookie", "tracking=1")
                    .set_body_json(serde_json::json!({ "id": 7 })),
            )
            .expect(1)
            .mount(&fixture.resource_server)
            .await;

        let cookie = fixture.sign_in("alice").await;
        let request = Request::builder()
            .method(Method::GET)
            .uri("/api/messages/7?verbose=true")
            .header(COOKIE, &cookie)
            .header("authorization", "Bearer forged")
            .body(Body::empty())
            .unwrap();
        let response = fixture.send(request).await;

        response.assert_status(StatusCode::OK);
        assert_eq!(response.headers["x-upstream"], "yes");
        assert!(response.headers.get(SET_COOKIE).is_none());
        assert_eq!(response.text(), r#"{"id":7}"#);

        let requests = fixture.resource_server.received_requests().await.unwrap();
        let forwarded = &requests[0];
        assert!(forwarded.headers.get("cookie").is_none());
        assert_eq!(forwarded.headers["authorization"], "Bearer token-alice");
    }

    #[tokio::test]
    async fn test_proxy_passes_upstream_errors_through() {
        let fixture = TestFixture::new().await;
        Mock::given(method("DELETE"))
            .and(path("/messages/1"))
            .respond_with(
                ResponseTemplate::new(403)
                    .set_body_json(serde_json::json!({ "error": "insufficient_scope" })),
            )
            .expect(1)
            .mount(&fixture.resource_server)
            .await;

        let cookie = fixture.sign_in("alice").await;
        let response = fixture
            .request(Method::DELETE, "/api/messages/1", Some(cookie.as_str()), Body::empty(), None)
            .await;
        response.assert_status(StatusCode::FORBIDDEN);
        assert!(response.text().contains("insufficient_scope"));
    }

    #[tokio::test]
    async fn test_proxy_without_session_starts_authorization() {
        let fixture = TestFixture::new().await;
        let response = fixture.get("/api/messages").await;
        response.assert_status(StatusCode::SEE_OTHER);
        assert!(response.location().contains("/oauth/authorize"));
        let requests = fixture.resource_server.received_requests().await.unwrap();
        assert!(requests.is_empty());
    }

    #[tokio::test]
    async fn test_refused_token_on_proxy_restarts_authorization() {
        let fixture = TestFixture::new().await;
        Mock::given(method("GET"))
            .and(path("/messages"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&fixture.resource_server)
            .await;

        let cookie = fixture.sign_in("alice").await;
        let response = fixture.get_with_cookie("/api/messages", &cookie).await;
        response.assert_status(StatusCode::SEE_OTHER);

        // Signing in again lands back on the proxied page
        fixture.mock_authorization("again", "token-again", "alice").await;
        let state = response.location_param("state").unwrap();
        let response = fixture
            .get_with_cookie(format!("/login?code=again&state={state}"), &cookie)
            .await;
        response.assert_status(StatusCode::SEE_OTHER);
        assert_eq!(response.location(), "/api/messages");
    }
}
