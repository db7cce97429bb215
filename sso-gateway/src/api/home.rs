use super::sso::reauthorize;
use crate::pages;
use crate::session::Session;
use crate::state::AppState;
use crate::upstream::UpstreamError;
use axum::extract::{Form, State};
use axum::response::{IntoResponse, Redirect, Response};
use http::HeaderMap;
use serde::Deserialize;

/// Messages page; starts single sign-on when there is no usable token
pub(crate) async fn home(State(app): State<AppState>, headers: HeaderMap) -> Response {
    let session = Session::load(&app, &headers).await;
    let now = chrono::Utc::now().timestamp();
    let (Some(token), Some(user)) = (session.state.live_token(now), session.state.user()) else {
        return reauthorize(&app, session, "/").await;
    };

    let listed = app.upstream.list_messages(token).await;
    match listed {
        Ok(messages) => pages::home_page(&user.name, &messages),
        Err(UpstreamError::Unauthenticated) => reauthorize(&app, session, "/").await,
        Err(e) => e.into_response(),
    }
}

#[derive(Debug, Deserialize)]
pub struct PostForm {
    pub text: String,
}

pub(crate) async fn post_message(
    State(app): State<AppState>,
    headers: HeaderMap,
    Form(form): Form<PostForm>,
) -> Response {
    let session = Session::load(&app, &headers).await;
    let now = chrono::Utc::now().timestamp();
    let Some(token) = session.state.live_token(now) else {
        return reauthorize(&app, session, "/").await;
    };

    let created = app.upstream.create_message(token, &form.text).await;
    match created {
        Ok(()) => Redirect::to("/").into_response(),
        Err(UpstreamError::Unauthenticated) => reauthorize(&app, session, "/").await,
        Err(e) => e.into_response(),
    }
}

#[cfg(test)]
mod tests {
    use crate::test_utils::TestFixture;
    use http::StatusCode;
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, ResponseTemplate};

    #[tokio::test]
    async fn test_home_lists_messages_with_bearer_token() {
        let fixture = TestFixture::new().await;
        Mock::given(method("GET"))
            .and(path("/messages"))
            .and(query_param("sort", "createdAt,DESC"))
            .and(header("authorization", "Bearer token-alice"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                {
                    "id": 2,
                    "text": "<b>second</b>",
                    "username": "alice",
                    "createdAt": "2024-01-02T00:00:00Z"
                },
                {
                    "id": 1,
                    "text": "first",
                    "username": "admin",
                    "createdAt": "2024-01-01T00:00:00Z"
                }
            ])))
            .expect(1)
            .mount(&fixture.resource_server)
            .await;

        let cookie = fixture.sign_in("alice").await;
        let response = fixture.get_with_cookie("/", &cookie).await;

        response.assert_status(StatusCode::OK);
        let text = response.text();
        assert!(text.contains("alice"));
        assert!(text.contains("&lt;b&gt;second&lt;/b&gt;"));
        assert!(text.find("second").unwrap() < text.find("first").unwrap());
        assert!(!text.contains("token-alice"));
    }

    #[tokio::test]
    async fn test_refused_token_restarts_authorization() {
        let fixture = TestFixture::new().await;
        Mock::given(method("GET"))
            .and(path("/messages"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&fixture.resource_server)
            .await;

        let cookie = fixture.sign_in("alice").await;
        let response = fixture.get_with_cookie("/", &cookie).await;

        response.assert_status(StatusCode::SEE_OTHER);
        assert!(response
            .location()
            .starts_with(&format!("{}/oauth/authorize?", fixture.auth_server.uri())));
        assert!(response.location_param("state").is_some());
    }

    #[tokio::test]
    async fn test_unavailable_resource_server_is_bad_gateway() {
        let fixture = TestFixture::new().await;
        Mock::given(method("GET"))
            .and(path("/messages"))
            .respond_with(ResponseTemplate::new(503))
            .expect(3)
            .mount(&fixture.resource_server)
            .await;

        let cookie = fixture.sign_in("alice").await;
        let response = fixture.get_with_cookie("/", &cookie).await;
        response.assert_status(StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn test_post_message_forwards_text() {
        let fixture = TestFixture::new().await;
        Mock::given(method("POST"))
            .and(path("/messages"))
            .and(header("authorization", "Bearer token-alice"))
            .and(body_json(serde_json::json!({ "text": "hello there" })))
            .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({
                "id": 1,
                "text": "hello there",
                "username": "alice",
                "createdAt": "2024-01-01T00:00:00Z"
            })))
            .expect(1)
            .mount(&fixture.resource_server)
            .await;

        let cookie = fixture.sign_in("alice").await;
        let response = fixture
            .post_form_with_cookie("/messages", "text=hello+there", &cookie)
            .await;

        response.assert_status(StatusCode::SEE_OTHER);
        assert_eq!(response.location(), "/");
    }

    #[tokio::test]
    async fn test_post_without_session_starts_authorization() {
        let fixture = TestFixture::new().await;
        let response = fixture
            .request(
                http::Method::POST,
                "/messages",
                None,
                axum::body::Body::from("text=hi"),
                Some("application/x-www-form-urlencoded"),
            )
            .await;
        response.assert_status(StatusCode::SEE_OTHER);
        assert!(response.location().contains("/oauth/authorize"));
    }
}
