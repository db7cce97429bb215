use super::models::{ConsentForm, TokenKeyResponse, TokenRequest, TokenResponse};
use crate::errors::{ApiError, ErrorBody};
use crate::openapi::OAUTH_TAG;
use crate::pages;
use crate::session;
use crate::state::AppState;
use axum::extract::rejection::{FormRejection, QueryRejection};
use axum::extract::{Form, Query, State};
use axum::response::{IntoResponse, Redirect, Response};
use axum::Json;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use http::header::AUTHORIZATION;
use http::{HeaderMap, Uri};
use log::{debug, info, warn};
use oauth_core::headers::presets;
use oauth_core::{
    AuthorizeError, AuthorizeRequest, CodeExchange, GrantType, IssuedToken, OAuthError,
    PasswordGrant, ScopeSet, ValidatedAuthorization,
};

/// Start an authorization-code flow
///
/// Sends the user to the login page when there is no session, then shows the consent
/// page (or approves right away when auto-approval is on).
#[utoipa::path(
    get,
    path = "/oauth/authorize",
    tag = OAUTH_TAG,
    params(
        ("response_type" = String, Query, description = "Must be `code`"),
        ("client_id" = String, Query, description = "Registered client"),
        ("redirect_uri" = Option<String>, Query, description = "Where the code is sent"),
        ("scope" = Option<String>, Query, description = "Space-separated scopes"),
        ("state" = Option<String>, Query, description = "Opaque value echoed back to the client"),
    ),
    responses(
        (status = 200, description = "Consent page"),
        (status = 303, description = "Redirect to login or back to the client"),
        (status = 400, description = "The request cannot be sent back to the client"),
    )
)]
pub(crate) async fn authorize(
    State(state): State<AppState>,
    headers: HeaderMap,
    uri: Uri,
    query: Result<Query<AuthorizeRequest>, QueryRejection>,
) -> Response {
    let request = match query {
        Ok(Query(request)) => request,
        Err(rejection) => {
            return pages::error_page(&OAuthError::InvalidRequest(rejection.body_text()))
        }
    };
    let validated = match state.core.validate_authorize(&request).await {
        Ok(validated) => validated,
        Err(e) => return authorize_failure(e),
    };

    let Some(login) = session::current(&state, &headers).await else {
        let return_to = uri
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/oauth/authorize");
        let encoded: String = url::form_urlencoded::byte_serialize(return_to.as_bytes()).collect();
        debug!("No login session for authorization request, redirecting to login");
        return Redirect::to(&format!("/login?return_to={encoded}")).into_response();
    };

    if state.settings.oauth.auto_approve {
        return approve(&state, &validated, &login.username).await;
    }

    let client_id = validated.client_id.clone();
    let scopes = validated.requested_scope.clone();
    match session::park_consent(&state, &login.username, validated).await {
        Ok(consent) => {
            pages::consent_page(&client_id, &login.username, scopes.as_ref(), &consent)
        }
        Err(e) => ApiError::internal(format!("failed to store consent request: {e}")).into_response(),
    }
}

/// Record the user's consent decision
#[utoipa::path(
    post,
    path = "/oauth/authorize",
    tag = OAUTH_TAG,
    request_body(content_type = "application/x-www-form-urlencoded", description = "Consent token and decision (`approve` or `deny`)"),
    responses(
        (status = 303, description = "Redirect back to the client with a code or an error"),
        (status = 400, description = "Unknown or reused consent token"),
    )
)]
pub(crate) async fn decide(
    State(state): State<AppState>,
    headers: HeaderMap,
    form: Result<Form<ConsentForm>, FormRejection>,
) -> Response {
    let form = match form {
        Ok(Form(form)) => form,
        Err(rejection) => {
            return pages::error_page(&OAuthError::InvalidRequest(rejection.body_text()))
        }
    };
    let Some(login) = session::current(&state, &headers).await else {
        return Redirect::to("/login").into_response();
    };
    let pending = match session::take_consent(&state, &form.consent).await {
        Ok(Some(pending)) if pending.username == login.username => pending,
        Ok(Some(_)) => {
            warn!("Consent token presented by a different user '{}'", login.username);
            return pages::error_page(&OAuthError::InvalidRequest(
                "Unknown consent request".to_string(),
            ));
        }
        Ok(None) => {
            return pages::error_page(&OAuthError::InvalidRequest(
                "Unknown consent request".to_string(),
            ))
        }
        Err(e) => {
            return ApiError::internal(format!("failed to read consent request: {e}"))
                .into_response()
        }
    };

    match form.decision.as_str() {
        "approve" => approve(&state, &pending.request, &login.username).await,
        _ => {
            info!(
                "User '{}' denied access to client '{}'",
                login.username, pending.request.client_id
            );
            let denied = OAuthError::AccessDenied("User denied access".to_string());
            Redirect::to(&pending.request.redirect_with_error(&denied)).into_response()
        }
    }
}

async fn approve(state: &AppState, validated: &ValidatedAuthorization, username: &str) -> Response {
    match state.core.approve(validated, username).await {
        Ok(code) => Redirect::to(&validated.redirect_with_code(&code.code)).into_response(),
        Err(e) => authorize_failure(e),
    }
}

fn authorize_failure(error: AuthorizeError) -> Response {
    match error {
        AuthorizeError::Fatal(error) => {
            warn!("Authorization request rejected: {}", error);
            pages::error_page(&error)
        }
        AuthorizeError::Redirect { location, error } => {
            warn!("Authorization request failed, redirecting to client: {}", error);
            Redirect::to(&location).into_response()
        }
    }
}

/// Token endpoint
///
/// Supports the `password` and `authorization_code` grants. Clients authenticate with
/// HTTP Basic or with `client_id`/`client_secret` form fields.
#[utoipa::path(
    post,
    path = "/oauth/token",
    tag = OAUTH_TAG,
    request_body(content = TokenRequest, content_type = "application/x-www-form-urlencoded"),
    responses(
        (status = 200, description = "Access token issued", body = TokenResponse),
        (status = 400, description = "Invalid grant, scope or request", body = ErrorBody),
        (status = 401, description = "Client authentication failed", body = ErrorBody),
    )
)]
pub(crate) async fn token(
    State(state): State<AppState>,
    headers: HeaderMap,
    form: Result<Form<TokenRequest>, FormRejection>,
) -> Response {
    let result = match form {
        Ok(Form(request)) => issue_token(&state, &headers, request).await,
        Err(rejection) => Err(ApiError::invalid_request(rejection.body_text())),
    };
    let mut response = match result {
        Ok(issued) => Json(TokenResponse::from(issued)).into_response(),
        Err(e) => e.into_response(),
    };
    presets::no_store().apply(&mut response);
    response
}

async fn issue_token(
    state: &AppState,
    headers: &HeaderMap,
    request: TokenRequest,
) -> Result<IssuedToken, ApiError> {
    let grant_type: GrantType = request
        .grant_type
        .as_deref()
        .filter(|grant| !grant.is_empty())
        .ok_or_else(|| ApiError::invalid_request("grant_type is required"))?
        .parse()?;
    let (client_id, client_secret) = client_credentials(headers, &request)?;

    let issued = match grant_type {
        GrantType::Password => {
            let grant = PasswordGrant {
                client_id,
                client_secret,
                username: request
                    .username
                    .ok_or_else(|| ApiError::invalid_request("username is required"))?,
                password: request
                    .password
                    .ok_or_else(|| ApiError::invalid_request("password is required"))?,
                scope: request.scope.as_deref().map(ScopeSet::parse),
            };
            state.core.password(grant).await?
        }
        GrantType::AuthorizationCode => {
            let exchange = CodeExchange {
                client_id,
                client_secret,
                code: request
                    .code
                    .filter(|code| !code.is_empty())
                    .ok_or_else(|| ApiError::invalid_request("code is required"))?,
                redirect_uri: request.redirect_uri,
            };
            state.core.exchange(exchange).await?
        }
    };
    Ok(issued)
}

/// Client credentials from `Authorization: Basic`, falling back to form fields
fn client_credentials(
    headers: &HeaderMap,
    request: &TokenRequest,
) -> Result<(String, String), ApiError> {
    if let Some(value) = headers.get(AUTHORIZATION) {
        let invalid = || ApiError(OAuthError::InvalidClient("malformed Basic credentials".to_string()));
        let value = value.to_str().map_err(|_| invalid())?;
        let (scheme, encoded) = value.split_once(' ').ok_or_else(invalid)?;
        if !scheme.eq_ignore_ascii_case("basic") {
            return Err(invalid());
        }
        let decoded = STANDARD.decode(encoded.trim()).map_err(|_| invalid())?;
        let decoded = String::from_utf8(decoded).map_err(|_| invalid())?;
        let (id, secret) = decoded.split_once(':').ok_or_else(invalid)?;
        let id = form_decode(id).ok_or_else(invalid)?;
        let secret = form_decode(secret).ok_or_else(invalid)?;
        return Ok((id, secret));
    }
    match (&request.client_id, &request.client_secret) {
        (Some(id), Some(secret)) => Ok((id.clone(), secret.clone())),
        _ => Err(ApiError(OAuthError::InvalidClient(
            "no client credentials".to_string(),
        ))),
    }
}

/// Undo the `application/x-www-form-urlencoded` encoding of a Basic credential part.
/// Encoded parts never contain a raw `&`.
fn form_decode(value: &str) -> Option<String> {
    if value.contains('&') {
        return None;
    }
    url::form_urlencoded::parse(format!("v={value}").as_bytes())
        .next()
        .map(|(_, decoded)| decoded.into_owned())
}

/// Key material for verifying access tokens
#[utoipa::path(
    get,
    path = "/oauth/token_key",
    tag = OAUTH_TAG,
    responses(
        (status = 200, description = "Verification key", body = TokenKeyResponse),
    )
)]
pub(crate) async fn token_key(State(state): State<AppState>) -> Response {
    let mut response = Json(TokenKeyResponse::from(state.core.token_key())).into_response();
    presets::public_max_age(60).apply(&mut response);
    response
}
