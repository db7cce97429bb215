//! Minimal HTML pages for the interactive login and consent steps

use axum::response::{Html, IntoResponse, Response};
use http::StatusCode;
use oauth_core::headers::presets;
use oauth_core::html::escape;
use oauth_core::{OAuthError, ScopeSet};

const STYLE: &str = "body { font-family: Arial, sans-serif; max-width: 420px; margin: 50px auto; padding: 20px; }
.form-group { margin-bottom: 15px; }
label { display: block; margin-bottom: 5px; }
input[type=text], input[type=password] { width: 100%; padding: 8px; border: 1px solid #ddd; border-radius: 4px; }
button { background: #007bff; color: white; padding: 10px 20px; border: none; border-radius: 4px; cursor: pointer; }
button.secondary { background: #6c757d; }
.error { color: #b00020; }
.scope-list { background: #f8f9fa; padding: 10px; border-radius: 4px; margin: 10px 0; }";

fn page(status: StatusCode, title: &str, body: String) -> Response {
    let html = format!(
        "<!DOCTYPE html>\n<html>\n<head>\n<title>{title}</title>\n<style>{STYLE}</style>\n</head>\n<body>\n{body}\n</body>\n</html>\n",
        title = escape(title),
    );
    let mut response = (status, Html(html)).into_response();
    presets::private_no_cache().apply(&mut response);
    response
}

pub fn login_page(status: StatusCode, return_to: &str, error: Option<&str>) -> Response {
    let error = error
        .map(|message| format!("<p class=\"error\">{}</p>", escape(message)))
        .unwrap_or_default();
    let body = format!(
        r#"<h2>Sign in</h2>
{error}
<form method="post" action="/login">
  <input type="hidden" name="return_to" value="{return_to}">
  <div class="form-group">
    <label for="username">Username:</label>
    <input type="text" id="username" name="username" required autofocus>
  </div>
  <div class="form-group">
    <label for="password">Password:</label>
    <input type="password" id="password" name="password" required>
  </div>
  <button type="submit">Sign in</button>
</form>"#,
        return_to = escape(return_to),
    );
    page(status, "Sign in", body)
}

pub fn consent_page(client_id: &str, username: &str, scopes: Option<&ScopeSet>, consent: &str) -> Response {
    let scopes = match scopes {
        Some(scopes) => scopes
            .iter()
            .map(|scope| format!("<li>{}</li>", escape(scope)))
            .collect::<String>(),
        None => "<li>all scopes this application is allowed</li>".to_string(),
    };
    let body = format!(
        r#"<h2>Authorization Required</h2>
<p>Signed in as <strong>{username}</strong>.</p>
<p>Application <strong>{client_id}</strong> is requesting access to your account.</p>
<div class="scope-list"><strong>Requested permissions:</strong><ul>{scopes}</ul></div>
<form method="post" action="/oauth/authorize">
  <input type="hidden" name="consent" value="{consent}">
  <button type="submit" name="decision" value="approve">Authorize</button>
  <button type="submit" name="decision" value="deny" class="secondary">Deny</button>
</form>"#,
        username = escape(username),
        client_id = escape(client_id),
        consent = escape(consent),
    );
    page(StatusCode::OK, "Authorize application", body)
}

/// Shown when the request cannot be sent back to the client
pub fn error_page(error: &OAuthError) -> Response {
    let body = format!(
        "<h2>Authorization failed</h2>\n<p class=\"error\"><code>{}</code>: {}</p>",
        error.code(),
        escape(&error.public_description())
    );
    page(StatusCode::BAD_REQUEST, "Authorization failed", body)
}

pub fn home_page(username: &str) -> Response {
    let body = format!(
        r#"<h2>Signed in</h2>
<p>You are signed in as <strong>{}</strong>.</p>
<form method="post" action="/logout"><button type="submit" class="secondary">Sign out</button></form>"#,
        escape(username)
    );
    page(StatusCode::OK, "Signed in", body)
}
