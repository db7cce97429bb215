//! HTML rendered by the gateway

use crate::upstream::Message;
use axum::response::{Html, IntoResponse, Response};
use http::StatusCode;
use oauth_core::headers::presets;
use oauth_core::html::escape;

const STYLE: &str = "body { font-family: Arial, sans-serif; max-width: 640px; margin: 40px auto; padding: 20px; }
.message { border-bottom: 1px solid #eee; padding: 8px 0; }
.meta { color: #6c757d; font-size: 0.85em; }
.error { color: #b00020; }
textarea { width: 100%; }
button { background: #007bff; color: white; padding: 8px 16px; border: none; border-radius: 4px; cursor: pointer; }
button.secondary { background: #6c757d; }";

fn page(status: StatusCode, title: &str, body: String) -> Response {
    let html = format!(
        "<!DOCTYPE html>\n<html>\n<head>\n<title>{title}</title>\n<style>{STYLE}</style>\n</head>\n<body>\n{body}\n</body>\n</html>\n",
        title = escape(title),
    );
    let mut response = (status, Html(html)).into_response();
    presets::private_no_cache().apply(&mut response);
    response
}

pub fn home_page(username: &str, messages: &[Message]) -> Response {
    let list = if messages.is_empty() {
        "<p>No messages yet.</p>".to_string()
    } else {
        messages
            .iter()
            .map(|message| {
                format!(
                    "<div class=\"message\"><div>{}</div><div class=\"meta\">{} at {}</div></div>",
                    escape(&message.text),
                    escape(&message.username),
                    escape(&message.created_at)
                )
            })
            .collect::<String>()
    };
    let body = format!(
        r#"<h2>Messages</h2>
<p>Signed in as <strong>{username}</strong></p>
<form method="post" action="/messages">
  <textarea name="text" rows="3" required></textarea>
  <button type="submit">Post</button>
</form>
{list}
<form method="post" action="/logout"><button type="submit" class="secondary">Sign out</button></form>"#,
        username = escape(username),
    );
    page(StatusCode::OK, "Messages", body)
}

pub fn login_failed(status: StatusCode, reason: &str) -> Response {
    let body = format!(
        "<h2>Login failed</h2>\n<p class=\"error\">{}</p>\n<p><a href=\"/\">Try again</a></p>",
        escape(reason)
    );
    page(status, "Login failed", body)
}

pub fn error_page(status: StatusCode, title: &str, detail: &str) -> Response {
    let body = format!(
        "<h2>{}</h2>\n<p class=\"error\">{}</p>\n<p><a href=\"/\">Back</a></p>",
        escape(title),
        escape(detail)
    );
    page(status, title, body)
}

pub fn signed_out() -> Response {
    page(
        StatusCode::OK,
        "Signed out",
        "<h2>Signed out</h2>\n<p><a href=\"/\">Sign in again</a></p>".to_string(),
    )
}
