// src/logging_middleware.rs
//! Middleware for logging request and response bodies in debug mode.
//! Values under credential-bearing keys are replaced before anything is logged.

use axum::body::to_bytes;
use axum::{body::Body, extract::Request, http::StatusCode, middleware::Next, response::Response};
use serde_json::Value;
use tracing::debug;

const REDACTED: &str = "[REDACTED]";

/// JSON keys whose values never reach the logs.
const SENSITIVE_KEYS: &[&str] = &[
    "password",
    "newPassword",
    "new_password",
    "token",
    "code",
    "codeVerifier",
    "code_verifier",
    "fallbackTicket",
    "accessToken",
    "access_token",
    "refreshToken",
    "refresh_token",
    "secret",
];

fn is_sensitive(key: &str) -> bool {
    SENSITIVE_KEYS.iter().any(|k| k.eq_ignore_ascii_case(key))
}

/// Replaces sensitive values in place, at any depth.
pub fn redact(value: &mut Value) {
    match value {
        Value::Object(map) => {
            for (key, inner) in map.iter_mut() {
                if is_sensitive(key) {
                    *inner = Value::String(REDACTED.to_string());
                } else {
                    redact(inner);
                }
            }
        }
        Value::Array(items) => items.iter_mut().for_each(redact),
        _ => {}
    }
}

/// Loggable rendering of a body: redacted pretty JSON, or a placeholder for
/// anything that is not JSON (HTML pages, form posts).
fn render_body(bytes: &[u8]) -> Option<String> {
    if bytes.is_empty() {
        return None;
    }
    match serde_json::from_slice::<Value>(bytes) {
        Ok(mut json) => {
            redact(&mut json);
            Some(serde_json::to_string_pretty(&json).unwrap_or_else(|_| json.to_string()))
        }
        Err(_) => Some(format!("<{} bytes, not JSON>", bytes.len())),
    }
}

/// Query strings can carry OAuth codes; only the path is logged.
fn loggable_uri(parts: &axum::http::request::Parts) -> String {
    parts.uri.path().to_string()
}

/// Middleware to log request and response bodies in debug mode
pub async fn log_request_response(request: Request, next: Next) -> Result<Response, StatusCode> {
    let (parts, body) = request.into_parts();

    let bytes = to_bytes(body, usize::MAX)
        .await
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    if let Some(request_body) = render_body(&bytes) {
        debug!(
            method = %parts.method,
            uri = %loggable_uri(&parts),
            request_body = %request_body,
            "📥 Request"
        );
    }

    let request = Request::from_parts(parts, Body::from(bytes));
    let response = next.run(request).await;

    let (parts, body) = response.into_parts();
    let bytes = to_bytes(body, usize::MAX)
        .await
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    if let Some(response_body) = render_body(&bytes) {
        debug!(
            status = %parts.status,
            response_body = %response_body,
            "📤 Response"
        );
    }

    Ok(Response::from_parts(parts, Body::from(bytes)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_redacts_top_level_secrets() {
        let mut body = json!({"token": "abc", "newPassword": "hunter22", "email": "a@b.com"});
        redact(&mut body);
        assert_eq!(body["token"], REDACTED);
        assert_eq!(body["newPassword"], REDACTED);
        assert_eq!(body["email"], "a@b.com");
    }

    #[test]
    fn test_redacts_nested_and_array_values() {
        let mut body = json!({
            "linkage": {"accessToken": "at", "refresh_token": "rt", "site": "acme"},
            "items": [{"codeVerifier": "v", "fallbackTicket": "t"}, {"code": "c", "state": "s"}]
        });
        redact(&mut body);
        assert_eq!(body["linkage"]["accessToken"], REDACTED);
        assert_eq!(body["linkage"]["refresh_token"], REDACTED);
        assert_eq!(body["linkage"]["site"], "acme");
        assert_eq!(body["items"][0]["codeVerifier"], REDACTED);
        assert_eq!(body["items"][0]["fallbackTicket"], REDACTED);
        assert_eq!(body["items"][1]["code"], REDACTED);
        assert_eq!(body["items"][1]["state"], "s");
    }

    #[test]
    fn test_non_json_bodies_are_not_echoed() {
        let rendered = render_body(b"<html>secret page</html>").unwrap();
        assert!(!rendered.contains("secret"));
        assert!(render_body(b"").is_none());
    }

    #[test]
    fn test_rendered_json_has_no_secret_values() {
        let rendered = render_body(br#"{"password":"longenoughpassword"}"#).unwrap();
        assert!(!rendered.contains("longenoughpassword"));
    }
}
