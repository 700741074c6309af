//! Jira linking handlers

use axum::{
    extract::{Extension, Json, Query},
    response::Html,
};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

use super::models::{
    CallbackCaller, CallbackPayload, CallbackQuery, CallbackResponse, ConnectResponse,
    ConnectionStatus,
};
use crate::auth::AuthedUser;
use crate::common::{ApiError, AppState};

const GENERIC_FAILURE: &str = "Jira account linking failed. Please try again.";

/// POST /api/integrations/jira/connect
///
/// Starts the PKCE handshake for the caller and returns the consent URL to
/// open in a popup.
pub async fn connect_jira(
    Extension(state_lock): Extension<Arc<RwLock<AppState>>>,
    user: AuthedUser,
) -> Result<Json<ConnectResponse>, ApiError> {
    let state = state_lock.read().await.clone();
    let response = state.jira_link.initiate(&user.account).await?;
    Ok(Json(response))
}

/// GET /api/integrations/jira/callback
///
/// Redirect target registered with Atlassian. Renders a page that reports the
/// outcome to the opener window and closes itself.
pub async fn jira_callback_page(
    Extension(state_lock): Extension<Arc<RwLock<AppState>>>,
    Query(params): Query<CallbackQuery>,
) -> Html<String> {
    let state = state_lock.read().await.clone();

    let page = match state.jira_link.complete_callback(params, None).await {
        Ok(_) => callback_page(&state.portal_origin, None),
        Err(e) => callback_page(&state.portal_origin, Some(e.kind())),
    };
    Html(page)
}

/// POST /api/integrations/jira/callback
///
/// Same as the redirect callback, for front ends that capture `code` and
/// `state` themselves. Also accepts the client-held `codeVerifier` and
/// `fallbackTicket` returned by connect when the session could not be stored.
pub async fn jira_callback_submit(
    Extension(state_lock): Extension<Arc<RwLock<AppState>>>,
    user: AuthedUser,
    Json(payload): Json<CallbackPayload>,
) -> Json<CallbackResponse> {
    let state = state_lock.read().await.clone();

    let params = CallbackQuery {
        code: payload.code,
        state: payload.state,
        error: payload.error,
        error_description: None,
    };
    let caller = CallbackCaller {
        account_id: user.id.clone(),
        code_verifier: payload.code_verifier,
        fallback_ticket: payload.fallback_ticket,
    };

    match state.jira_link.complete_callback(params, Some(caller)).await {
        Ok(_) => Json(CallbackResponse {
            ok: true,
            error: None,
            message: None,
        }),
        Err(e) => Json(CallbackResponse {
            ok: false,
            error: Some(e.kind().to_string()),
            message: Some(GENERIC_FAILURE.to_string()),
        }),
    }
}

/// GET /api/integrations/jira/status
pub async fn jira_status(
    Extension(state_lock): Extension<Arc<RwLock<AppState>>>,
    user: AuthedUser,
) -> Result<Json<ConnectionStatus>, ApiError> {
    let state = state_lock.read().await.clone();
    let status = state.jira_link.connection_status(&user.id).await?;
    Ok(Json(status))
}

/// POST /api/integrations/jira/test
///
/// Live check against Jira; flips `connected` off if the token is rejected.
pub async fn test_jira_connection(
    Extension(state_lock): Extension<Arc<RwLock<AppState>>>,
    user: AuthedUser,
) -> Result<Json<ConnectionStatus>, ApiError> {
    let state = state_lock.read().await.clone();
    let status = state.jira_link.verify_live_connection(&user.id).await?;
    Ok(Json(status))
}

/// DELETE /api/integrations/jira
pub async fn disconnect_jira(
    Extension(state_lock): Extension<Arc<RwLock<AppState>>>,
    user: AuthedUser,
) -> Result<Json<serde_json::Value>, ApiError> {
    let state = state_lock.read().await.clone();
    state.jira_link.disconnect(&user.id).await?;
    info!(account_id = %user.id, "Jira disconnect requested");
    Ok(Json(serde_json::json!({ "ok": true })))
}

/// JSON embedded in an inline script; `<` is escaped so no value can close the tag.
fn script_json(value: &serde_json::Value) -> String {
    value.to_string().replace('<', "\\u003c")
}

pub(crate) fn callback_page(portal_origin: &str, error_kind: Option<&str>) -> String {
    let message = serde_json::json!({
        "type": "jira-oauth",
        "ok": error_kind.is_none(),
        "error": error_kind,
    });
    let origin = serde_json::Value::String(portal_origin.trim_end_matches('/').to_string());
    let text = if error_kind.is_some() {
        GENERIC_FAILURE
    } else {
        "Jira connected. You can close this window."
    };

    format!(
        r#"<!DOCTYPE html>
<html>
<head><meta charset="UTF-8"><title>Jira</title></head>
<body>
<p>{text}</p>
<script>
  (function () {{
    var message = {message};
    if (window.opener) {{
      window.opener.postMessage(message, {origin});
    }}
    window.close();
  }})();
</script>
</body>
</html>"#,
        text = crate::services::email::escape_html(text),
        message = script_json(&message),
        origin = script_json(&origin),
    )
}
