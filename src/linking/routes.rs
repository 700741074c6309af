//! Jira linking routes

use axum::{
    routing::{delete, get, post},
    Router,
};

use super::handlers;

/// Creates and returns the Jira integration router
///
/// # Routes
/// - `POST /api/integrations/jira/connect` - Start the OAuth handshake
/// - `GET /api/integrations/jira/callback` - OAuth redirect target (popup page)
/// - `POST /api/integrations/jira/callback` - Complete the handshake from the client
/// - `GET /api/integrations/jira/status` - Stored linkage details
/// - `POST /api/integrations/jira/test` - Live connection check
/// - `DELETE /api/integrations/jira` - Remove the linkage
pub fn linking_routes() -> Router {
    Router::new()
        .route("/api/integrations/jira/connect", post(handlers::connect_jira))
        .route(
            "/api/integrations/jira/callback",
            get(handlers::jira_callback_page).post(handlers::jira_callback_submit),
        )
        .route("/api/integrations/jira/status", get(handlers::jira_status))
        .route("/api/integrations/jira/test", post(handlers::test_jira_connection))
        .route("/api/integrations/jira", delete(handlers::disconnect_jira))
}
