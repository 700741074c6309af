//! Authentication handlers

use axum::extract::Json;
use serde_json::json;

use super::extractors::AuthedUser;
use super::models::MeResponse;
use crate::common::ApiError;

/// GET /api/me
/// Returns the authenticated account
///
/// # Response
/// ```json
/// {
///   "user": { ... },
///   "is_admin": true
/// }
/// ```
pub async fn me_handler(authed: AuthedUser) -> Result<Json<MeResponse>, ApiError> {
    Ok(Json(MeResponse {
        is_admin: authed.is_admin,
        user: authed.account,
    }))
}

/// GET /api/health
pub async fn health_handler() -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
