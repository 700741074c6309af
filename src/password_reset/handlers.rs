//! Password reset handlers

use axum::extract::{Extension, Json};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

use super::models::{ConfirmResetPayload, RequestResetPayload, ResetResponse};
use crate::common::{ApiError, AppState, Validator};

/// POST /api/auth/password-reset/request
///
/// Always answers `{ "ok": true }` for a well-formed email, registered or not.
pub async fn request_password_reset(
    Extension(state_lock): Extension<Arc<RwLock<AppState>>>,
    Json(payload): Json<RequestResetPayload>,
) -> Result<Json<ResetResponse>, ApiError> {
    let state = state_lock.read().await.clone();

    let validation = payload.validate(&payload);
    if !validation.is_valid {
        return Err(ApiError::from(validation));
    }

    state.password_reset.request_reset(&payload.email).await?;
    Ok(Json(ResetResponse::ok()))
}

/// POST /api/auth/password-reset/confirm
///
/// # Request Body
/// ```json
/// { "token": "<secret from the email link>", "newPassword": "..." }
/// ```
pub async fn confirm_password_reset(
    Extension(state_lock): Extension<Arc<RwLock<AppState>>>,
    Json(payload): Json<ConfirmResetPayload>,
) -> Result<Json<ResetResponse>, ApiError> {
    let state = state_lock.read().await.clone();

    let validation = payload.validate(&payload);
    if !validation.is_valid {
        debug!("Rejected malformed reset confirmation");
        return Err(ApiError::from(validation));
    }

    state
        .password_reset
        .confirm_reset(&payload.token, &payload.new_password)
        .await?;
    Ok(Json(ResetResponse::ok()))
}
