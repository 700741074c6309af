//! Form handlers

use axum::extract::{Extension, Json};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

use super::models::{FormSubmission, SubmitFormResponse};
use super::services::record_submission;
use crate::common::{ApiError, AppState, Validator};

/// POST /api/forms
///
/// # Request Body
/// ```json
/// { "kind": "contact", "name": "...", "email": "...", "message": "..." }
/// ```
pub async fn submit_form(
    Extension(state_lock): Extension<Arc<RwLock<AppState>>>,
    Json(submission): Json<FormSubmission>,
) -> Result<Json<SubmitFormResponse>, ApiError> {
    let state = state_lock.read().await.clone();

    let validation = submission.validate(&submission);
    if !validation.is_valid {
        debug!(kind = submission.kind().as_str(), "Rejected invalid form submission");
        return Err(ApiError::from(validation));
    }

    let id = record_submission(&state.db, &submission, state.clock.now()).await?;
    Ok(Json(SubmitFormResponse { ok: true, id }))
}
