use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::{error, info};
use uuid::Uuid;

use super::models::FormSubmission;
use crate::common::{normalize_email, safe_email_log, ApiError};

/// Stores a validated submission and returns its id.
pub async fn record_submission(
    db: &SqlitePool,
    submission: &FormSubmission,
    now: DateTime<Utc>,
) -> Result<String, ApiError> {
    let id = Uuid::new_v4().to_string();
    let kind = submission.kind();
    let email = normalize_email(submission.email());
    let payload = serde_json::to_string(submission)
        .map_err(|e| ApiError::InternalServer(format!("Failed to encode submission: {}", e)))?;

    sqlx::query(
        "INSERT INTO form_submissions (id, kind, email, payload, created_at) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(&id)
    .bind(kind.as_str())
    .bind(&email)
    .bind(&payload)
    .bind(now.timestamp_millis())
    .execute(db)
    .await
    .map_err(|e| {
        error!(error = %e, kind = kind.as_str(), "Failed to store form submission");
        ApiError::DatabaseError(e)
    })?;

    info!(
        submission_id = %id,
        kind = kind.as_str(),
        email = %safe_email_log(&email),
        "Form submission stored"
    );
    Ok(id)
}
