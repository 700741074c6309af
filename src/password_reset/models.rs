//! Password reset request/response models

use serde::{Deserialize, Serialize};

/// Body of `POST /api/auth/password-reset/request`
#[derive(Debug, Clone, Deserialize)]
pub struct RequestResetPayload {
    pub email: String,
}

/// Body of `POST /api/auth/password-reset/confirm`
#[derive(Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmResetPayload {
    pub token: String,
    pub new_password: String,
}

impl std::fmt::Debug for ConfirmResetPayload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfirmResetPayload")
            .field("token", &"<redacted>")
            .field("new_password", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Serialize)]
pub struct ResetResponse {
    pub ok: bool,
}

impl ResetResponse {
    pub fn ok() -> Self {
        Self { ok: true }
    }
}
