use super::models::{ConfirmResetPayload, RequestResetPayload};
use crate::common::{ValidationResult, Validator};

/// Upper bound on any field accepted by the reset endpoints.
const MAX_FIELD_LEN: usize = 1024;

impl Validator<RequestResetPayload> for RequestResetPayload {
    fn validate(&self, data: &RequestResetPayload) -> ValidationResult {
        let mut result = ValidationResult::new();

        if data.email.trim().is_empty() {
            result.add_error("email", "Email is required");
        } else {
            result.require_email("email", &data.email);
        }

        result
    }
}

/// Only shape is checked here; password strength is decided by the service so
/// it can answer with `WEAK_PASSWORD`.
impl Validator<ConfirmResetPayload> for ConfirmResetPayload {
    fn validate(&self, data: &ConfirmResetPayload) -> ValidationResult {
        let mut result = ValidationResult::new();

        if data.token.trim().is_empty() {
            result.add_error("token", "Reset token is required");
        }

        if data.token.len() > MAX_FIELD_LEN {
            result.add_error("token", "Reset token is malformed");
        }

        if data.new_password.len() > MAX_FIELD_LEN {
            result.add_error("newPassword", "Password is too long");
        }

        result
    }
}
