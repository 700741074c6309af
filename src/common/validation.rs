// Common validation types and traits

use regex::Regex;
use std::sync::LazyLock;

static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9._%+\-]+@[A-Za-z0-9\-]+(\.[A-Za-z0-9\-]+)*\.[A-Za-z]{2,}$")
        .expect("email regex is valid")
});

#[derive(Debug)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

#[derive(Debug)]
pub struct ValidationResult {
    pub is_valid: bool,
    pub errors: Vec<ValidationError>,
}

impl ValidationResult {
    pub fn new() -> Self {
        Self {
            is_valid: true,
            errors: Vec::new(),
        }
    }

    pub fn add_error(&mut self, field: &str, message: &str) {
        self.is_valid = false;
        self.errors.push(ValidationError {
            field: field.to_string(),
            message: message.to_string(),
        });
    }

    /// Shorthand for required free-text fields with a length cap.
    pub fn require_text(&mut self, field: &str, value: &str, max_len: usize) {
        if value.trim().is_empty() {
            self.add_error(field, "is required");
        } else if value.chars().count() > max_len {
            self.add_error(field, &format!("must not exceed {} characters", max_len));
        }
    }

    pub fn require_email(&mut self, field: &str, value: &str) {
        if !is_valid_email(value) {
            self.add_error(field, "must be a valid email address");
        }
    }
}

impl Default for ValidationResult {
    fn default() -> Self {
        Self::new()
    }
}

pub trait Validator<T> {
    fn validate(&self, data: &T) -> ValidationResult;
}

/// Syntactic email check. Trims before matching; length capped at 254.
pub fn is_valid_email(email: &str) -> bool {
    let email = email.trim();
    email.len() <= 254 && EMAIL_RE.is_match(email)
}
