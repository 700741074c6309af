// Common module - shared types and utilities across all modules

pub mod clock;
pub mod config;
pub mod error;
pub mod helpers;
pub mod migrations;
pub mod state;
pub mod validation;

// Re-export commonly used types for convenience
pub use clock::{Clock, SystemClock};
pub use error::ApiError;
pub use helpers::{normalize_email, safe_email_log, safe_token_log};
pub use state::AppState;
pub use validation::{ValidationError, ValidationResult, Validator};
