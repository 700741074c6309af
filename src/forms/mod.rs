//! # Forms Module
//!
//! Public form submissions from the marketing site. Each form kind has its own
//! typed payload and validator; submissions are stored as JSON rows.
//!
//! - `models`: `FormSubmission` and the per-kind payloads
//! - `validators`: per-kind field rules
//! - `services`: persistence
//! - `handlers` / `routes`: `POST /api/forms`

pub mod handlers;
pub mod models;
pub mod routes;
pub mod services;
pub mod validators;


pub use models::{FormKind, FormSubmission};
pub use routes::form_routes;
