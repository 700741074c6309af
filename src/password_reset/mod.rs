//! # Password Reset Module
//!
//! This module handles the "forgot password" flow:
//! - Issuing single-use reset tokens (only the SHA-256 digest is stored)
//! - Emailing the reset link
//! - Confirming a reset and updating the credential at the identity provider

pub mod handlers;
pub mod models;
pub mod routes;
pub mod services;
pub mod validators;

#[cfg(test)]
mod tests;

pub use routes::password_reset_routes;
pub use services::{PasswordResetService, ResetError};
