//! Password reset routes

use axum::{middleware, routing::post, Router};

use super::handlers;
use crate::rate_limit_middleware::rate_limit_middleware;

/// Creates and returns the password reset router
///
/// # Routes
/// - `POST /api/auth/password-reset/request` - Email a reset link
/// - `POST /api/auth/password-reset/confirm` - Redeem a token and set a new password
///
/// Both routes are public and rate limited per client IP.
pub fn password_reset_routes() -> Router {
    Router::new()
        .route(
            "/api/auth/password-reset/request",
            post(handlers::request_password_reset),
        )
        .route(
            "/api/auth/password-reset/confirm",
            post(handlers::confirm_password_reset),
        )
        .route_layer(middleware::from_fn(rate_limit_middleware))
}
