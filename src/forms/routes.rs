//! Form routes

use axum::{middleware, routing::post, Router};

use super::handlers;
use crate::rate_limit_middleware::rate_limit_middleware;

/// Creates and returns the forms router
///
/// # Routes
/// - `POST /api/forms` - Submit a demo, contact, trial or application form (rate limited)
pub fn form_routes() -> Router {
    Router::new()
        .route("/api/forms", post(handlers::submit_form))
        .route_layer(middleware::from_fn(rate_limit_middleware))
}
