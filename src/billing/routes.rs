//! Billing routes

use axum::{
    routing::{post, put},
    Router,
};

use super::handlers;

/// Creates and returns the billing router
///
/// # Routes
/// - `POST /api/billing/resolve` - Billing snapshot (admins may impersonate)
/// - `POST /api/billing/sync` - Link the caller's account to a Stripe customer
/// - `PUT /api/admin/accounts/:id/billing-customer` - Admin assignment of a customer id
pub fn billing_routes() -> Router {
    Router::new()
        .route("/api/billing/resolve", post(handlers::resolve_billing))
        .route("/api/billing/sync", post(handlers::sync_billing))
        .route(
            "/api/admin/accounts/:id/billing-customer",
            put(handlers::assign_billing_customer),
        )
}
