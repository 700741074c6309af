//! # Billing Module
//!
//! This module resolves the Stripe customer behind a portal account:
//! - Billing snapshot for the caller, or for an impersonated account (admins only)
//! - Self-service linking of the caller's own account to a Stripe customer
//! - Admin assignment of a billing customer id

pub mod handlers;
pub mod models;
pub mod routes;
pub mod services;


pub use routes::billing_routes;
pub use services::{BillingError, BillingService};
