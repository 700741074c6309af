//! # Auth Module
//!
//! Caller authentication for the portal API:
//! - HS256 JWT validation (tokens are issued by the hosted identity platform)
//! - `AuthedUser` extractor resolving the token subject to a portal `Account`
//! - `GET /api/me` and the `GET /api/health` liveness check

pub mod extractors;
pub mod handlers;
pub mod models;
pub mod routes;


pub use extractors::AuthedUser;
pub use routes::auth_routes;
