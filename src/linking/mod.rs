//! # Linking Module
//!
//! This module links portal accounts to external ticketing systems:
//! - Jira OAuth 2.0 authorization code flow with PKCE
//! - Encrypted storage of access and refresh tokens
//! - Live connection checks, status and unlinking

pub mod handlers;
pub mod models;
pub mod pkce;
pub mod routes;
pub mod services;
pub mod ticket;


pub use routes::linking_routes;
pub use services::{JiraLinkService, LinkError};
