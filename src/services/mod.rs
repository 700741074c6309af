// src/services/mod.rs
//
// Shared services: cryptographic helpers and the clients for every external
// provider the flows talk to. Each provider sits behind a trait so the flows
// can be exercised against in-process doubles.

pub mod email;
pub mod encryption;
pub mod identity;
pub mod jira;
pub mod rate_limit;
pub mod stripe;
pub mod token_codec;

// Re-export commonly used types for convenience
pub use email::{NotificationSender, OutgoingEmail};
pub use encryption::TokenCipher;
pub use identity::IdentityProvider;
pub use jira::JiraOAuthClient;
pub use rate_limit::RateLimitService;
pub use stripe::BillingProvider;
