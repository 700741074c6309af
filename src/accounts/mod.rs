//! # Accounts Module
//!
//! Persistence for everything the credential flows read or write:
//! - Accounts, with their embedded reset-token columns
//! - Short-lived OAuth sessions keyed by `state`
//! - External provider linkages (encrypted tokens)
//!
//! Flows only go through the [`CredentialStore`] trait.

pub mod models;
pub mod store;


pub use models::{Account, ExternalLinkage, LinkProvider, NewAccount, OAuthSession, Role};
pub use store::{CredentialStore, SqliteCredentialStore, StoreError};
