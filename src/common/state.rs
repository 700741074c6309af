// Application state shared across all modules

use sqlx::SqlitePool;
use std::sync::Arc;

use crate::accounts::CredentialStore;
use crate::billing::BillingService;
use crate::common::clock::Clock;
use crate::linking::JiraLinkService;
use crate::password_reset::PasswordResetService;
use crate::services::RateLimitService;

/// Application state containing database pool, flow services, and configuration
#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    pub jwt_secret: String,
    /// Origin of the portal front end; the OAuth popup posts its result here.
    pub portal_origin: String,
    pub clock: Arc<dyn Clock>,
    pub store: Arc<dyn CredentialStore>,
    pub password_reset: Arc<PasswordResetService>,
    pub jira_link: Arc<JiraLinkService>,
    pub billing: Arc<BillingService>,
    pub rate_limit_service: Arc<RateLimitService>,
}
