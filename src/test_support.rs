//! Shared fixtures for unit tests: an in-memory store and hand-written
//! doubles for every external provider.

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::accounts::models::ResetClaim;
use crate::accounts::store::StoreResult;
use crate::accounts::{
    Account, CredentialStore, ExternalLinkage, LinkProvider, NewAccount, OAuthSession, Role,
    SqliteCredentialStore,
};
use crate::billing::BillingService;
use crate::common::clock::ManualClock;
use crate::common::config::{JiraConfig, ResetConfig};
use crate::common::migrations::create_schema;
use crate::common::AppState;
use crate::linking::JiraLinkService;
use crate::password_reset::PasswordResetService;
use crate::services::email::{NotificationError, NotificationSender, OutgoingEmail};
use crate::services::identity::{IdentityError, IdentityProvider};
use crate::services::jira::{
    AccessibleResource, JiraError, JiraOAuthClient, JiraUser, TokenResponse,
};
use crate::services::rate_limit::{RateLimitConfig, RateLimitService};
use crate::services::stripe::{BillingProvider, Customer, Invoice, NewCustomer, StripeError};
use crate::services::TokenCipher;

pub const TEST_JWT_SECRET: &str = "test-jwt-secret";

pub fn start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 1, 15, 9, 0, 0).unwrap()
}

/// Single-connection in-memory database with the full schema.
pub async fn test_pool() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await
        .expect("Failed to create in-memory pool");
    create_schema(&pool).await.expect("Failed to create schema");
    pool
}

pub async fn test_store() -> Arc<SqliteCredentialStore> {
    Arc::new(SqliteCredentialStore::new(test_pool().await))
}

pub async fn seed_account(store: &dyn CredentialStore, email: &str, role: Role) -> Account {
    store
        .insert_account(
            NewAccount {
                email: email.to_string(),
                display_name: Some("Test User".to_string()),
                role,
            },
            start_time(),
        )
        .await
        .expect("Failed to seed account")
}

pub fn test_cipher() -> Arc<TokenCipher> {
    Arc::new(TokenCipher::from_key(&TokenCipher::generate_key()).unwrap())
}

pub fn test_reset_config() -> ResetConfig {
    ResetConfig {
        portal_base_url: "https://portal.example.com".to_string(),
        background_dispatch: false,
        ..ResetConfig::default()
    }
}

pub fn test_jira_config() -> JiraConfig {
    JiraConfig {
        client_id: "jira-client-id".to_string(),
        client_secret: "jira-client-secret".to_string(),
        redirect_uri: "https://api.example.com/api/integrations/jira/callback".to_string(),
        scopes: JiraConfig::DEFAULT_SCOPES.to_string(),
        auth_base_url: "https://auth.atlassian.com".to_string(),
        api_base_url: "https://api.atlassian.com".to_string(),
        session_ttl_minutes: 10,
    }
}

/// Full application state over `store`, with every provider mocked.
pub fn test_app_state(store: Arc<SqliteCredentialStore>) -> AppState {
    let clock = Arc::new(ManualClock::new(start_time()));
    AppState {
        db: store.pool().clone(),
        jwt_secret: TEST_JWT_SECRET.to_string(),
        portal_origin: "https://portal.example.com".to_string(),
        clock: clock.clone(),
        store: store.clone(),
        password_reset: Arc::new(PasswordResetService::new(
            store.clone(),
            Arc::new(RecordingNotificationSender::default()),
            Arc::new(MockIdentityProvider::default()),
            clock.clone(),
            test_reset_config(),
        )),
        jira_link: Arc::new(JiraLinkService::new(
            store.clone(),
            Arc::new(MockJiraClient::default()),
            test_cipher(),
            clock.clone(),
            test_jira_config(),
        )),
        billing: Arc::new(BillingService::new(
            store,
            Arc::new(MockBillingProvider::default()),
            clock,
        )),
        rate_limit_service: Arc::new(RateLimitService::new(RateLimitConfig::default())),
    }
}

// ============================================================================
// Credential store
// ============================================================================

/// SQLite store that counts reset-token writes, including ones that match
/// no account.
pub struct CountingCredentialStore {
    pub inner: SqliteCredentialStore,
    pub reset_token_writes: AtomicUsize,
}

impl CountingCredentialStore {
    pub fn new(inner: SqliteCredentialStore) -> Self {
        Self {
            inner,
            reset_token_writes: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl CredentialStore for CountingCredentialStore {
    async fn find_account_by_id(&self, account_id: &str) -> StoreResult<Option<Account>> {
        self.inner.find_account_by_id(account_id).await
    }

    async fn find_account_by_email(&self, email: &str) -> StoreResult<Option<Account>> {
        self.inner.find_account_by_email(email).await
    }

    async fn insert_account(
        &self,
        account: NewAccount,
        now: DateTime<Utc>,
    ) -> StoreResult<Account> {
        self.inner.insert_account(account, now).await
    }

    async fn store_reset_token(
        &self,
        account_id: &str,
        token_hash: &str,
        expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> StoreResult<()> {
        self.reset_token_writes.fetch_add(1, Ordering::SeqCst);
        self.inner
            .store_reset_token(account_id, token_hash, expires_at, now)
            .await
    }

    async fn claim_reset_token(
        &self,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<ResetClaim>> {
        self.inner.claim_reset_token(token_hash, now).await
    }

    async fn release_reset_token(
        &self,
        account_id: &str,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<()> {
        self.inner.release_reset_token(account_id, token_hash, now).await
    }

    async fn finalize_reset_token(
        &self,
        account_id: &str,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<()> {
        self.inner.finalize_reset_token(account_id, token_hash, now).await
    }

    async fn insert_oauth_session(&self, session: &OAuthSession) -> StoreResult<()> {
        self.inner.insert_oauth_session(session).await
    }

    async fn take_oauth_session(&self, state: &str) -> StoreResult<Option<OAuthSession>> {
        self.inner.take_oauth_session(state).await
    }

    async fn purge_expired_oauth_sessions(&self, now: DateTime<Utc>) -> StoreResult<u64> {
        self.inner.purge_expired_oauth_sessions(now).await
    }

    async fn get_linkage(
        &self,
        account_id: &str,
        provider: LinkProvider,
    ) -> StoreResult<Option<ExternalLinkage>> {
        self.inner.get_linkage(account_id, provider).await
    }

    async fn upsert_linkage(&self, linkage: &ExternalLinkage) -> StoreResult<()> {
        self.inner.upsert_linkage(linkage).await
    }

    async fn update_linkage_tokens(
        &self,
        account_id: &str,
        provider: LinkProvider,
        access_token_enc: &str,
        refresh_token_enc: Option<&str>,
        expires_at: DateTime<Utc>,
    ) -> StoreResult<()> {
        self.inner
            .update_linkage_tokens(account_id, provider, access_token_enc, refresh_token_enc, expires_at)
            .await
    }

    async fn record_linkage_check(
        &self,
        account_id: &str,
        provider: LinkProvider,
        connected: bool,
        checked_at: DateTime<Utc>,
    ) -> StoreResult<()> {
        self.inner
            .record_linkage_check(account_id, provider, connected, checked_at)
            .await
    }

    async fn delete_linkage(&self, account_id: &str, provider: LinkProvider) -> StoreResult<bool> {
        self.inner.delete_linkage(account_id, provider).await
    }

    async fn set_billing_customer_id(
        &self,
        account_id: &str,
        customer_id: Option<&str>,
        now: DateTime<Utc>,
    ) -> StoreResult<bool> {
        self.inner
            .set_billing_customer_id(account_id, customer_id, now)
            .await
    }
}

// ============================================================================
// Notification sender
// ============================================================================

#[derive(Default)]
pub struct RecordingNotificationSender {
    pub sent: Mutex<Vec<OutgoingEmail>>,
    pub fail: AtomicBool,
}

impl RecordingNotificationSender {
    pub fn sent(&self) -> Vec<OutgoingEmail> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl NotificationSender for RecordingNotificationSender {
    async fn send(&self, email: OutgoingEmail) -> Result<(), NotificationError> {
        self.sent.lock().unwrap().push(email);
        if self.fail.load(Ordering::SeqCst) {
            return Err(NotificationError::DeliveryFailed("smtp down".to_string()));
        }
        Ok(())
    }
}

// ============================================================================
// Identity provider
// ============================================================================

#[derive(Default)]
pub struct MockIdentityProvider {
    pub credentials: Mutex<HashMap<String, String>>,
    pub calls: AtomicUsize,
    pub fail: AtomicBool,
}

impl MockIdentityProvider {
    pub fn credential_for(&self, account_id: &str) -> Option<String> {
        self.credentials.lock().unwrap().get(account_id).cloned()
    }
}

#[async_trait]
impl IdentityProvider for MockIdentityProvider {
    async fn set_credential(
        &self,
        account_id: &str,
        new_credential: &str,
    ) -> Result<(), IdentityError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(IdentityError::Rejected {
                status: 500,
                body: "upstream error".to_string(),
            });
        }
        self.credentials
            .lock()
            .unwrap()
            .insert(account_id.to_string(), new_credential.to_string());
        Ok(())
    }
}

// ============================================================================
// Jira
// ============================================================================

pub struct MockJiraClient {
    pub exchange_calls: AtomicUsize,
    pub refresh_calls: AtomicUsize,
    pub fail_exchange: AtomicBool,
    /// `expires_in` reported by exchange and refresh.
    pub expires_in: AtomicI64,
    pub resources: Mutex<Vec<AccessibleResource>>,
    /// `None` answers "myself" successfully; `Some(status)` fails with it.
    pub myself_status: Mutex<Option<u16>>,
    pub last_verifier: Mutex<Option<String>>,
    pub last_access_token: Mutex<Option<String>>,
}

impl Default for MockJiraClient {
    fn default() -> Self {
        Self {
            exchange_calls: AtomicUsize::new(0),
            refresh_calls: AtomicUsize::new(0),
            fail_exchange: AtomicBool::new(false),
            expires_in: AtomicI64::new(3600),
            resources: Mutex::new(vec![AccessibleResource {
                id: "cloud-123".to_string(),
                url: "https://acme.atlassian.net".to_string(),
                name: "acme".to_string(),
                scopes: vec!["read:jira-work".to_string()],
            }]),
            myself_status: Mutex::new(None),
            last_verifier: Mutex::new(None),
            last_access_token: Mutex::new(None),
        }
    }
}

#[async_trait]
impl JiraOAuthClient for MockJiraClient {
    async fn exchange_code(
        &self,
        _code: &str,
        code_verifier: &str,
    ) -> Result<TokenResponse, JiraError> {
        self.exchange_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_verifier.lock().unwrap() = Some(code_verifier.to_string());
        if self.fail_exchange.load(Ordering::SeqCst) {
            return Err(JiraError::OAuthFailed {
                status: 400,
                body: "invalid_grant".to_string(),
            });
        }
        Ok(TokenResponse {
            access_token: "jira-access-token".to_string(),
            refresh_token: Some("jira-refresh-token".to_string()),
            expires_in: self.expires_in.load(Ordering::SeqCst),
            token_type: Some("Bearer".to_string()),
            scope: None,
        })
    }

    async fn refresh_token(&self, _refresh_token: &str) -> Result<TokenResponse, JiraError> {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        Ok(TokenResponse {
            access_token: "jira-access-token-refreshed".to_string(),
            refresh_token: None,
            expires_in: self.expires_in.load(Ordering::SeqCst),
            token_type: Some("Bearer".to_string()),
            scope: None,
        })
    }

    async fn accessible_resources(
        &self,
        _access_token: &str,
    ) -> Result<Vec<AccessibleResource>, JiraError> {
        Ok(self.resources.lock().unwrap().clone())
    }

    async fn myself(&self, access_token: &str, _cloud_id: &str) -> Result<JiraUser, JiraError> {
        *self.last_access_token.lock().unwrap() = Some(access_token.to_string());
        match *self.myself_status.lock().unwrap() {
            None => Ok(JiraUser {
                account_id: "jira-user-1".to_string(),
                email_address: Some("dev@acme.com".to_string()),
                display_name: Some("Dev".to_string()),
            }),
            Some(status @ (401 | 403)) => Err(JiraError::Unauthorized(status)),
            Some(status) => Err(JiraError::UnexpectedStatus(status)),
        }
    }
}

// ============================================================================
// Billing
// ============================================================================

#[derive(Default)]
pub struct MockBillingProvider {
    pub customers: Mutex<HashMap<String, Customer>>,
    pub retrieve_calls: AtomicUsize,
    pub find_calls: AtomicUsize,
    pub create_calls: AtomicUsize,
    pub invoice_calls: AtomicUsize,
    pub fail_transport: AtomicBool,
}

impl MockBillingProvider {
    pub fn with_customer(id: &str, email: &str) -> Self {
        let provider = Self::default();
        provider.customers.lock().unwrap().insert(
            id.to_string(),
            Customer {
                id: id.to_string(),
                email: Some(email.to_string()),
                name: None,
                currency: Some("usd".to_string()),
                balance: 0,
                delinquent: Some(false),
            },
        );
        provider
    }

    pub fn total_calls(&self) -> usize {
        self.retrieve_calls.load(Ordering::SeqCst)
            + self.find_calls.load(Ordering::SeqCst)
            + self.create_calls.load(Ordering::SeqCst)
            + self.invoice_calls.load(Ordering::SeqCst)
    }

    fn check_transport(&self) -> Result<(), StripeError> {
        if self.fail_transport.load(Ordering::SeqCst) {
            return Err(StripeError::Timeout);
        }
        Ok(())
    }
}

#[async_trait]
impl BillingProvider for MockBillingProvider {
    async fn retrieve_customer(&self, customer_id: &str) -> Result<Option<Customer>, StripeError> {
        self.retrieve_calls.fetch_add(1, Ordering::SeqCst);
        self.check_transport()?;
        Ok(self.customers.lock().unwrap().get(customer_id).cloned())
    }

    async fn find_customer_by_email(&self, email: &str) -> Result<Option<Customer>, StripeError> {
        self.find_calls.fetch_add(1, Ordering::SeqCst);
        self.check_transport()?;
        Ok(self
            .customers
            .lock()
            .unwrap()
            .values()
            .find(|c| {
                c.email
                    .as_deref()
                    .is_some_and(|e| e.eq_ignore_ascii_case(email))
            })
            .cloned())
    }

    async fn create_customer(&self, customer: &NewCustomer) -> Result<Customer, StripeError> {
        let n = self.create_calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.check_transport()?;
        let created = Customer {
            id: format!("cus_created{}", n),
            email: Some(customer.email.clone()),
            name: customer.name.clone(),
            currency: None,
            balance: 0,
            delinquent: None,
        };
        self.customers
            .lock()
            .unwrap()
            .insert(created.id.clone(), created.clone());
        Ok(created)
    }

    async fn list_invoices(
        &self,
        customer_id: &str,
        _limit: u32,
    ) -> Result<Vec<Invoice>, StripeError> {
        self.invoice_calls.fetch_add(1, Ordering::SeqCst);
        self.check_transport()?;
        Ok(vec![Invoice {
            id: format!("in_{}", customer_id),
            number: Some("INV-0001".to_string()),
            status: Some("paid".to_string()),
            amount_due: 12000,
            amount_paid: 12000,
            currency: "usd".to_string(),
            created: 1_767_225_600,
            hosted_invoice_url: None,
        }])
    }
}
