//! Credential Store: the only component that touches account, reset-token,
//! OAuth-session and linkage rows.
//!
//! Every state transition that must not happen twice (claiming a reset token,
//! consuming an OAuth session) is a single conditional statement, so
//! concurrent requests are serialized by SQLite rather than by in-process
//! locks.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use thiserror::Error;
use tracing::{debug, error};
use uuid::Uuid;

use super::models::{
    to_millis, Account, AccountRow, ExternalLinkage, ExternalLinkageRow, LinkProvider, NewAccount,
    OAuthSession, OAuthSessionRow, ResetClaim,
};
use crate::common::{normalize_email, ApiError};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("An account with this email already exists")]
    DuplicateEmail,

    #[error("Corrupt row: {0}")]
    CorruptRow(String),
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Database(e) => ApiError::DatabaseError(e),
            StoreError::DuplicateEmail => ApiError::BadRequest(err.to_string()),
            StoreError::CorruptRow(msg) => {
                error!(error = %msg, "Corrupt row in credential store");
                ApiError::InternalServer("Stored data could not be read".to_string())
            }
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn find_account_by_id(&self, account_id: &str) -> StoreResult<Option<Account>>;

    /// Case-insensitive lookup on the normalized email.
    async fn find_account_by_email(&self, email: &str) -> StoreResult<Option<Account>>;

    async fn insert_account(&self, account: NewAccount, now: DateTime<Utc>)
        -> StoreResult<Account>;

    /// Overwrites any prior token and clears `used_at`.
    async fn store_reset_token(
        &self,
        account_id: &str,
        token_hash: &str,
        expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> StoreResult<()>;

    /// Marks the token matching `token_hash` as used if it is unused and
    /// unexpired at `now`. At most one caller gets `Some` per issued token.
    async fn claim_reset_token(
        &self,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<ResetClaim>>;

    /// Undo a claim after a failed credential update so the token stays usable.
    async fn release_reset_token(
        &self,
        account_id: &str,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<()>;

    /// Clears hash and expiry after a completed reset; `used_at` is kept.
    async fn finalize_reset_token(
        &self,
        account_id: &str,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<()>;

    async fn insert_oauth_session(&self, session: &OAuthSession) -> StoreResult<()>;

    /// Deletes and returns the session for `state`, expired or not.
    async fn take_oauth_session(&self, state: &str) -> StoreResult<Option<OAuthSession>>;

    async fn purge_expired_oauth_sessions(&self, now: DateTime<Utc>) -> StoreResult<u64>;

    async fn get_linkage(
        &self,
        account_id: &str,
        provider: LinkProvider,
    ) -> StoreResult<Option<ExternalLinkage>>;

    async fn upsert_linkage(&self, linkage: &ExternalLinkage) -> StoreResult<()>;

    async fn update_linkage_tokens(
        &self,
        account_id: &str,
        provider: LinkProvider,
        access_token_enc: &str,
        refresh_token_enc: Option<&str>,
        expires_at: DateTime<Utc>,
    ) -> StoreResult<()>;

    async fn record_linkage_check(
        &self,
        account_id: &str,
        provider: LinkProvider,
        connected: bool,
        checked_at: DateTime<Utc>,
    ) -> StoreResult<()>;

    async fn delete_linkage(&self, account_id: &str, provider: LinkProvider) -> StoreResult<bool>;

    /// Returns false when no such account exists.
    async fn set_billing_customer_id(
        &self,
        account_id: &str,
        customer_id: Option<&str>,
        now: DateTime<Utc>,
    ) -> StoreResult<bool>;
}

const ACCOUNT_COLUMNS: &str =
    "id, email, display_name, role, billing_customer_id, created_at";

const LINKAGE_COLUMNS: &str = "account_id, provider, base_url, resource_id, resource_name, \
     provider_email, access_token_enc, refresh_token_enc, connected, expires_at, \
     last_sync_at, last_checked_at";

#[derive(Debug, Clone)]
pub struct SqliteCredentialStore {
    db: SqlitePool,
}

impl SqliteCredentialStore {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    #[cfg(test)]
    pub fn pool(&self) -> &SqlitePool {
        &self.db
    }
}

fn account_from_row(row: AccountRow) -> StoreResult<Account> {
    Account::try_from(row).map_err(StoreError::CorruptRow)
}

#[async_trait]
impl CredentialStore for SqliteCredentialStore {
    async fn find_account_by_id(&self, account_id: &str) -> StoreResult<Option<Account>> {
        let row = sqlx::query_as::<_, AccountRow>(&format!(
            "SELECT {} FROM accounts WHERE id = ?",
            ACCOUNT_COLUMNS
        ))
        .bind(account_id)
        .fetch_optional(&self.db)
        .await?;

        row.map(account_from_row).transpose()
    }

    async fn find_account_by_email(&self, email: &str) -> StoreResult<Option<Account>> {
        let row = sqlx::query_as::<_, AccountRow>(&format!(
            "SELECT {} FROM accounts WHERE email = ?",
            ACCOUNT_COLUMNS
        ))
        .bind(normalize_email(email))
        .fetch_optional(&self.db)
        .await?;

        row.map(account_from_row).transpose()
    }

    async fn insert_account(
        &self,
        account: NewAccount,
        now: DateTime<Utc>,
    ) -> StoreResult<Account> {
        let id = Uuid::new_v4().to_string();
        let email = normalize_email(&account.email);

        let result = sqlx::query(
            r#"
            INSERT INTO accounts (id, email, display_name, role, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(&email)
        .bind(account.display_name.as_deref())
        .bind(account.role.as_str())
        .bind(to_millis(now))
        .bind(to_millis(now))
        .execute(&self.db)
        .await;

        match result {
            Ok(_) => {}
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                return Err(StoreError::DuplicateEmail);
            }
            Err(e) => return Err(e.into()),
        }

        self.find_account_by_id(&id)
            .await?
            .ok_or_else(|| StoreError::CorruptRow(format!("account {} vanished after insert", id)))
    }

    async fn store_reset_token(
        &self,
        account_id: &str,
        token_hash: &str,
        expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> StoreResult<()> {
        sqlx::query(
            r#"
            UPDATE accounts
            SET reset_token_hash = ?,
                reset_token_expires_at = ?,
                reset_token_used_at = NULL,
                updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(token_hash)
        .bind(to_millis(expires_at))
        .bind(to_millis(now))
        .bind(account_id)
        .execute(&self.db)
        .await?;

        debug!(account_id = %account_id, "Reset token stored");
        Ok(())
    }

    async fn claim_reset_token(
        &self,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<ResetClaim>> {
        let now_ms = to_millis(now);
        let claim = sqlx::query_as::<_, ResetClaim>(
            r#"
            UPDATE accounts
            SET reset_token_used_at = ?, updated_at = ?
            WHERE reset_token_hash = ?
              AND reset_token_used_at IS NULL
              AND reset_token_expires_at > ?
            RETURNING id AS account_id, email, reset_token_hash AS token_hash
            "#,
        )
        .bind(now_ms)
        .bind(now_ms)
        .bind(token_hash)
        .bind(now_ms)
        .fetch_optional(&self.db)
        .await?;

        Ok(claim)
    }

    async fn release_reset_token(
        &self,
        account_id: &str,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<()> {
        sqlx::query(
            r#"
            UPDATE accounts
            SET reset_token_used_at = NULL, updated_at = ?
            WHERE id = ? AND reset_token_hash = ?
            "#,
        )
        .bind(to_millis(now))
        .bind(account_id)
        .bind(token_hash)
        .execute(&self.db)
        .await?;

        Ok(())
    }

    async fn finalize_reset_token(
        &self,
        account_id: &str,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<()> {
        // A newer token issued in the meantime must survive.
        sqlx::query(
            r#"
            UPDATE accounts
            SET reset_token_hash = NULL, reset_token_expires_at = NULL, updated_at = ?
            WHERE id = ? AND reset_token_hash = ?
            "#,
        )
        .bind(to_millis(now))
        .bind(account_id)
        .bind(token_hash)
        .execute(&self.db)
        .await?;

        Ok(())
    }

    async fn insert_oauth_session(&self, session: &OAuthSession) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO oauth_sessions
                (state, account_id, account_email, provider, code_verifier, created_at, expires_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&session.state)
        .bind(&session.account_id)
        .bind(&session.account_email)
        .bind(session.provider.as_str())
        .bind(&session.code_verifier)
        .bind(to_millis(session.created_at))
        .bind(to_millis(session.expires_at))
        .execute(&self.db)
        .await?;

        Ok(())
    }

    async fn take_oauth_session(&self, state: &str) -> StoreResult<Option<OAuthSession>> {
        let row = sqlx::query_as::<_, OAuthSessionRow>(
            r#"
            DELETE FROM oauth_sessions
            WHERE state = ?
            RETURNING state, account_id, account_email, provider, code_verifier, created_at, expires_at
            "#,
        )
        .bind(state)
        .fetch_optional(&self.db)
        .await?;

        row.map(|r| OAuthSession::try_from(r).map_err(StoreError::CorruptRow))
            .transpose()
    }

    async fn purge_expired_oauth_sessions(&self, now: DateTime<Utc>) -> StoreResult<u64> {
        let result = sqlx::query("DELETE FROM oauth_sessions WHERE expires_at <= ?")
            .bind(to_millis(now))
            .execute(&self.db)
            .await?;

        Ok(result.rows_affected())
    }

    async fn get_linkage(
        &self,
        account_id: &str,
        provider: LinkProvider,
    ) -> StoreResult<Option<ExternalLinkage>> {
        let row = sqlx::query_as::<_, ExternalLinkageRow>(&format!(
            "SELECT {} FROM external_linkages WHERE account_id = ? AND provider = ?",
            LINKAGE_COLUMNS
        ))
        .bind(account_id)
        .bind(provider.as_str())
        .fetch_optional(&self.db)
        .await?;

        row.map(|r| ExternalLinkage::try_from(r).map_err(StoreError::CorruptRow))
            .transpose()
    }

    async fn upsert_linkage(&self, linkage: &ExternalLinkage) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO external_linkages
                (account_id, provider, base_url, resource_id, resource_name, provider_email,
                 access_token_enc, refresh_token_enc, connected, expires_at, last_sync_at,
                 last_checked_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(account_id, provider) DO UPDATE SET
                base_url = excluded.base_url,
                resource_id = excluded.resource_id,
                resource_name = excluded.resource_name,
                provider_email = excluded.provider_email,
                access_token_enc = excluded.access_token_enc,
                refresh_token_enc = excluded.refresh_token_enc,
                connected = excluded.connected,
                expires_at = excluded.expires_at,
                last_sync_at = excluded.last_sync_at,
                last_checked_at = excluded.last_checked_at
            "#,
        )
        .bind(&linkage.account_id)
        .bind(linkage.provider.as_str())
        .bind(&linkage.base_url)
        .bind(&linkage.resource_id)
        .bind(linkage.resource_name.as_deref())
        .bind(linkage.provider_email.as_deref())
        .bind(&linkage.access_token_enc)
        .bind(linkage.refresh_token_enc.as_deref())
        .bind(i64::from(linkage.connected))
        .bind(linkage.expires_at.map(to_millis))
        .bind(linkage.last_sync_at.map(to_millis))
        .bind(linkage.last_checked_at.map(to_millis))
        .execute(&self.db)
        .await?;

        Ok(())
    }

    async fn update_linkage_tokens(
        &self,
        account_id: &str,
        provider: LinkProvider,
        access_token_enc: &str,
        refresh_token_enc: Option<&str>,
        expires_at: DateTime<Utc>,
    ) -> StoreResult<()> {
        // Providers that rotate refresh tokens return a new one; keep the old otherwise.
        sqlx::query(
            r#"
            UPDATE external_linkages
            SET access_token_enc = ?,
                refresh_token_enc = COALESCE(?, refresh_token_enc),
                expires_at = ?
            WHERE account_id = ? AND provider = ?
            "#,
        )
        .bind(access_token_enc)
        .bind(refresh_token_enc)
        .bind(to_millis(expires_at))
        .bind(account_id)
        .bind(provider.as_str())
        .execute(&self.db)
        .await?;

        Ok(())
    }

    async fn record_linkage_check(
        &self,
        account_id: &str,
        provider: LinkProvider,
        connected: bool,
        checked_at: DateTime<Utc>,
    ) -> StoreResult<()> {
        sqlx::query(
            r#"
            UPDATE external_linkages
            SET connected = ?, last_checked_at = ?
            WHERE account_id = ? AND provider = ?
            "#,
        )
        .bind(i64::from(connected))
        .bind(to_millis(checked_at))
        .bind(account_id)
        .bind(provider.as_str())
        .execute(&self.db)
        .await?;

        Ok(())
    }

    async fn delete_linkage(&self, account_id: &str, provider: LinkProvider) -> StoreResult<bool> {
        let result =
            sqlx::query("DELETE FROM external_linkages WHERE account_id = ? AND provider = ?")
                .bind(account_id)
                .bind(provider.as_str())
                .execute(&self.db)
                .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn set_billing_customer_id(
        &self,
        account_id: &str,
        customer_id: Option<&str>,
        now: DateTime<Utc>,
    ) -> StoreResult<bool> {
        let result = sqlx::query(
            "UPDATE accounts SET billing_customer_id = ?, updated_at = ? WHERE id = ?",
        )
        .bind(customer_id)
        .bind(to_millis(now))
        .bind(account_id)
        .execute(&self.db)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}
