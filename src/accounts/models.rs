//! Account and linkage data models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use std::str::FromStr;

/// Unix milliseconds, the on-disk timestamp format.
pub fn to_millis(at: DateTime<Utc>) -> i64 {
    at.timestamp_millis()
}

pub fn from_millis(ms: i64) -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp_millis(ms).unwrap_or_default()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Client,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Client => "client",
            Role::Admin => "admin",
        }
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "client" => Ok(Role::Client),
            "admin" => Ok(Role::Admin),
            other => Err(format!("unknown role '{}'", other)),
        }
    }
}

/// Portal account. The login credential itself lives with the identity
/// provider and never appears here.
#[derive(Debug, Clone, Serialize)]
pub struct Account {
    pub id: String,
    pub email: String,
    pub display_name: Option<String>,
    pub role: Role,
    pub billing_customer_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Account {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

#[derive(Debug, Clone)]
pub struct NewAccount {
    pub email: String,
    pub display_name: Option<String>,
    pub role: Role,
}

#[derive(Debug, FromRow)]
pub(crate) struct AccountRow {
    pub id: String,
    pub email: String,
    pub display_name: Option<String>,
    pub role: String,
    pub billing_customer_id: Option<String>,
    pub created_at: i64,
}

impl TryFrom<AccountRow> for Account {
    type Error = String;

    fn try_from(row: AccountRow) -> Result<Self, Self::Error> {
        Ok(Account {
            role: row.role.parse()?,
            id: row.id,
            email: row.email,
            display_name: row.display_name,
            billing_customer_id: row.billing_customer_id,
            created_at: from_millis(row.created_at),
        })
    }
}

/// Result of atomically claiming a reset token.
#[derive(Debug, Clone, FromRow)]
pub struct ResetClaim {
    pub account_id: String,
    pub email: String,
    pub token_hash: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkProvider {
    Jira,
}

impl LinkProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            LinkProvider::Jira => "jira",
        }
    }
}

impl fmt::Display for LinkProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LinkProvider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "jira" => Ok(LinkProvider::Jira),
            other => Err(format!("unknown provider '{}'", other)),
        }
    }
}

/// Pending OAuth handshake keyed by `state`.
#[derive(Debug, Clone)]
pub struct OAuthSession {
    pub state: String,
    pub account_id: String,
    pub account_email: String,
    pub provider: LinkProvider,
    pub code_verifier: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl OAuthSession {
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }
}

#[derive(Debug, FromRow)]
pub(crate) struct OAuthSessionRow {
    pub state: String,
    pub account_id: String,
    pub account_email: String,
    pub provider: String,
    pub code_verifier: String,
    pub created_at: i64,
    pub expires_at: i64,
}

impl TryFrom<OAuthSessionRow> for OAuthSession {
    type Error = String;

    fn try_from(row: OAuthSessionRow) -> Result<Self, Self::Error> {
        Ok(OAuthSession {
            provider: row.provider.parse()?,
            state: row.state,
            account_id: row.account_id,
            account_email: row.account_email,
            code_verifier: row.code_verifier,
            created_at: from_millis(row.created_at),
            expires_at: from_millis(row.expires_at),
        })
    }
}

/// Stored link between an account and an external provider. Token fields
/// hold ciphertext produced by the token cipher, never plaintext.
#[derive(Debug, Clone)]
pub struct ExternalLinkage {
    pub account_id: String,
    pub provider: LinkProvider,
    pub base_url: String,
    pub resource_id: String,
    pub resource_name: Option<String>,
    pub provider_email: Option<String>,
    pub access_token_enc: String,
    pub refresh_token_enc: Option<String>,
    pub connected: bool,
    pub expires_at: Option<DateTime<Utc>>,
    pub last_sync_at: Option<DateTime<Utc>>,
    pub last_checked_at: Option<DateTime<Utc>>,
}

impl ExternalLinkage {
    pub fn is_token_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map_or(false, |at| now >= at)
    }
}

#[derive(Debug, FromRow)]
pub(crate) struct ExternalLinkageRow {
    pub account_id: String,
    pub provider: String,
    pub base_url: String,
    pub resource_id: String,
    pub resource_name: Option<String>,
    pub provider_email: Option<String>,
    pub access_token_enc: String,
    pub refresh_token_enc: Option<String>,
    pub connected: i64,
    pub expires_at: Option<i64>,
    pub last_sync_at: Option<i64>,
    pub last_checked_at: Option<i64>,
}

impl TryFrom<ExternalLinkageRow> for ExternalLinkage {
    type Error = String;

    fn try_from(row: ExternalLinkageRow) -> Result<Self, Self::Error> {
        Ok(ExternalLinkage {
            provider: row.provider.parse()?,
            account_id: row.account_id,
            base_url: row.base_url,
            resource_id: row.resource_id,
            resource_name: row.resource_name,
            provider_email: row.provider_email,
            access_token_enc: row.access_token_enc,
            refresh_token_enc: row.refresh_token_enc,
            connected: row.connected != 0,
            expires_at: row.expires_at.map(from_millis),
            last_sync_at: row.last_sync_at.map(from_millis),
            last_checked_at: row.last_checked_at.map(from_millis),
        })
    }
}
