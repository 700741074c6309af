// src/services/identity.rs
//! Client for the hosted auth platform that owns login credentials.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use thiserror::Error;
use tracing::{debug, error};

use crate::common::config::IdentityConfig;

#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("Identity provider timed out")]
    Timeout,

    #[error("Identity provider request failed: {0}")]
    RequestFailed(String),

    #[error("Identity provider rejected the update (HTTP {status}): {body}")]
    Rejected { status: u16, body: String },

    #[error("Account not found at identity provider")]
    UnknownAccount,
}

impl From<reqwest::Error> for IdentityError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            IdentityError::Timeout
        } else {
            IdentityError::RequestFailed(e.to_string())
        }
    }
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Replace the login credential for `account_id`.
    async fn set_credential(
        &self,
        account_id: &str,
        new_credential: &str,
    ) -> Result<(), IdentityError>;
}

/// Talks to the platform's admin user API with the service-role key.
#[derive(Debug, Clone)]
pub struct HostedIdentityProvider {
    client: Client,
    config: IdentityConfig,
}

impl HostedIdentityProvider {
    pub fn new(client: Client, config: IdentityConfig) -> Self {
        Self { client, config }
    }
}

#[async_trait]
impl IdentityProvider for HostedIdentityProvider {
    async fn set_credential(
        &self,
        account_id: &str,
        new_credential: &str,
    ) -> Result<(), IdentityError> {
        let url = format!(
            "{}/admin/users/{}",
            self.config.api_url,
            urlencoding::encode(account_id)
        );

        debug!(account_id = %account_id, "Updating credential at identity provider");

        let response = self
            .client
            .put(&url)
            .bearer_auth(&self.config.service_key)
            .header("apikey", &self.config.service_key)
            .json(&serde_json::json!({ "password": new_credential }))
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        if status == StatusCode::NOT_FOUND {
            return Err(IdentityError::UnknownAccount);
        }

        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        error!(
            status = %status,
            account_id = %account_id,
            "Identity provider rejected credential update"
        );
        Err(IdentityError::Rejected {
            status: status.as_u16(),
            body,
        })
    }
}
