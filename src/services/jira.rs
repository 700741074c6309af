// src/services/jira.rs
//! Atlassian OAuth 2.0 (3LO) client: token endpoint, accessible resources and
//! the Jira "myself" endpoint used as a liveness check.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error};

use crate::common::config::JiraConfig;

#[derive(Debug, Error)]
pub enum JiraError {
    #[error("Jira request timed out")]
    Timeout,

    #[error("HTTP request failed: {0}")]
    RequestFailed(String),

    #[error("OAuth token request failed (HTTP {status}): {body}")]
    OAuthFailed { status: u16, body: String },

    #[error("Access token rejected (HTTP {0})")]
    Unauthorized(u16),

    #[error("Unexpected Jira response (HTTP {0})")]
    UnexpectedStatus(u16),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl From<reqwest::Error> for JiraError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            JiraError::Timeout
        } else if e.is_decode() {
            JiraError::SerializationError(e.to_string())
        } else {
            JiraError::RequestFailed(e.to_string())
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_in: i64,
    pub token_type: Option<String>,
    pub scope: Option<String>,
}

/// One Jira site the user granted access to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessibleResource {
    pub id: String,
    pub url: String,
    pub name: String,
    #[serde(default)]
    pub scopes: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JiraUser {
    pub account_id: String,
    pub email_address: Option<String>,
    pub display_name: Option<String>,
}

#[async_trait]
pub trait JiraOAuthClient: Send + Sync {
    async fn exchange_code(&self, code: &str, code_verifier: &str)
        -> Result<TokenResponse, JiraError>;

    async fn refresh_token(&self, refresh_token: &str) -> Result<TokenResponse, JiraError>;

    async fn accessible_resources(
        &self,
        access_token: &str,
    ) -> Result<Vec<AccessibleResource>, JiraError>;

    /// `GET /rest/api/3/myself`; 401/403 map to [`JiraError::Unauthorized`].
    async fn myself(&self, access_token: &str, cloud_id: &str) -> Result<JiraUser, JiraError>;
}

#[derive(Debug, Clone)]
pub struct HttpJiraClient {
    client: Client,
    config: JiraConfig,
}

impl HttpJiraClient {
    pub fn new(client: Client, config: JiraConfig) -> Self {
        Self { client, config }
    }

    async fn token_request(&self, body: serde_json::Value) -> Result<TokenResponse, JiraError> {
        let response = self
            .client
            .post(format!("{}/oauth/token", self.config.auth_base_url))
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            error!(status = %status, error = %error_text, "Jira token request failed");
            return Err(JiraError::OAuthFailed {
                status: status.as_u16(),
                body: error_text,
            });
        }

        Ok(response.json::<TokenResponse>().await?)
    }
}

#[async_trait]
impl JiraOAuthClient for HttpJiraClient {
    async fn exchange_code(
        &self,
        code: &str,
        code_verifier: &str,
    ) -> Result<TokenResponse, JiraError> {
        debug!("Exchanging authorization code for Jira tokens");
        self.token_request(serde_json::json!({
            "grant_type": "authorization_code",
            "client_id": self.config.client_id,
            "client_secret": self.config.client_secret,
            "code": code,
            "redirect_uri": self.config.redirect_uri,
            "code_verifier": code_verifier,
        }))
        .await
    }

    async fn refresh_token(&self, refresh_token: &str) -> Result<TokenResponse, JiraError> {
        debug!("Refreshing Jira access token");
        self.token_request(serde_json::json!({
            "grant_type": "refresh_token",
            "client_id": self.config.client_id,
            "client_secret": self.config.client_secret,
            "refresh_token": refresh_token,
        }))
        .await
    }

    async fn accessible_resources(
        &self,
        access_token: &str,
    ) -> Result<Vec<AccessibleResource>, JiraError> {
        let response = self
            .client
            .get(format!(
                "{}/oauth/token/accessible-resources",
                self.config.api_base_url
            ))
            .bearer_auth(access_token)
            .send()
            .await?;

        let status = response.status();
        if matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) {
            return Err(JiraError::Unauthorized(status.as_u16()));
        }
        if !status.is_success() {
            return Err(JiraError::UnexpectedStatus(status.as_u16()));
        }

        Ok(response.json::<Vec<AccessibleResource>>().await?)
    }

    async fn myself(&self, access_token: &str, cloud_id: &str) -> Result<JiraUser, JiraError> {
        let response = self
            .client
            .get(format!(
                "{}/ex/jira/{}/rest/api/3/myself",
                self.config.api_base_url,
                urlencoding::encode(cloud_id)
            ))
            .bearer_auth(access_token)
            .header("Accept", "application/json")
            .send()
            .await?;

        let status = response.status();
        if matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) {
            return Err(JiraError::Unauthorized(status.as_u16()));
        }
        if !status.is_success() {
            return Err(JiraError::UnexpectedStatus(status.as_u16()));
        }

        Ok(response.json::<JiraUser>().await?)
    }
}
