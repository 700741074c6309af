//! Jira linking request/response models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::accounts::ExternalLinkage;

/// Response of `POST /api/integrations/jira/connect`
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectResponse {
    pub auth_url: String,
    pub state: String,
    /// Only present when the session could not be persisted; the client must
    /// hand it back on the authenticated callback.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code_verifier: Option<String>,
    /// Sealed binding of `state` to the caller and verifier, sent with it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback_ticket: Option<String>,
    pub fallback: bool,
}

impl std::fmt::Debug for ConnectResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectResponse")
            .field("auth_url", &self.auth_url)
            .field("fallback", &self.fallback)
            .finish_non_exhaustive()
    }
}

/// Query string Atlassian appends to the redirect URI.
#[derive(Debug, Default, Clone, Deserialize)]
pub struct CallbackQuery {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

/// Body of the authenticated `POST /api/integrations/jira/callback`
#[derive(Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallbackPayload {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub code_verifier: Option<String>,
    pub fallback_ticket: Option<String>,
}

impl std::fmt::Debug for CallbackPayload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackPayload")
            .field("error", &self.error)
            .field("has_code_verifier", &self.code_verifier.is_some())
            .field("has_fallback_ticket", &self.fallback_ticket.is_some())
            .finish_non_exhaustive()
    }
}

/// The authenticated account completing a callback, plus the verifier and
/// ticket it holds if session persistence failed at initiate.
#[derive(Clone, Default)]
pub struct CallbackCaller {
    pub account_id: String,
    pub code_verifier: Option<String>,
    pub fallback_ticket: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CallbackResponse {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Non-secret view of a linkage.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionStatus {
    pub linked: bool,
    pub connected: bool,
    pub site_url: Option<String>,
    pub site_name: Option<String>,
    pub provider_email: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub last_sync_at: Option<DateTime<Utc>>,
    pub last_checked_at: Option<DateTime<Utc>>,
}

impl ConnectionStatus {
    pub fn not_linked() -> Self {
        Self {
            linked: false,
            connected: false,
            site_url: None,
            site_name: None,
            provider_email: None,
            expires_at: None,
            last_sync_at: None,
            last_checked_at: None,
        }
    }
}

impl From<&ExternalLinkage> for ConnectionStatus {
    fn from(linkage: &ExternalLinkage) -> Self {
        Self {
            linked: true,
            connected: linkage.connected,
            site_url: Some(linkage.base_url.clone()),
            site_name: linkage.resource_name.clone(),
            provider_email: linkage.provider_email.clone(),
            expires_at: linkage.expires_at,
            last_sync_at: linkage.last_sync_at,
            last_checked_at: linkage.last_checked_at,
        }
    }
}
