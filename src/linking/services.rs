use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, warn};

use super::models::{CallbackCaller, CallbackQuery, ConnectResponse, ConnectionStatus};
use super::pkce::{
    build_authorization_url, compute_code_challenge, generate_code_verifier, generate_state,
};
use super::ticket::FallbackTicket;
use crate::accounts::{Account, CredentialStore, ExternalLinkage, LinkProvider, OAuthSession};
use crate::common::config::JiraConfig;
use crate::common::{safe_email_log, safe_token_log, ApiError, Clock};
use crate::services::jira::{JiraError, TokenResponse};
use crate::services::{JiraOAuthClient, TokenCipher};

const PROVIDER: LinkProvider = LinkProvider::Jira;

#[derive(Debug, Error)]
pub enum LinkError {
    #[error("Authorization was denied: {0}")]
    ProviderDenied(String),

    /// Unknown, expired, replayed and foreign `state` values all map here.
    #[error("Linking session is invalid or has expired")]
    InvalidOrExpiredSession,

    #[error("Token exchange failed: {0}")]
    TokenExchangeFailed(#[source] JiraError),

    #[error("No Jira sites are accessible with this grant")]
    NoAccessibleResources,

    #[error("Failed to store the linkage: {0}")]
    PersistenceFailed(String),

    #[error("No Jira account is linked")]
    NotLinked,

    #[error("Jira is unavailable: {0}")]
    UpstreamUnavailable(#[source] JiraError),
}

impl LinkError {
    /// Stable identifier returned to the client alongside the generic message.
    pub fn kind(&self) -> &'static str {
        match self {
            LinkError::ProviderDenied(_) => "provider_denied",
            LinkError::InvalidOrExpiredSession => "invalid_or_expired_session",
            LinkError::TokenExchangeFailed(_) => "token_exchange_failed",
            LinkError::NoAccessibleResources => "no_accessible_resources",
            LinkError::PersistenceFailed(_) => "persistence_failed",
            LinkError::NotLinked => "not_linked",
            LinkError::UpstreamUnavailable(_) => "upstream_unavailable",
        }
    }
}

impl From<LinkError> for ApiError {
    fn from(err: LinkError) -> Self {
        match err {
            LinkError::NotLinked => ApiError::NotFound(err.to_string()),
            LinkError::InvalidOrExpiredSession | LinkError::ProviderDenied(_) => {
                ApiError::BadRequest(err.to_string())
            }
            LinkError::NoAccessibleResources => ApiError::BadRequest(err.to_string()),
            LinkError::TokenExchangeFailed(_) => {
                ApiError::BadGateway("Jira account linking failed".to_string())
            }
            LinkError::UpstreamUnavailable(_) => {
                ApiError::ServiceUnavailable("Jira is unavailable, try again".to_string())
            }
            LinkError::PersistenceFailed(_) => {
                ApiError::InternalServer("Jira account linking failed".to_string())
            }
        }
    }
}

/// Longest access-token lifetime recorded for a linkage.
const MAX_TOKEN_LIFETIME_SECS: i64 = 86_400 * 365;

/// Provider-reported `expires_in`, bounded so the expiry is representable.
fn token_lifetime(expires_in: i64) -> Duration {
    Duration::seconds(expires_in.clamp(0, MAX_TOKEN_LIFETIME_SECS))
}

/// Associated data binding a sealed token to its owner.
fn token_context(account_id: &str) -> String {
    format!("{}:{}", account_id, PROVIDER)
}

/// Jira account linking: PKCE handshake, token custody and liveness checks.
pub struct JiraLinkService {
    store: Arc<dyn CredentialStore>,
    client: Arc<dyn JiraOAuthClient>,
    cipher: Arc<TokenCipher>,
    clock: Arc<dyn Clock>,
    config: JiraConfig,
}

impl JiraLinkService {
    pub fn new(
        store: Arc<dyn CredentialStore>,
        client: Arc<dyn JiraOAuthClient>,
        cipher: Arc<TokenCipher>,
        clock: Arc<dyn Clock>,
        config: JiraConfig,
    ) -> Self {
        Self {
            store,
            client,
            cipher,
            clock,
            config,
        }
    }

    // ============================================================================
    // Handshake
    // ============================================================================

    pub async fn initiate(&self, account: &Account) -> Result<ConnectResponse, LinkError> {
        let code_verifier = generate_code_verifier();
        let code_challenge = compute_code_challenge(&code_verifier);
        let state = generate_state();
        let now = self.clock.now();

        let session = OAuthSession {
            state: state.clone(),
            account_id: account.id.clone(),
            account_email: account.email.clone(),
            provider: PROVIDER,
            code_verifier: code_verifier.clone(),
            created_at: now,
            expires_at: now + Duration::minutes(self.config.session_ttl_minutes),
        };

        let fallback = match self.store.insert_oauth_session(&session).await {
            Ok(()) => false,
            Err(e) => {
                warn!(
                    error = %e,
                    account_id = %account.id,
                    "Failed to persist OAuth session, returning verifier to client"
                );
                true
            }
        };

        info!(
            account_id = %account.id,
            email = %safe_email_log(&account.email),
            state = %safe_token_log(&state),
            "Jira authorization initiated"
        );

        let fallback_ticket = if fallback {
            let ticket = FallbackTicket::issue(
                &self.cipher,
                &state,
                &account.id,
                &code_verifier,
                session.expires_at,
            )
            .map_err(|e| LinkError::PersistenceFailed(e.to_string()))?;
            Some(ticket)
        } else {
            None
        };

        Ok(ConnectResponse {
            auth_url: build_authorization_url(&self.config, &state, &code_challenge),
            state,
            code_verifier: fallback.then_some(code_verifier),
            fallback_ticket,
            fallback,
        })
    }

    /// Finishes the handshake for the redirect parameters in `params`.
    ///
    /// The session for `state` is consumed before anything else, so a second
    /// call with the same `state` always fails. `caller` is set on the
    /// authenticated callback: an existing session must belong to it. Without
    /// a session row its client-held verifier is used only under a fallback
    /// ticket issued for the same state, account and verifier.
    pub async fn complete_callback(
        &self,
        params: CallbackQuery,
        caller: Option<CallbackCaller>,
    ) -> Result<ConnectionStatus, LinkError> {
        let state = params
            .state
            .filter(|s| !s.trim().is_empty())
            .ok_or(LinkError::InvalidOrExpiredSession)?;

        let session = self.store.take_oauth_session(&state).await.map_err(|e| {
            error!(error = %e, state = %safe_token_log(&state), "Failed to load OAuth session");
            LinkError::PersistenceFailed(e.to_string())
        })?;

        if let Some(provider_error) = params.error {
            warn!(
                state = %safe_token_log(&state),
                error = %provider_error,
                description = ?params.error_description,
                "Jira authorization denied by provider"
            );
            return Err(LinkError::ProviderDenied(provider_error));
        }

        let now = self.clock.now();
        let (account_id, code_verifier) = match (session, caller) {
            (Some(session), caller) => {
                if !session.is_live(now) {
                    warn!(state = %safe_token_log(&state), "OAuth session expired");
                    return Err(LinkError::InvalidOrExpiredSession);
                }
                if caller.is_some_and(|c| c.account_id != session.account_id) {
                    warn!(
                        state = %safe_token_log(&state),
                        "OAuth session belongs to a different account"
                    );
                    return Err(LinkError::InvalidOrExpiredSession);
                }
                (session.account_id, session.code_verifier)
            }
            (
                None,
                Some(CallbackCaller {
                    account_id,
                    code_verifier: Some(code_verifier),
                    fallback_ticket: Some(ticket),
                }),
            ) => {
                let vouched = FallbackTicket::open(&self.cipher, &ticket)
                    .is_some_and(|t| t.vouches_for(&state, &account_id, &code_verifier, now));
                if !vouched {
                    warn!(
                        account_id = %account_id,
                        state = %safe_token_log(&state),
                        "Fallback ticket rejected for OAuth state"
                    );
                    return Err(LinkError::InvalidOrExpiredSession);
                }
                info!(
                    account_id = %account_id,
                    state = %safe_token_log(&state),
                    "No OAuth session found, completing with client-held verifier"
                );
                (account_id, code_verifier)
            }
            (None, _) => {
                warn!(state = %safe_token_log(&state), "Unknown or replayed OAuth state");
                return Err(LinkError::InvalidOrExpiredSession);
            }
        };

        let code = params
            .code
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| LinkError::ProviderDenied("missing_code".to_string()))?;

        let tokens = self
            .client
            .exchange_code(&code, &code_verifier)
            .await
            .map_err(|e| {
                error!(error = %e, account_id = %account_id, "Jira code exchange failed");
                LinkError::TokenExchangeFailed(e)
            })?;

        let resources = self
            .client
            .accessible_resources(&tokens.access_token)
            .await
            .map_err(|e| {
                error!(error = %e, account_id = %account_id, "Failed to list Jira sites");
                LinkError::TokenExchangeFailed(e)
            })?;

        if resources.len() > 1 {
            info!(
                account_id = %account_id,
                count = resources.len(),
                "Multiple Jira sites granted, linking the first"
            );
        }
        let resource = resources.into_iter().next().ok_or_else(|| {
            warn!(account_id = %account_id, "Jira grant has no accessible sites");
            LinkError::NoAccessibleResources
        })?;

        let provider_email = match self.client.myself(&tokens.access_token, &resource.id).await {
            Ok(user) => user.email_address,
            Err(e) => {
                warn!(error = %e, account_id = %account_id, "Could not read Jira profile");
                None
            }
        };

        let context = token_context(&account_id);
        let access_token_enc = self
            .cipher
            .seal(&tokens.access_token, &context)
            .map_err(|e| LinkError::PersistenceFailed(e.to_string()))?;
        let refresh_token_enc = tokens
            .refresh_token
            .as_deref()
            .map(|t| self.cipher.seal(t, &context))
            .transpose()
            .map_err(|e| LinkError::PersistenceFailed(e.to_string()))?;

        let linkage = ExternalLinkage {
            account_id: account_id.clone(),
            provider: PROVIDER,
            base_url: resource.url,
            resource_id: resource.id,
            resource_name: Some(resource.name),
            provider_email,
            access_token_enc,
            refresh_token_enc,
            connected: true,
            expires_at: Some(now + token_lifetime(tokens.expires_in)),
            last_sync_at: Some(now),
            last_checked_at: Some(now),
        };

        self.store.upsert_linkage(&linkage).await.map_err(|e| {
            error!(error = %e, account_id = %account_id, "Failed to store Jira linkage");
            LinkError::PersistenceFailed(e.to_string())
        })?;

        info!(
            account_id = %account_id,
            site = %linkage.base_url,
            "Jira account linked"
        );
        Ok(ConnectionStatus::from(&linkage))
    }

    // ============================================================================
    // Linkage management
    // ============================================================================

    /// Checks Jira with the stored token. A rejected token marks the linkage
    /// disconnected; transport or server errors leave it untouched.
    pub async fn verify_live_connection(
        &self,
        account_id: &str,
    ) -> Result<ConnectionStatus, LinkError> {
        let mut linkage = self.load_linkage(account_id).await?;
        let context = token_context(account_id);
        let now = self.clock.now();

        let mut access_token = match self.cipher.open(&linkage.access_token_enc, &context) {
            Ok(token) => token,
            Err(e) => {
                error!(error = %e, account_id = %account_id, "Stored Jira token cannot be decrypted");
                return self.mark_disconnected(linkage, now).await;
            }
        };

        if linkage.is_token_expired(now) {
            if let Some(refresh_enc) = linkage.refresh_token_enc.clone() {
                let refresh_token = match self.cipher.open(&refresh_enc, &context) {
                    Ok(token) => token,
                    Err(e) => {
                        error!(error = %e, account_id = %account_id, "Stored Jira refresh token cannot be decrypted");
                        return self.mark_disconnected(linkage, now).await;
                    }
                };

                match self.client.refresh_token(&refresh_token).await {
                    Ok(tokens) => {
                        access_token = self
                            .store_refreshed_tokens(&mut linkage, &context, tokens, now)
                            .await?;
                    }
                    Err(JiraError::OAuthFailed { status, .. }) if status < 500 => {
                        warn!(account_id = %account_id, status, "Jira refresh token rejected");
                        return self.mark_disconnected(linkage, now).await;
                    }
                    Err(e) => {
                        error!(error = %e, account_id = %account_id, "Jira token refresh failed");
                        return Err(LinkError::UpstreamUnavailable(e));
                    }
                }
            }
        }

        match self.client.myself(&access_token, &linkage.resource_id).await {
            Ok(_) => {
                self.store
                    .record_linkage_check(account_id, PROVIDER, linkage.connected, now)
                    .await
                    .map_err(|e| LinkError::PersistenceFailed(e.to_string()))?;
                linkage.last_checked_at = Some(now);
                info!(account_id = %account_id, "Jira connection verified");
                Ok(ConnectionStatus::from(&linkage))
            }
            Err(JiraError::Unauthorized(status)) => {
                warn!(account_id = %account_id, status, "Jira rejected stored token");
                self.mark_disconnected(linkage, now).await
            }
            Err(e) => {
                error!(error = %e, account_id = %account_id, "Jira connection test failed");
                Err(LinkError::UpstreamUnavailable(e))
            }
        }
    }

    pub async fn connection_status(&self, account_id: &str) -> Result<ConnectionStatus, LinkError> {
        match self.load_linkage(account_id).await {
            Ok(linkage) => Ok(ConnectionStatus::from(&linkage)),
            Err(LinkError::NotLinked) => Ok(ConnectionStatus::not_linked()),
            Err(e) => Err(e),
        }
    }

    pub async fn disconnect(&self, account_id: &str) -> Result<(), LinkError> {
        let removed = self
            .store
            .delete_linkage(account_id, PROVIDER)
            .await
            .map_err(|e| LinkError::PersistenceFailed(e.to_string()))?;
        if !removed {
            return Err(LinkError::NotLinked);
        }
        info!(account_id = %account_id, "Jira account unlinked");
        Ok(())
    }

    pub async fn purge_expired_sessions(&self) -> Result<u64, LinkError> {
        self.store
            .purge_expired_oauth_sessions(self.clock.now())
            .await
            .map_err(|e| LinkError::PersistenceFailed(e.to_string()))
    }

    /// Deletes expired OAuth sessions every five minutes.
    pub fn start_session_purge_task(service: Arc<JiraLinkService>) {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(tokio::time::Duration::from_secs(300));
            loop {
                interval.tick().await;
                match service.purge_expired_sessions().await {
                    Ok(0) => {}
                    Ok(purged) => info!(purged, "Purged expired OAuth sessions"),
                    Err(e) => error!(error = %e, "Failed to purge expired OAuth sessions"),
                }
            }
        });
    }

    async fn load_linkage(&self, account_id: &str) -> Result<ExternalLinkage, LinkError> {
        self.store
            .get_linkage(account_id, PROVIDER)
            .await
            .map_err(|e| LinkError::PersistenceFailed(e.to_string()))?
            .ok_or(LinkError::NotLinked)
    }

    async fn mark_disconnected(
        &self,
        mut linkage: ExternalLinkage,
        now: DateTime<Utc>,
    ) -> Result<ConnectionStatus, LinkError> {
        self.store
            .record_linkage_check(&linkage.account_id, PROVIDER, false, now)
            .await
            .map_err(|e| LinkError::PersistenceFailed(e.to_string()))?;
        linkage.connected = false;
        linkage.last_checked_at = Some(now);
        Ok(ConnectionStatus::from(&linkage))
    }

    async fn store_refreshed_tokens(
        &self,
        linkage: &mut ExternalLinkage,
        context: &str,
        tokens: TokenResponse,
        now: DateTime<Utc>,
    ) -> Result<String, LinkError> {
        let access_enc = self
            .cipher
            .seal(&tokens.access_token, context)
            .map_err(|e| LinkError::PersistenceFailed(e.to_string()))?;
        let refresh_enc = tokens
            .refresh_token
            .as_deref()
            .map(|t| self.cipher.seal(t, context))
            .transpose()
            .map_err(|e| LinkError::PersistenceFailed(e.to_string()))?;
        let expires_at = now + token_lifetime(tokens.expires_in);

        self.store
            .update_linkage_tokens(
                &linkage.account_id,
                PROVIDER,
                &access_enc,
                refresh_enc.as_deref(),
                expires_at,
            )
            .await
            .map_err(|e| LinkError::PersistenceFailed(e.to_string()))?;

        linkage.access_token_enc = access_enc;
        if refresh_enc.is_some() {
            linkage.refresh_token_enc = refresh_enc;
        }
        linkage.expires_at = Some(expires_at);
        info!(account_id = %linkage.account_id, "Jira access token refreshed");
        Ok(tokens.access_token)
    }
}
