use chrono::Duration;
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::accounts::{CredentialStore, StoreError};
use crate::common::config::ResetConfig;
use crate::common::validation::is_valid_email;
use crate::common::{normalize_email, safe_email_log, ApiError, Clock};
use crate::services::email::{password_changed_email, password_reset_email};
use crate::services::identity::IdentityError;
use crate::services::token_codec::{generate_secret, hash_secret};
use crate::services::{IdentityProvider, NotificationSender, OutgoingEmail};

#[derive(Debug, Error)]
pub enum ResetError {
    #[error("A valid email address is required")]
    InvalidEmail,

    /// Unknown, expired, superseded and already-used tokens are indistinguishable.
    #[error("This reset link is invalid or has expired")]
    InvalidOrExpiredToken,

    #[error("Password must be at least {0} characters")]
    WeakPassword(usize),

    #[error("Credential update failed: {0}")]
    CredentialUpdateFailed(#[source] IdentityError),

    #[error("Credential store error: {0}")]
    Store(#[from] StoreError),
}

impl From<ResetError> for ApiError {
    fn from(err: ResetError) -> Self {
        match err {
            ResetError::InvalidEmail => ApiError::BadRequest(err.to_string()),
            ResetError::InvalidOrExpiredToken => ApiError::InvalidOrExpiredToken,
            ResetError::WeakPassword(_) => ApiError::WeakPassword(err.to_string()),
            ResetError::CredentialUpdateFailed(IdentityError::Timeout) => {
                ApiError::ServiceUnavailable(
                    "Password could not be updated right now, please try again".to_string(),
                )
            }
            ResetError::CredentialUpdateFailed(_) => ApiError::BadGateway(
                "Password could not be updated right now, please try again".to_string(),
            ),
            ResetError::Store(e) => e.into(),
        }
    }
}

/// Issues and redeems password reset tokens.
pub struct PasswordResetService {
    store: Arc<dyn CredentialStore>,
    notifier: Arc<dyn NotificationSender>,
    identity: Arc<dyn IdentityProvider>,
    clock: Arc<dyn Clock>,
    config: ResetConfig,
}

impl PasswordResetService {
    pub fn new(
        store: Arc<dyn CredentialStore>,
        notifier: Arc<dyn NotificationSender>,
        identity: Arc<dyn IdentityProvider>,
        clock: Arc<dyn Clock>,
        config: ResetConfig,
    ) -> Self {
        Self {
            store,
            notifier,
            identity,
            clock,
            config,
        }
    }

    /// Starts a reset for `email`.
    ///
    /// Returns `Ok(())` whether or not an account exists, so callers cannot
    /// discover registered addresses. Only a syntactically malformed address
    /// is rejected.
    pub async fn request_reset(&self, email: &str) -> Result<(), ResetError> {
        let email = normalize_email(email);
        if !is_valid_email(&email) {
            return Err(ResetError::InvalidEmail);
        }

        let account = match self.store.find_account_by_email(&email).await {
            Ok(account) => account,
            Err(e) => {
                error!(error = %e, email = %safe_email_log(&email), "Account lookup failed during reset request");
                return Ok(());
            }
        };

        let secret = generate_secret();
        let token_hash = hash_secret(&secret);
        let now = self.clock.now();
        let expires_at = now + Duration::minutes(self.config.token_ttl_minutes);

        // Unknown addresses issue the same UPDATE against an id matching no row.
        let target_id = match &account {
            Some(account) => account.id.clone(),
            None => Uuid::new_v4().to_string(),
        };
        if let Err(e) = self
            .store
            .store_reset_token(&target_id, &token_hash, expires_at, now)
            .await
        {
            error!(error = %e, account_id = %target_id, "Failed to store reset token");
            return Ok(());
        }

        let Some(account) = account else {
            info!(email = %safe_email_log(&email), "Password reset requested for unknown email");
            return Ok(());
        };

        let message = password_reset_email(
            &account.email,
            account.display_name.as_deref(),
            &self.reset_url(&secret),
            self.config.token_ttl_minutes,
        );
        self.dispatch(message).await;

        info!(account_id = %account.id, "Password reset token issued");
        Ok(())
    }

    /// Redeems `secret` and sets `new_password` as the account's credential.
    pub async fn confirm_reset(&self, secret: &str, new_password: &str) -> Result<(), ResetError> {
        if new_password.chars().count() < self.config.min_password_length {
            return Err(ResetError::WeakPassword(self.config.min_password_length));
        }

        let secret = secret.trim();
        if secret.is_empty() {
            return Err(ResetError::InvalidOrExpiredToken);
        }

        let digest = hash_secret(secret);
        let now = self.clock.now();

        let claim = self
            .store
            .claim_reset_token(&digest, now)
            .await?
            .ok_or(ResetError::InvalidOrExpiredToken)?;

        if let Err(e) = self
            .identity
            .set_credential(&claim.account_id, new_password)
            .await
        {
            error!(
                error = %e,
                account_id = %claim.account_id,
                "Identity provider rejected credential update, releasing reset token"
            );
            self.release(&claim.account_id, &claim.token_hash).await;
            return Err(ResetError::CredentialUpdateFailed(e));
        }

        // used_at is already set, so a failure here cannot reopen the token.
        if let Err(e) = self
            .store
            .finalize_reset_token(&claim.account_id, &claim.token_hash, self.clock.now())
            .await
        {
            warn!(error = %e, account_id = %claim.account_id, "Failed to clear consumed reset token");
        }

        info!(account_id = %claim.account_id, "Password reset completed");
        self.dispatch(password_changed_email(&claim.email, None)).await;
        Ok(())
    }

    fn reset_url(&self, secret: &str) -> String {
        format!(
            "{}/reset-password?token={}",
            self.config.portal_base_url.trim_end_matches('/'),
            urlencoding::encode(secret)
        )
    }

    async fn release(&self, account_id: &str, token_hash: &str) {
        if let Err(e) = self
            .store
            .release_reset_token(account_id, token_hash, self.clock.now())
            .await
        {
            error!(error = %e, account_id = %account_id, "Failed to release reset token claim");
        }
    }

    async fn dispatch(&self, message: OutgoingEmail) {
        let notifier = self.notifier.clone();
        let send = async move {
            let to = safe_email_log(&message.to);
            let subject = message.subject.clone();
            if let Err(e) = notifier.send(message).await {
                error!(error = %e, to = %to, subject = %subject, "Failed to send password reset email");
            }
        };

        if self.config.background_dispatch {
            tokio::spawn(send);
        } else {
            send.await;
        }
    }
}
