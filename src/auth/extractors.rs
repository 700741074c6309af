//! Authentication extractors for Axum

use async_trait::async_trait;
use axum::{
    extract::{Extension, FromRequestParts},
    http::{header::AUTHORIZATION, request::Parts},
};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, error, warn};

use super::models::Claims;
use crate::accounts::Account;
use crate::common::{safe_email_log, ApiError, AppState};

/// Authenticated user extractor
///
/// Validates the bearer JWT and loads the matching account from the
/// credential store. Admin rights come from the account's role.
#[derive(Debug, Clone)]
pub struct AuthedUser {
    pub id: String,
    pub email: String,
    pub is_admin: bool,
    pub account: Account,
}

/// Decodes an HS256 token and returns its claims.
pub fn validate_jwt(token: &str, secret: &str) -> Result<Claims, ApiError> {
    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::new(Algorithm::HS256),
    )
    .map_err(|e| {
        warn!(error = %e, "JWT token validation failed");
        ApiError::Unauthorized("invalid token".to_string())
    })?;

    Ok(token_data.claims)
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthedUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Extension(state_lock): Extension<Arc<RwLock<AppState>>> =
            Extension::from_request_parts(parts, state)
                .await
                .map_err(|_| ApiError::InternalServer("missing app state".to_string()))?;

        let app_state = state_lock.read().await.clone();

        let token = match parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|h| h.to_str().ok())
        {
            Some(t) => t.to_string(),
            None => {
                warn!("Authentication failed: missing Authorization header");
                return Err(ApiError::Unauthorized("missing auth".into()));
            }
        };

        // Handle "Bearer <token>" format or raw token
        let bare_token = token.strip_prefix("Bearer ").unwrap_or(&token);

        let claims = validate_jwt(bare_token, &app_state.jwt_secret)?;
        let account_id = claims.sub;

        let account = app_state
            .store
            .find_account_by_id(&account_id)
            .await
            .map_err(|e| {
                error!(
                    error = %e,
                    account_id = %account_id,
                    "Store error during account lookup in authentication"
                );
                ApiError::from(e)
            })?;

        match account {
            Some(account) => {
                let is_admin = account.is_admin();
                debug!(
                    account_id = %account.id,
                    email = %safe_email_log(&account.email),
                    is_admin = is_admin,
                    "Account authenticated via extractor"
                );
                Ok(AuthedUser {
                    id: account.id.clone(),
                    email: account.email.clone(),
                    is_admin,
                    account,
                })
            }
            None => {
                warn!(account_id = %account_id, "Authentication failed: account not found");
                Err(ApiError::Unauthorized("user not found".into()))
            }
        }
    }
}
