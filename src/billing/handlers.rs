//! Billing handlers

use axum::extract::{Extension, Json, Path};
use std::sync::Arc;
use tokio::sync::RwLock;

use super::models::{AssignBillingCustomerPayload, BillingResolution, ResolvePayload, SyncResult};
use crate::accounts::Account;
use crate::auth::AuthedUser;
use crate::common::{ApiError, AppState};

/// POST /api/billing/resolve
///
/// # Request Body (optional)
/// ```json
/// { "impersonateAccountId": "<account id>" }
/// ```
/// The impersonation id is honoured for admins only.
pub async fn resolve_billing(
    Extension(state_lock): Extension<Arc<RwLock<AppState>>>,
    user: AuthedUser,
    payload: Option<Json<ResolvePayload>>,
) -> Result<Json<BillingResolution>, ApiError> {
    let state = state_lock.read().await.clone();
    let payload = payload.map(|Json(p)| p).unwrap_or_default();

    let resolution = state
        .billing
        .resolve(&user.account, payload.impersonate_account_id.as_deref())
        .await?;
    Ok(Json(resolution))
}

/// POST /api/billing/sync
pub async fn sync_billing(
    Extension(state_lock): Extension<Arc<RwLock<AppState>>>,
    user: AuthedUser,
) -> Result<Json<SyncResult>, ApiError> {
    let state = state_lock.read().await.clone();
    let result = state.billing.sync_own_billing_account(&user.account).await?;
    Ok(Json(result))
}

/// PUT /api/admin/accounts/:id/billing-customer
pub async fn assign_billing_customer(
    Extension(state_lock): Extension<Arc<RwLock<AppState>>>,
    user: AuthedUser,
    Path(account_id): Path<String>,
    Json(payload): Json<AssignBillingCustomerPayload>,
) -> Result<Json<Account>, ApiError> {
    if !user.is_admin {
        return Err(ApiError::Forbidden("Admin access required".to_string()));
    }

    let state = state_lock.read().await.clone();
    let account = state
        .billing
        .assign_billing_customer(&user.account, &account_id, payload.customer_id.as_deref())
        .await?;
    Ok(Json(account))
}
