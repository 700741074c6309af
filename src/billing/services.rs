use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, warn};

use super::models::{BillingResolution, SyncResult};
use crate::accounts::{Account, CredentialStore, StoreError};
use crate::common::{safe_email_log, safe_token_log, ApiError, Clock};
use crate::services::stripe::{NewCustomer, StripeError};
use crate::services::BillingProvider;

const RECENT_INVOICES: u32 = 10;

#[derive(Debug, Error)]
pub enum BillingError {
    #[error("Account not found")]
    AccountNotFound,

    #[error("Only administrators can manage billing for other accounts")]
    Forbidden,

    #[error("'{0}' is not a valid billing customer id")]
    InvalidCustomerId(String),

    #[error("Billing provider error: {0}")]
    Upstream(#[from] StripeError),

    #[error("Credential store error: {0}")]
    Store(#[from] StoreError),
}

impl From<BillingError> for ApiError {
    fn from(err: BillingError) -> Self {
        match err {
            BillingError::AccountNotFound => ApiError::NotFound(err.to_string()),
            BillingError::Forbidden => ApiError::Forbidden(err.to_string()),
            BillingError::InvalidCustomerId(_) => ApiError::BadRequest(err.to_string()),
            BillingError::Upstream(StripeError::Api { .. })
            | BillingError::Upstream(StripeError::SerializationError(_)) => {
                ApiError::BadGateway("Billing provider returned an error".to_string())
            }
            BillingError::Upstream(_) => {
                ApiError::ServiceUnavailable("Billing is unavailable, try again".to_string())
            }
            BillingError::Store(e) => e.into(),
        }
    }
}

/// Resolves and maintains the link between portal accounts and Stripe customers.
pub struct BillingService {
    store: Arc<dyn CredentialStore>,
    provider: Arc<dyn BillingProvider>,
    clock: Arc<dyn Clock>,
}

impl BillingService {
    pub fn new(
        store: Arc<dyn CredentialStore>,
        provider: Arc<dyn BillingProvider>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            provider,
            clock,
        }
    }

    /// Billing snapshot for `caller`, or for `impersonate_account_id` when the
    /// caller is an admin. Never matches or creates customers by email.
    pub async fn resolve(
        &self,
        caller: &Account,
        impersonate_account_id: Option<&str>,
    ) -> Result<BillingResolution, BillingError> {
        let requested = impersonate_account_id
            .map(str::trim)
            .filter(|id| !id.is_empty() && *id != caller.id);

        let target = match requested {
            Some(target_id) if caller.is_admin() => {
                let target = self
                    .store
                    .find_account_by_id(target_id)
                    .await?
                    .ok_or(BillingError::AccountNotFound)?;
                info!(
                    admin_id = %caller.id,
                    account_id = %target.id,
                    "Admin resolving billing on behalf of account"
                );
                target
            }
            Some(target_id) => {
                warn!(
                    account_id = %caller.id,
                    requested = %target_id,
                    "Non-admin impersonation request ignored"
                );
                caller.clone()
            }
            None => caller.clone(),
        };

        let Some(customer_id) = target
            .billing_customer_id
            .clone()
            .filter(|id| !id.trim().is_empty())
        else {
            return Ok(BillingResolution::NoBillingCustomerConfigured {
                account_id: target.id,
                message: "No billing account is linked to this portal account yet.".to_string(),
            });
        };

        let customer = match self.provider.retrieve_customer(&customer_id).await {
            Ok(Some(customer)) => customer,
            Ok(None) => {
                warn!(
                    account_id = %target.id,
                    customer_id = %safe_token_log(&customer_id),
                    "Stored billing customer id is not recognised by Stripe"
                );
                return Ok(BillingResolution::InvalidBillingCustomerId {
                    account_id: target.id,
                    offending_id: customer_id,
                    message: "The billing account linked to this portal account could not be found."
                        .to_string(),
                });
            }
            Err(e) => {
                error!(error = %e, account_id = %target.id, "Stripe customer lookup failed");
                return Err(e.into());
            }
        };

        let invoices = self
            .provider
            .list_invoices(&customer.id, RECENT_INVOICES)
            .await
            .map_err(|e| {
                error!(error = %e, account_id = %target.id, "Stripe invoice listing failed");
                BillingError::from(e)
            })?;

        Ok(BillingResolution::Snapshot {
            account_id: target.id,
            customer,
            invoices,
        })
    }

    /// Links the caller's own account to a Stripe customer: keeps a stored id
    /// Stripe still recognises, else adopts a customer with the same email,
    /// else creates one.
    pub async fn sync_own_billing_account(&self, caller: &Account) -> Result<SyncResult, BillingError> {
        let account = self
            .store
            .find_account_by_id(&caller.id)
            .await?
            .ok_or(BillingError::AccountNotFound)?;

        if let Some(existing) = account
            .billing_customer_id
            .as_deref()
            .filter(|id| !id.trim().is_empty())
        {
            if let Some(customer) = self.provider.retrieve_customer(existing).await? {
                return Ok(SyncResult {
                    customer_id: customer.id,
                    created: false,
                });
            }
            warn!(
                account_id = %account.id,
                customer_id = %safe_token_log(existing),
                "Stored billing customer no longer exists, relinking"
            );
        }

        let (customer, created) = match self.provider.find_customer_by_email(&account.email).await? {
            Some(customer) => {
                info!(
                    account_id = %account.id,
                    email = %safe_email_log(&account.email),
                    "Adopting existing Stripe customer with matching email"
                );
                (customer, false)
            }
            None => {
                let customer = self
                    .provider
                    .create_customer(&NewCustomer {
                        email: account.email.clone(),
                        name: account.display_name.clone(),
                        portal_account_id: account.id.clone(),
                    })
                    .await?;
                info!(account_id = %account.id, "Created Stripe customer");
                (customer, true)
            }
        };

        self.store
            .set_billing_customer_id(&account.id, Some(&customer.id), self.clock.now())
            .await?;

        Ok(SyncResult {
            customer_id: customer.id,
            created,
        })
    }

    /// Admin-only assignment (or clearing, with `None`) of an account's
    /// billing customer id. The id must exist at Stripe.
    pub async fn assign_billing_customer(
        &self,
        admin: &Account,
        account_id: &str,
        customer_id: Option<&str>,
    ) -> Result<Account, BillingError> {
        if !admin.is_admin() {
            warn!(account_id = %admin.id, "Non-admin attempted billing assignment");
            return Err(BillingError::Forbidden);
        }

        let customer_id = customer_id.map(str::trim).filter(|id| !id.is_empty());
        if let Some(id) = customer_id {
            if !id.starts_with("cus_") {
                return Err(BillingError::InvalidCustomerId(id.to_string()));
            }
            if self.provider.retrieve_customer(id).await?.is_none() {
                return Err(BillingError::InvalidCustomerId(id.to_string()));
            }
        }

        let updated = self
            .store
            .set_billing_customer_id(account_id, customer_id, self.clock.now())
            .await?;
        if !updated {
            return Err(BillingError::AccountNotFound);
        }

        info!(
            admin_id = %admin.id,
            account_id = %account_id,
            cleared = customer_id.is_none(),
            "Billing customer assigned by admin"
        );

        self.store
            .find_account_by_id(account_id)
            .await?
            .ok_or(BillingError::AccountNotFound)
    }
}
