//! Billing request/response models

use serde::{Deserialize, Serialize};

use crate::services::stripe::{Customer, Invoice};

/// Outcome of a billing lookup. Zero states are ordinary results, not errors,
/// so the portal can render them.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BillingResolution {
    #[serde(rename_all = "camelCase")]
    NoBillingCustomerConfigured { account_id: String, message: String },

    #[serde(rename_all = "camelCase")]
    InvalidBillingCustomerId {
        account_id: String,
        offending_id: String,
        message: String,
    },

    #[serde(rename_all = "camelCase")]
    Snapshot {
        account_id: String,
        customer: Customer,
        invoices: Vec<Invoice>,
    },
}

/// Body of `POST /api/billing/resolve`
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvePayload {
    #[serde(default)]
    pub impersonate_account_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SyncResult {
    pub customer_id: String,
    pub created: bool,
}

/// Body of `PUT /api/admin/accounts/:id/billing-customer`; `null` clears the link.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignBillingCustomerPayload {
    pub customer_id: Option<String>,
}
