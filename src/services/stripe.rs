// src/services/stripe.rs
//! Stripe REST client for the billing linkage flows.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error, warn};

use crate::common::config::StripeConfig;
use crate::common::safe_email_log;

#[derive(Debug, Error)]
pub enum StripeError {
    #[error("Stripe request timed out")]
    Timeout,

    #[error("HTTP request failed: {0}")]
    RequestFailed(String),

    #[error("Stripe API error (HTTP {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl From<reqwest::Error> for StripeError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            StripeError::Timeout
        } else if e.is_decode() {
            StripeError::SerializationError(e.to_string())
        } else {
            StripeError::RequestFailed(e.to_string())
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Customer {
    pub id: String,
    pub email: Option<String>,
    pub name: Option<String>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub balance: i64,
    #[serde(default)]
    pub delinquent: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Invoice {
    pub id: String,
    pub number: Option<String>,
    pub status: Option<String>,
    #[serde(default)]
    pub amount_due: i64,
    #[serde(default)]
    pub amount_paid: i64,
    pub currency: String,
    pub created: i64,
    pub hosted_invoice_url: Option<String>,
}

/// Fields for a new customer record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewCustomer {
    pub email: String,
    pub name: Option<String>,
    pub portal_account_id: String,
}

#[derive(Debug, Deserialize)]
struct ListResponse<T> {
    data: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: Option<String>,
}

#[async_trait]
pub trait BillingProvider: Send + Sync {
    /// `Ok(None)` when the id is unknown, malformed or the customer was deleted.
    async fn retrieve_customer(&self, customer_id: &str) -> Result<Option<Customer>, StripeError>;

    async fn find_customer_by_email(&self, email: &str) -> Result<Option<Customer>, StripeError>;

    async fn create_customer(&self, customer: &NewCustomer) -> Result<Customer, StripeError>;

    async fn list_invoices(
        &self,
        customer_id: &str,
        limit: u32,
    ) -> Result<Vec<Invoice>, StripeError>;
}

#[derive(Debug, Clone)]
pub struct StripeClient {
    client: Client,
    config: StripeConfig,
}

impl StripeClient {
    pub fn new(client: Client, config: StripeConfig) -> Self {
        Self { client, config }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/v1/{}", self.config.api_base_url, path)
    }

    async fn api_error(response: reqwest::Response) -> StripeError {
        let status = response.status().as_u16();
        let text = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorEnvelope>(&text)
            .ok()
            .and_then(|e| e.error.message)
            .unwrap_or(text);
        error!(status = status, error = %message, "Stripe API call failed");
        StripeError::Api { status, message }
    }
}

#[async_trait]
impl BillingProvider for StripeClient {
    async fn retrieve_customer(&self, customer_id: &str) -> Result<Option<Customer>, StripeError> {
        let response = self
            .client
            .get(self.url(&format!("customers/{}", urlencoding::encode(customer_id))))
            .bearer_auth(&self.config.secret_key)
            .send()
            .await?;

        let status = response.status();
        if matches!(status, StatusCode::NOT_FOUND | StatusCode::BAD_REQUEST) {
            warn!(customer_id = %customer_id, status = %status, "Stripe customer not found");
            return Ok(None);
        }
        if !status.is_success() {
            return Err(Self::api_error(response).await);
        }

        let body: serde_json::Value = response.json().await?;
        if body.get("deleted").and_then(|v| v.as_bool()) == Some(true) {
            warn!(customer_id = %customer_id, "Stripe customer has been deleted");
            return Ok(None);
        }

        serde_json::from_value(body)
            .map(Some)
            .map_err(|e| StripeError::SerializationError(e.to_string()))
    }

    async fn find_customer_by_email(&self, email: &str) -> Result<Option<Customer>, StripeError> {
        debug!(email = %safe_email_log(email), "Looking up Stripe customer by email");

        let response = self
            .client
            .get(self.url("customers"))
            .bearer_auth(&self.config.secret_key)
            .query(&[("email", email), ("limit", "1")])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::api_error(response).await);
        }

        let list: ListResponse<Customer> = response.json().await?;
        Ok(list.data.into_iter().next())
    }

    async fn create_customer(&self, customer: &NewCustomer) -> Result<Customer, StripeError> {
        let mut form = vec![
            ("email", customer.email.clone()),
            (
                "metadata[portal_account_id]",
                customer.portal_account_id.clone(),
            ),
        ];
        if let Some(name) = &customer.name {
            form.push(("name", name.clone()));
        }

        let response = self
            .client
            .post(self.url("customers"))
            .bearer_auth(&self.config.secret_key)
            .header("Idempotency-Key", format!("portal-customer-{}", customer.portal_account_id))
            .form(&form)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::api_error(response).await);
        }

        Ok(response.json::<Customer>().await?)
    }

    async fn list_invoices(
        &self,
        customer_id: &str,
        limit: u32,
    ) -> Result<Vec<Invoice>, StripeError> {
        let response = self
            .client
            .get(self.url("invoices"))
            .bearer_auth(&self.config.secret_key)
            .query(&[("customer", customer_id.to_string()), ("limit", limit.to_string())])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::api_error(response).await);
        }

        let list: ListResponse<Invoice> = response.json().await?;
        Ok(list.data)
    }
}
