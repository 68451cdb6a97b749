//! Payment gateway client.
//!
//! The gateway owns charges, invoices, and subscriptions; we only observe
//! them. [`PaymentGateway`] is the seam the dispatchers are written against;
//! [`HttpGateway`] is the production implementation.

use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use thiserror::Error;

use courier_common::types::{Charge, Invoice};

/// Number of tries for a transient gateway failure before giving up.
const RETRY_ATTEMPTS: u32 = 3;

/// Base backoff between retries, doubled each attempt.
const RETRY_BACKOFF: Duration = Duration::from_millis(500);

#[derive(Debug, Error)]
pub enum GatewayError {
    /// The object does not exist at the gateway. Dispatchers log and return
    /// without sending rather than failing the job.
    #[error("Gateway object not found: {0}")]
    NotFound(String),

    /// The gateway rejected the request (non-404 4xx).
    #[error("Gateway rejected request: {0}")]
    Api(String),

    /// Transport failure or 5xx after retries were exhausted.
    #[error("Gateway unreachable: {0}")]
    Http(String),
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn get_charge(&self, charge_id: &str) -> Result<Charge, GatewayError>;

    async fn get_invoice(&self, invoice_id: &str) -> Result<Invoice, GatewayError>;

    /// Cancel a subscription. Callers treat this as fire-and-forget: the
    /// result is logged but never verified with a follow-up read.
    async fn cancel_subscription(&self, subscription_id: &str) -> Result<(), GatewayError>;
}

/// REST client for the payment gateway, with bearer auth and a fixed retry
/// budget for transient failures.
pub struct HttpGateway {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl HttpGateway {
    pub fn new(base_url: String, api_key: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url,
            api_key,
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, GatewayError> {
        let url = format!("{}{}", self.base_url, path);
        let mut backoff = RETRY_BACKOFF;
        let mut last_err = String::new();

        for attempt in 1..=RETRY_ATTEMPTS {
            let result = self
                .client
                .get(&url)
                .bearer_auth(&self.api_key)
                .send()
                .await;

            match result {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        return response
                            .json::<T>()
                            .await
                            .map_err(|e| GatewayError::Api(e.to_string()));
                    }
                    if status == reqwest::StatusCode::NOT_FOUND {
                        return Err(GatewayError::NotFound(url));
                    }
                    if status.is_client_error() {
                        let detail = response.text().await.unwrap_or_default();
                        return Err(GatewayError::Api(format!("{status}: {detail}")));
                    }
                    last_err = format!("{status}");
                }
                Err(e) => last_err = e.to_string(),
            }

            if attempt < RETRY_ATTEMPTS {
                tracing::debug!(url = %url, attempt, error = %last_err, "Retrying gateway request");
                tokio::time::sleep(backoff).await;
                backoff *= 2;
            }
        }

        Err(GatewayError::Http(last_err))
    }
}

#[async_trait]
impl PaymentGateway for HttpGateway {
    async fn get_charge(&self, charge_id: &str) -> Result<Charge, GatewayError> {
        self.get_json(&format!("/v1/charges/{charge_id}")).await
    }

    async fn get_invoice(&self, invoice_id: &str) -> Result<Invoice, GatewayError> {
        self.get_json(&format!("/v1/invoices/{invoice_id}")).await
    }

    async fn cancel_subscription(&self, subscription_id: &str) -> Result<(), GatewayError> {
        let url = format!("{}/v1/subscriptions/{subscription_id}", self.base_url);
        let response = self
            .client
            .delete(&url)
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|e| GatewayError::Http(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(GatewayError::NotFound(url));
        }
        let detail = response.text().await.unwrap_or_default();
        Err(GatewayError::Api(format!("{status}: {detail}")))
    }
}
