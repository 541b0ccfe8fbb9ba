//! # REST Client
//!
//! Thin HTTP wrapper around the POS server API.
//!
//! Every request carries the clerk's identity (`X-User-ID` plus a bearer
//! token), non-2xx responses become [`SyncError::Api`] with the body kept
//! for the log line, and response JSON is decoded into the [`crate::dto`]
//! types. No retry logic lives here; the reconciler decides what to do
//! with a failure.

use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest::Method;
use tracing::debug;
use url::Url;

use crate::config::SyncConfig;
use crate::dto::{PaymentMethodPayload, RemotePaymentMethod, RemoteProduct, RemoteTransaction};
use crate::error::{SyncError, SyncResult};

/// HTTP client for the POS server.
#[derive(Debug, Clone)]
pub struct RestClient {
    http: reqwest::Client,
    base_url: Url,
    clerk_id: String,
}

impl RestClient {
    /// Builds a client from the sync configuration.
    pub fn new(config: &SyncConfig) -> SyncResult<Self> {
        let base_url = config.api.base_url()?;
        let http = reqwest::Client::builder()
            .timeout(config.api.timeout())
            .build()?;
        Ok(Self {
            http,
            base_url,
            clerk_id: config.api.clerk_id.clone(),
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url.as_str().trim_end_matches('/'), path)
    }

    fn request(&self, method: Method, path: &str) -> reqwest::RequestBuilder {
        self.http
            .request(method, self.endpoint(path))
            .header("X-User-ID", &self.clerk_id)
            .header(AUTHORIZATION, format!("Bearer {}", self.clerk_id))
    }

    async fn check(response: reqwest::Response) -> SyncResult<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(SyncError::api(status, body))
    }

    async fn read_json<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> SyncResult<T> {
        let text = response.text().await?;
        Ok(serde_json::from_str(&text)?)
    }

    // =========================================================================
    // Catalog
    // =========================================================================

    /// Fetches the full product catalog.
    pub async fn get_products(&self) -> SyncResult<Vec<RemoteProduct>> {
        let response = self.request(Method::GET, "products").send().await?;
        Self::read_json(Self::check(response).await?).await
    }

    // =========================================================================
    // Transactions
    // =========================================================================

    /// Pushes a finalized transaction.
    ///
    /// The body is the queue payload exactly as frozen at enqueue time, so
    /// a replay after a crash posts the same bytes as the first attempt.
    pub async fn create_transaction(&self, payload: &str) -> SyncResult<RemoteTransaction> {
        debug!(bytes = payload.len(), "POST transactions");
        let response = self
            .request(Method::POST, "transactions")
            .header(CONTENT_TYPE, "application/json")
            .body(payload.to_string())
            .send()
            .await?;
        Self::read_json(Self::check(response).await?).await
    }

    /// Updates a synced transaction's status (refund flows).
    pub async fn update_transaction_status(
        &self,
        server_id: i64,
        payload: &str,
    ) -> SyncResult<()> {
        debug!(server_id, "PUT transactions/{}", server_id);
        let response = self
            .request(Method::PUT, &format!("transactions/{}", server_id))
            .header(CONTENT_TYPE, "application/json")
            .body(payload.to_string())
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }

    /// Fetches the server-side transaction history.
    pub async fn get_transactions(&self) -> SyncResult<Vec<RemoteTransaction>> {
        let response = self.request(Method::GET, "transactions").send().await?;
        Self::read_json(Self::check(response).await?).await
    }

    // =========================================================================
    // Payment Methods
    // =========================================================================

    /// Fetches the payment method reference table.
    pub async fn get_payment_methods(&self) -> SyncResult<Vec<RemotePaymentMethod>> {
        let response = self.request(Method::GET, "payment-methods").send().await?;
        Self::read_json(Self::check(response).await?).await
    }

    /// Creates a payment method on the server.
    pub async fn create_payment_method(&self, name: &str) -> SyncResult<RemotePaymentMethod> {
        let response = self
            .request(Method::POST, "payment-methods")
            .json(&PaymentMethodPayload { name: name.into() })
            .send()
            .await?;
        Self::read_json(Self::check(response).await?).await
    }

    /// Renames a payment method on the server.
    pub async fn update_payment_method(&self, id: i64, name: &str) -> SyncResult<()> {
        let response = self
            .request(Method::PUT, &format!("payment-methods/{}", id))
            .json(&PaymentMethodPayload { name: name.into() })
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }

    /// Deletes a payment method on the server.
    pub async fn delete_payment_method(&self, id: i64) -> SyncResult<()> {
        let response = self
            .request(Method::DELETE, &format!("payment-methods/{}", id))
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }
}
