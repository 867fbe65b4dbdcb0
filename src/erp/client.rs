//! HTTP client for the ERP's inventory and quoting endpoints.

use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::Decimal;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use super::{InventoryService, QuoteService, Resolution, WireItem};
use crate::config::{ConfigLookup, env_or, env_parse};
use crate::error::{ConfigError, QuoteError, ResolverError, ServiceError};
use crate::pipeline::types::LineItem;

/// ERP connection settings.
#[derive(Debug, Clone)]
pub struct ErpConfig {
    pub base_url: String,
    /// Shared credential sent as `x-api-key` on quote requests.
    pub api_key: SecretString,
    /// Per-request timeout for every ERP call.
    pub timeout: Duration,
}

impl ErpConfig {
    pub fn from_lookup(lookup: ConfigLookup<'_>) -> Result<Self, ConfigError> {
        Ok(Self {
            base_url: env_or(lookup, "ERP_BASE_URL", "http://erp:9000"),
            api_key: SecretString::from(env_or(lookup, "ERP_API_KEY", "dev-erp-key")),
            timeout: Duration::from_secs(env_parse(lookup, "ERP_TIMEOUT_SECS", 5)?),
        })
    }
}

#[derive(Debug, Serialize)]
struct QuoteRequest<'a> {
    customer_id: &'a str,
    items: Vec<WireItem>,
}

#[derive(Debug, serde::Deserialize)]
struct QuoteResponse {
    #[serde(default)]
    quote_id: Option<String>,
}

/// ERP client. Cheap to share behind an `Arc`; reqwest pools connections.
pub struct ErpClient {
    client: reqwest::Client,
    config: ErpConfig,
}

impl ErpClient {
    pub fn new(config: ErpConfig) -> Result<Self, ServiceError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ServiceError::Unreachable(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client, config })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{path}", self.config.base_url.trim_end_matches('/'))
    }

    async fn post_json<B, R>(
        &self,
        path: &str,
        body: &B,
        authenticated: bool,
    ) -> Result<R, ServiceError>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let timeout = self.config.timeout;
        let mut request = self.client.post(self.url(path)).json(body);
        if authenticated {
            request = request.header("x-api-key", self.config.api_key.expose_secret());
        }

        let resp = request
            .send()
            .await
            .map_err(|e| ServiceError::from_reqwest(e, timeout))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ServiceError::status(status.as_u16(), &body));
        }

        resp.json::<R>()
            .await
            .map_err(|e| ServiceError::from_reqwest(e, timeout))
    }
}

/// A resolution with a blank currency or a negative price is rejected whole.
fn validate_resolution(resolution: &Resolution) -> Result<(), ServiceError> {
    if resolution.currency.trim().is_empty() {
        return Err(ServiceError::InvalidResponse("blank currency".into()));
    }
    if let Some((sku, price)) = resolution.pricing.iter().find(|&(_, p)| *p < Decimal::ZERO) {
        return Err(ServiceError::InvalidResponse(format!(
            "negative price {price} for {sku}"
        )));
    }
    Ok(())
}

#[async_trait]
impl InventoryService for ErpClient {
    async fn check(&self, items: &[LineItem]) -> Result<Resolution, ResolverError> {
        let wire: Vec<WireItem> = items.iter().map(WireItem::from).collect();
        let resolution: Resolution = self.post_json("inventory/check", &wire, false).await?;
        validate_resolution(&resolution)?;
        debug!(
            skus = resolution.availability.len(),
            currency = %resolution.currency,
            "Inventory check complete"
        );
        Ok(resolution)
    }
}

#[async_trait]
impl QuoteService for ErpClient {
    async fn create_quote(
        &self,
        customer_id: &str,
        items: &[LineItem],
    ) -> Result<String, QuoteError> {
        let body = QuoteRequest {
            customer_id,
            items: items.iter().map(WireItem::from).collect(),
        };
        let resp: QuoteResponse = self.post_json("quotes", &body, true).await?;
        match resp.quote_id {
            Some(id) if !id.trim().is_empty() => Ok(id),
            _ => Err(QuoteError::MissingQuoteId),
        }
    }
}
