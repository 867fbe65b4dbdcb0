//! Inventory/pricing and quoting collaborators.
//!
//! The pipeline only sees the [`InventoryService`] and [`QuoteService`]
//! traits; [`ErpClient`] implements both over HTTP.

pub mod client;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{QuoteError, ResolverError};
use crate::pipeline::types::{AvailabilityMap, LineItem, PricingMap};

pub use client::{ErpClient, ErpConfig};

/// Availability, pricing and currency for one attempt, all or nothing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resolution {
    pub availability: AvailabilityMap,
    pub pricing: PricingMap,
    pub currency: String,
}

/// Item shape on the ERP wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireItem {
    pub sku: String,
    pub qty: u32,
}

impl From<&LineItem> for WireItem {
    fn from(item: &LineItem) -> Self {
        Self {
            sku: item.sku.clone(),
            qty: item.quantity,
        }
    }
}

/// Resolves availability and pricing for a full item list in one call.
#[async_trait]
pub trait InventoryService: Send + Sync {
    async fn check(&self, items: &[LineItem]) -> Result<Resolution, ResolverError>;
}

/// Creates a quote for a complete order and returns its opaque id.
#[async_trait]
pub trait QuoteService: Send + Sync {
    async fn create_quote(
        &self,
        customer_id: &str,
        items: &[LineItem],
    ) -> Result<String, QuoteError>;
}
