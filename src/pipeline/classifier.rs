//! Outcome classification: decides whether an order can be auto-quoted.
//!
//! Pure function, no I/O. Structural checks come first, then per-sku stock
//! checks in the availability map's insertion order.

use crate::pipeline::types::{AvailabilityMap, LineItem, MissingReason};

/// Compute the ordered list of reasons preventing a quote.
///
/// An empty result means the order is complete and can be quoted.
pub fn classify(
    items: &[LineItem],
    customer_id: Option<&str>,
    availability: Option<&AvailabilityMap>,
) -> Vec<MissingReason> {
    let mut missing = Vec::new();

    if items.is_empty() {
        missing.push(MissingReason::Items);
    }

    if customer_id.is_none_or(|id| id.trim().is_empty()) {
        missing.push(MissingReason::CustomerId);
    }

    if let Some(availability) = availability {
        missing.extend(
            availability
                .iter()
                .filter(|(_, in_stock)| !**in_stock)
                .map(|(sku, _)| MissingReason::Stock(sku.to_string())),
        );
    }

    missing
}
