//! Triage summary for orders that cannot be auto-quoted.
//!
//! Rendering is deterministic plain text; delivery goes through a
//! [`Notifier`] so the pipeline does not care about the transport.

use async_trait::async_trait;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::error::NotifyError;
use crate::pipeline::types::{AvailabilityMap, LineItem, MissingReason, PricingMap};

/// Tax is not modelled yet; totals carry an explicit zero line.
pub const TAX_RATE: Decimal = dec!(0);

/// Subject used for every triage message.
pub const TRIAGE_SUBJECT: &str = "[Triage] Incomplete quote request (with pricing)";

/// A plaintext message addressed to a fixed recipient.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub to: String,
    pub subject: String,
    pub body: String,
}

/// Delivery channel for triage messages.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, message: &Notification) -> Result<(), NotifyError>;
}

/// Everything a human needs to pick up an incomplete order.
#[derive(Debug, Clone)]
pub struct TriageReport<'a> {
    pub from_email: &'a str,
    pub subject: &'a str,
    pub customer_id: Option<&'a str>,
    pub items: &'a [LineItem],
    pub availability: &'a AvailabilityMap,
    pub pricing: &'a PricingMap,
    pub currency: &'a str,
    pub missing: &'a [MissingReason],
}

/// Subtotal, tax and grand total of the available lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Totals {
    pub subtotal: Decimal,
    pub tax: Decimal,
    pub grand_total: Decimal,
}

impl<'a> TriageReport<'a> {
    fn is_available(&self, item: &LineItem) -> bool {
        self.availability.get(&item.sku).copied().unwrap_or(false)
    }

    fn unit_price(&self, item: &LineItem) -> Decimal {
        self.pricing.get(&item.sku).copied().unwrap_or(Decimal::ZERO)
    }

    fn line_total(&self, item: &LineItem) -> Decimal {
        self.unit_price(item) * Decimal::from(item.quantity)
    }

    pub fn totals(&self) -> Totals {
        let subtotal: Decimal = self
            .items
            .iter()
            .filter(|it| self.is_available(it))
            .map(|it| self.line_total(it))
            .sum();
        let tax = (subtotal * TAX_RATE).round_dp(2);
        Totals {
            subtotal,
            tax,
            grand_total: (subtotal + tax).round_dp(2),
        }
    }

    /// Render the plaintext body.
    pub fn render(&self) -> String {
        let cur = self.currency.trim();
        let mut lines: Vec<String> = Vec::new();

        lines.push("Quote triage summary".into());
        lines.push(String::new());
        lines.push(format!(
            "From: {}",
            non_empty_or(self.from_email, "unknown")
        ));
        lines.push(format!(
            "Original subject: {}",
            non_empty_or(self.subject, "(no subject)")
        ));
        lines.push(format!(
            "Customer ID: {}",
            self.customer_id
                .filter(|c| !c.trim().is_empty())
                .unwrap_or("(none)")
        ));
        lines.push(String::new());

        lines.push("== Available ==".into());
        let available: Vec<&LineItem> =
            self.items.iter().filter(|it| self.is_available(it)).collect();
        if available.is_empty() {
            lines.push("- (none)".into());
        }
        for it in available {
            lines.push(format!(
                "- {} x {} @ {} = {}",
                it.quantity,
                it.sku,
                money(self.unit_price(it), cur),
                money(self.line_total(it), cur),
            ));
        }

        lines.push(String::new());
        lines.push("== Unavailable ==".into());
        let unavailable: Vec<&LineItem> =
            self.items.iter().filter(|it| !self.is_available(it)).collect();
        if unavailable.is_empty() {
            lines.push("- (none)".into());
        }
        for it in unavailable {
            lines.push(format!("- {} x {}", it.quantity, it.sku));
        }

        let totals = self.totals();
        lines.push(String::new());
        lines.push(format!("Subtotal: {}", money(totals.subtotal, cur)));
        lines.push(format!("Tax: {}", money(totals.tax, cur)));
        lines.push(format!("Estimated total: {}", money(totals.grand_total, cur)));

        lines.push(String::new());
        lines.push("== Missing reasons ==".into());
        if self.missing.is_empty() {
            lines.push("- (none)".into());
        }
        for reason in self.missing {
            lines.push(format!("- {reason}"));
        }

        lines.join("\n")
    }

    /// Build the message for the given recipient.
    pub fn to_notification(&self, recipient: &str) -> Notification {
        Notification {
            to: recipient.to_string(),
            subject: TRIAGE_SUBJECT.to_string(),
            body: self.render(),
        }
    }
}

/// Two-decimal amount, suffixed with the currency when there is one.
fn money(amount: Decimal, currency: &str) -> String {
    let amount = amount.round_dp(2);
    if currency.is_empty() {
        format!("{amount:.2}")
    } else {
        format!("{amount:.2} {currency}")
    }
}

fn non_empty_or<'s>(value: &'s str, fallback: &'s str) -> &'s str {
    if value.trim().is_empty() { fallback } else { value }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixture {
        items: Vec<LineItem>,
        availability: AvailabilityMap,
        pricing: PricingMap,
        missing: Vec<MissingReason>,
    }

    fn scenario_a() -> Fixture {
        Fixture {
            items: vec![LineItem::new("Widget A", 2), LineItem::new("Widget-B", 1)],
            availability: [("Widget A", true), ("Widget-B", false)].into_iter().collect(),
            pricing: [("Widget A", dec!(12.50)), ("Widget-B", dec!(9.90))]
                .into_iter()
                .collect(),
            missing: vec![MissingReason::Stock("Widget-B".into())],
        }
    }

    fn report(f: &Fixture) -> TriageReport<'_> {
        TriageReport {
            from_email: "buyer@acme.test",
            subject: "RFQ",
            customer_id: Some("C-42"),
            items: &f.items,
            availability: &f.availability,
            pricing: &f.pricing,
            currency: "USD",
            missing: &f.missing,
        }
    }

    #[test]
    fn totals_only_count_available_lines() {
        let f = scenario_a();
        let totals = report(&f).totals();
        assert_eq!(totals.subtotal, dec!(25.00));
        assert_eq!(totals.tax, dec!(0));
        assert_eq!(totals.grand_total, dec!(25.00));
    }

    #[test]
    fn render_lists_sections() {
        let f = scenario_a();
        let body = report(&f).render();
        assert!(body.contains("From: buyer@acme.test"));
        assert!(body.contains("Customer ID: C-42"));
        assert!(body.contains("- 2 x Widget A @ 12.50 USD = 25.00 USD"));
        assert!(body.contains("== Unavailable ==\n- 1 x Widget-B"));
        assert!(!body.contains("9.90"));
        assert!(body.contains("Subtotal: 25.00 USD"));
        assert!(body.contains("Tax: 0.00 USD"));
        assert!(body.contains("Estimated total: 25.00 USD"));
        assert!(body.contains("== Missing reasons ==\n- stock:Widget-B"));
    }

    #[test]
    fn unknown_price_counts_as_zero() {
        let mut f = scenario_a();
        f.pricing = PricingMap::new();
        let body = report(&f).render();
        assert!(body.contains("- 2 x Widget A @ 0.00 USD = 0.00 USD"));
        assert!(body.contains("Subtotal: 0.00 USD"));
    }

    #[test]
    fn empty_sections_and_fallback_header() {
        let f = Fixture {
            items: vec![],
            availability: AvailabilityMap::new(),
            pricing: PricingMap::new(),
            missing: vec![MissingReason::Items, MissingReason::CustomerId],
        };
        let r = TriageReport {
            from_email: "",
            subject: "",
            customer_id: None,
            currency: "",
            ..report(&f)
        };
        let body = r.render();
        assert!(body.contains("From: unknown"));
        assert!(body.contains("Original subject: (no subject)"));
        assert!(body.contains("Customer ID: (none)"));
        assert!(body.contains("== Available ==\n- (none)"));
        assert!(body.contains("== Unavailable ==\n- (none)"));
        assert!(body.contains("- items\n- customer_id"));
        assert!(body.contains("Subtotal: 0.00\n"));
        assert!(body.contains("Estimated total: 0.00\n"));
    }

    #[test]
    fn blank_currency_leaves_no_trailing_space() {
        let f = scenario_a();
        let body = TriageReport {
            currency: "",
            ..report(&f)
        }
        .render();
        assert!(body.contains("- 2 x Widget A @ 12.50 = 25.00\n"));
        assert!(body.lines().all(|line| !line.ends_with(' ')));
    }

    #[test]
    fn render_is_deterministic() {
        let f = scenario_a();
        assert_eq!(report(&f).render(), report(&f).render());
    }

    #[test]
    fn notification_uses_fixed_subject_and_recipient() {
        let f = scenario_a();
        let n = report(&f).to_notification("triage@example.com");
        assert_eq!(n.to, "triage@example.com");
        assert_eq!(n.subject, TRIAGE_SUBJECT);
        assert!(n.body.starts_with("Quote triage summary"));
    }
}
