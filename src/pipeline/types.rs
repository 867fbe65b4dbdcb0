//! Shared types for the quote processing pipeline.

use std::fmt;
use std::marker::PhantomData;
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use uuid::Uuid;

use crate::error::ErrorKind;

// ── Inbound email ───────────────────────────────────────────────────

/// An inbound sales inquiry as handed over by the mail source.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InboundEmail {
    /// Normalized sender address (bare, lowercased). Empty if unknown.
    pub from: String,
    pub subject: String,
    /// Plain text body with quoted reply text already stripped.
    pub body: String,
}

// ── Line items ──────────────────────────────────────────────────────

/// One requested product and its total quantity within a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
    pub sku: String,
    pub quantity: u32,
}

impl LineItem {
    pub fn new(sku: impl Into<String>, quantity: u32) -> Self {
        Self {
            sku: sku.into(),
            quantity,
        }
    }
}

// ── Ordered sku maps ────────────────────────────────────────────────

/// Explicitly ordered `(sku, value)` pairs.
///
/// Serialized as a JSON object whose keys follow insertion order, and
/// deserialized in document order. Re-inserting a sku keeps its original
/// position and replaces the value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkuMap<V> {
    entries: Vec<(String, V)>,
}

/// Per-sku stock availability.
pub type AvailabilityMap = SkuMap<bool>;

/// Per-sku unit price. The currency lives next to the map, one per attempt.
pub type PricingMap = SkuMap<Decimal>;

impl<V> Default for SkuMap<V> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
        }
    }
}

impl<V> SkuMap<V> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, sku: impl Into<String>, value: V) {
        let sku = sku.into();
        match self.entries.iter_mut().find(|(k, _)| *k == sku) {
            Some((_, existing)) => *existing = value,
            None => self.entries.push((sku, value)),
        }
    }

    pub fn get(&self, sku: &str) -> Option<&V> {
        self.entries
            .iter()
            .find(|(k, _)| k == sku)
            .map(|(_, v)| v)
    }

    /// Entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &V)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K: Into<String>, V> FromIterator<(K, V)> for SkuMap<V> {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut map = Self::new();
        for (k, v) in iter {
            map.insert(k, v);
        }
        map
    }
}

impl<V: Serialize> Serialize for SkuMap<V> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (k, v) in &self.entries {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

struct SkuMapVisitor<V>(PhantomData<V>);

impl<'de, V: Deserialize<'de>> Visitor<'de> for SkuMapVisitor<V> {
    type Value = SkuMap<V>;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("an object keyed by sku")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
        let mut map = SkuMap::new();
        while let Some((k, v)) = access.next_entry::<String, V>()? {
            map.insert(k, v);
        }
        Ok(map)
    }
}

impl<'de, V: Deserialize<'de>> Deserialize<'de> for SkuMap<V> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_map(SkuMapVisitor(PhantomData))
    }
}

// ── Missing reasons ─────────────────────────────────────────────────

/// Structured cause preventing automatic quote creation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MissingReason {
    /// No items could be parsed from the message.
    Items,
    /// No customer identifier was supplied.
    CustomerId,
    /// The sku is out of stock.
    Stock(String),
}

impl fmt::Display for MissingReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Items => f.write_str("items"),
            Self::CustomerId => f.write_str("customer_id"),
            Self::Stock(sku) => write!(f, "stock:{sku}"),
        }
    }
}

impl FromStr for MissingReason {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "items" => Ok(Self::Items),
            "customer_id" => Ok(Self::CustomerId),
            _ => s
                .strip_prefix("stock:")
                .map(|sku| Self::Stock(sku.to_string()))
                .ok_or_else(|| format!("unknown missing reason: '{s}'")),
        }
    }
}

impl Serialize for MissingReason {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for MissingReason {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

// ── Outcome ─────────────────────────────────────────────────────────

/// Terminal classification of one processing attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    Created,
    Incomplete,
    Error,
}

impl OutcomeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Incomplete => "incomplete",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for OutcomeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OutcomeStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "created" => Ok(Self::Created),
            "incomplete" => Ok(Self::Incomplete),
            "error" => Ok(Self::Error),
            other => Err(format!("unknown outcome status: {other}")),
        }
    }
}

/// Full result of one processing attempt, returned to the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingOutcome {
    pub status: OutcomeStatus,
    pub from_email: String,
    pub subject: String,
    pub customer_id: Option<String>,
    pub items: Vec<LineItem>,
    pub availability: AvailabilityMap,
    pub pricing: PricingMap,
    pub currency: String,
    pub missing: Option<Vec<MissingReason>>,
    pub quote_id: Option<String>,
    /// Human-readable failure reason (resolver/quote error, or notify failure).
    pub reason: Option<String>,
    pub error_kind: Option<ErrorKind>,
    pub latency_ms: u64,
    /// Whether the audit event was persisted.
    pub recorded: bool,
    pub event_id: Uuid,
}

impl ProcessingOutcome {
    /// Check the status/field invariants:
    /// `created` has a quote id and no missing list, `incomplete` has a
    /// non-empty missing list, `error` has a reason and no quote id.
    pub fn is_consistent(&self) -> bool {
        match self.status {
            OutcomeStatus::Created => self.quote_id.is_some() && self.missing.is_none(),
            OutcomeStatus::Incomplete => self.missing.as_ref().is_some_and(|m| !m.is_empty()),
            OutcomeStatus::Error => self.reason.is_some() && self.quote_id.is_none(),
        }
    }
}

/// Parse-only view of an inbound email (no side effects).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractedEmail {
    pub from_email: String,
    pub subject: String,
    pub items: Vec<LineItem>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn sku_map_preserves_insertion_order() {
        let mut map = SkuMap::new();
        map.insert("Zeta", true);
        map.insert("Alpha", false);
        map.insert("Mid", true);
        let keys: Vec<&str> = map.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["Zeta", "Alpha", "Mid"]);
    }

    #[test]
    fn sku_map_reinsert_keeps_position() {
        let mut map = SkuMap::new();
        map.insert("A", 1);
        map.insert("B", 2);
        map.insert("A", 3);
        assert_eq!(map.len(), 2);
        assert_eq!(map.get("A"), Some(&3));
        assert_eq!(map.iter().next(), Some(("A", &3)));
    }

    #[test]
    fn sku_map_deserializes_in_document_order() {
        let json = r#"{"Widget-B": false, "Widget A": true, "Another": false}"#;
        let map: AvailabilityMap = serde_json::from_str(json).unwrap();
        let keys: Vec<&str> = map.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["Widget-B", "Widget A", "Another"]);
    }

    #[test]
    fn sku_map_serializes_in_insertion_order() {
        let map: PricingMap = [("b", dec!(1.5)), ("a", dec!(2))].into_iter().collect();
        let json = serde_json::to_string(&map).unwrap();
        assert!(json.find("\"b\"").unwrap() < json.find("\"a\"").unwrap());
    }

    #[test]
    fn pricing_accepts_json_numbers() {
        let map: PricingMap = serde_json::from_str(r#"{"Widget A": 12.50}"#).unwrap();
        assert_eq!(map.get("Widget A"), Some(&dec!(12.5)));
    }

    #[test]
    fn missing_reason_wire_form() {
        assert_eq!(MissingReason::Items.to_string(), "items");
        assert_eq!(MissingReason::CustomerId.to_string(), "customer_id");
        assert_eq!(
            MissingReason::Stock("Widget-B".into()).to_string(),
            "stock:Widget-B"
        );
        assert_eq!(
            "stock:Widget A".parse::<MissingReason>().unwrap(),
            MissingReason::Stock("Widget A".into())
        );
        assert!("nope".parse::<MissingReason>().is_err());
    }

    #[test]
    fn missing_reason_serializes_as_string() {
        let reasons = vec![MissingReason::CustomerId, MissingReason::Stock("X".into())];
        let json = serde_json::to_value(&reasons).unwrap();
        assert_eq!(json, serde_json::json!(["customer_id", "stock:X"]));
        let back: Vec<MissingReason> = serde_json::from_value(json).unwrap();
        assert_eq!(back, reasons);
    }

    #[test]
    fn outcome_status_labels() {
        assert_eq!(OutcomeStatus::Created.as_str(), "created");
        assert_eq!(
            serde_json::to_value(OutcomeStatus::Incomplete).unwrap(),
            "incomplete"
        );
    }
}
