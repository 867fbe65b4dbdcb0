//! `EventStore` trait: append-only audit log of processing attempts.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{DatabaseError, ErrorKind};
use crate::pipeline::types::{
    AvailabilityMap, LineItem, MissingReason, OutcomeStatus, PricingMap, ProcessingOutcome,
};

/// One persisted processing attempt. Never updated once written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: Uuid,
    pub from_email: String,
    pub subject: String,
    pub items: Vec<LineItem>,
    pub availability: AvailabilityMap,
    pub pricing: PricingMap,
    pub currency: String,
    pub status: OutcomeStatus,
    pub missing: Option<Vec<MissingReason>>,
    pub quote_id: Option<String>,
    pub latency_ms: Option<u64>,
    pub error_kind: Option<ErrorKind>,
    pub reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Event {
    /// Snapshot an outcome as its audit record.
    pub fn from_outcome(outcome: &ProcessingOutcome, created_at: DateTime<Utc>) -> Self {
        Self {
            id: outcome.event_id,
            from_email: outcome.from_email.clone(),
            subject: outcome.subject.clone(),
            items: outcome.items.clone(),
            availability: outcome.availability.clone(),
            pricing: outcome.pricing.clone(),
            currency: outcome.currency.clone(),
            status: outcome.status,
            missing: outcome.missing.clone(),
            quote_id: outcome.quote_id.clone(),
            latency_ms: Some(outcome.latency_ms),
            error_kind: outcome.error_kind,
            reason: outcome.reason.clone(),
            created_at,
        }
    }
}

/// Frequency of one missing reason across the event history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReasonCount {
    pub reason: String,
    pub count: u64,
}

/// Backend-agnostic event storage. Writes are append-only; reads are
/// aggregate queries for reporting plus a recent-events listing.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Append one event.
    async fn record(&self, event: &Event) -> Result<(), DatabaseError>;

    /// Total number of events.
    async fn count_events(&self) -> Result<u64, DatabaseError>;

    /// Event counts keyed by status string.
    async fn counts_by_status(&self) -> Result<BTreeMap<String, u64>, DatabaseError>;

    /// Most frequent missing reasons, by count descending then reason ascending.
    async fn top_missing_reasons(&self, limit: usize) -> Result<Vec<ReasonCount>, DatabaseError>;

    /// Mean latency over events that have one; `None` when there are none.
    async fn average_latency_ms(&self) -> Result<Option<f64>, DatabaseError>;

    /// Most recent events, newest first.
    async fn list_recent(&self, limit: usize) -> Result<Vec<Event>, DatabaseError>;
}
