//! Summary statistics over the event history.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::DatabaseError;
use crate::store::{EventStore, ReasonCount};

/// Aggregate view returned by `GET /metrics/summary`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsSummary {
    pub total_count: u64,
    pub counts_by_status: BTreeMap<String, u64>,
    pub top_missing_reasons: Vec<ReasonCount>,
    pub average_latency_ms: f64,
}

/// Read-only reporting over an [`EventStore`].
pub struct MetricsAggregator {
    store: Arc<dyn EventStore>,
}

impl MetricsAggregator {
    pub fn new(store: Arc<dyn EventStore>) -> Self {
        Self { store }
    }

    /// Summarize all recorded events. `top_n` caps the missing-reason list.
    pub async fn summarize(&self, top_n: usize) -> Result<MetricsSummary, DatabaseError> {
        let total_count = self.store.count_events().await?;
        let counts_by_status = self.store.counts_by_status().await?;
        let top_missing_reasons = self.store.top_missing_reasons(top_n).await?;
        let average_latency_ms = self
            .store
            .average_latency_ms()
            .await?
            .map(round_2)
            .unwrap_or(0.0);

        debug!(total_count, top_n, "Metrics summarized");
        Ok(MetricsSummary {
            total_count,
            counts_by_status,
            top_missing_reasons,
            average_latency_ms,
        })
    }
}

fn round_2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
