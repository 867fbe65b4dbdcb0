//! REST endpoints for processing inquiries and reading metrics.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Deserialize;
use serde_json::json;
use tower_http::cors::CorsLayer;
use tracing::{error, warn};

use crate::error::{DatabaseError, ErrorKind, FetchError};
use crate::metrics::MetricsAggregator;
use crate::pipeline::QuoteProcessor;
use crate::store::EventStore;

const DEFAULT_INGEST_LIMIT: usize = 10;
const DEFAULT_BATCH_LIMIT: usize = 10;
const DEFAULT_TOP_N: usize = 5;
const DEFAULT_EVENTS_LIMIT: usize = 20;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub processor: Arc<QuoteProcessor>,
    pub metrics: Arc<MetricsAggregator>,
    pub store: Arc<dyn EventStore>,
}

/// Build the Axum router.
pub fn quote_routes(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/ingest", get(ingest))
        .route("/quotes/process", post(process_next))
        .route("/quotes/process/batch", post(process_batch))
        .route("/metrics/summary", get(metrics_summary))
        .route("/events", get(list_events))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ── Error mapping ───────────────────────────────────────────────────────

fn fetch_failed(err: FetchError) -> Response {
    warn!(error = %err, "Mail fetch failed");
    (
        StatusCode::BAD_GATEWAY,
        Json(json!({"error_kind": ErrorKind::Fetch, "reason": err.to_string()})),
    )
        .into_response()
}

fn storage_failed(err: DatabaseError) -> Response {
    error!(error = %err, "Event store query failed");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({"error_kind": ErrorKind::Storage, "reason": err.to_string()})),
    )
        .into_response()
}

// ── Health ──────────────────────────────────────────────────────────────

async fn health() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "service": "poquotator"
    }))
}

// ── Processing ──────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct LimitQuery {
    limit: Option<usize>,
}

async fn ingest(State(state): State<AppState>, Query(q): Query<LimitQuery>) -> Response {
    match state
        .processor
        .preview(q.limit.unwrap_or(DEFAULT_INGEST_LIMIT))
        .await
    {
        Ok(extracted) => Json(json!({ "items": extracted })).into_response(),
        Err(e) => fetch_failed(e),
    }
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct ProcessRequest {
    customer_id: Option<String>,
}

async fn process_next(State(state): State<AppState>, Json(req): Json<ProcessRequest>) -> Response {
    match state.processor.process_next(req.customer_id.as_deref()).await {
        Ok(outcome) => Json(outcome).into_response(),
        Err(e) => fetch_failed(e),
    }
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct BatchRequest {
    customer_id: Option<String>,
    limit: Option<usize>,
}

async fn process_batch(State(state): State<AppState>, Json(req): Json<BatchRequest>) -> Response {
    match state
        .processor
        .process_batch(
            req.limit.unwrap_or(DEFAULT_BATCH_LIMIT),
            req.customer_id.as_deref(),
        )
        .await
    {
        Ok(outcomes) => Json(outcomes).into_response(),
        Err(e) => fetch_failed(e),
    }
}

// ── Reporting ───────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct TopNQuery {
    top_n: Option<usize>,
}

async fn metrics_summary(State(state): State<AppState>, Query(q): Query<TopNQuery>) -> Response {
    match state.metrics.summarize(q.top_n.unwrap_or(DEFAULT_TOP_N)).await {
        Ok(summary) => Json(summary).into_response(),
        Err(e) => storage_failed(e),
    }
}

async fn list_events(State(state): State<AppState>, Query(q): Query<LimitQuery>) -> Response {
    match state
        .store
        .list_recent(q.limit.unwrap_or(DEFAULT_EVENTS_LIMIT))
        .await
    {
        Ok(events) => Json(events).into_response(),
        Err(e) => storage_failed(e),
    }
}
