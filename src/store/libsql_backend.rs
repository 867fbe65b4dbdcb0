//! libSQL backend for the event store.
//!
//! Supports local file and in-memory databases. One connection is shared by
//! all callers; a semaphore bounds how many operations use it at once.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use libsql::{Connection, Database as LibSqlDatabase, params};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::{Semaphore, SemaphorePermit};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::StoreConfig;
use crate::error::{DatabaseError, ErrorKind};
use crate::store::migrations;
use crate::store::traits::{Event, EventStore, ReasonCount};

const EVENT_COLUMNS: &str = "id, from_email, subject, items_json, availability_json, \
     pricing_json, currency, status, missing_json, quote_id, latency_ms, error_kind, reason, \
     created_at";

/// libSQL event store.
pub struct LibSqlEventStore {
    #[allow(dead_code)]
    db: LibSqlDatabase,
    conn: Connection,
    permits: Semaphore,
    max_connections: usize,
    acquire_timeout: Duration,
    write_timeout: Duration,
}

impl LibSqlEventStore {
    /// Open (or create) the database file at `config.path` and run migrations.
    pub async fn new_local(config: &StoreConfig) -> Result<Self, DatabaseError> {
        if let Some(parent) = config.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Pool(format!("Failed to create database directory: {e}"))
            })?;
        }
        let store = Self::open(&config.path, config).await?;
        info!(path = %config.path.display(), "Event store opened");
        Ok(store)
    }

    /// Create an in-memory store (for tests). `config.path` is ignored.
    pub async fn new_memory(config: &StoreConfig) -> Result<Self, DatabaseError> {
        Self::open(Path::new(":memory:"), config).await
    }

    async fn open(path: &Path, config: &StoreConfig) -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to open libSQL database: {e}")))?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        migrations::run_migrations(&conn).await?;

        Ok(Self {
            db,
            conn,
            permits: Semaphore::new(config.max_connections),
            max_connections: config.max_connections,
            acquire_timeout: config.acquire_timeout,
            write_timeout: config.write_timeout,
        })
    }

    /// Wait for in-flight operations to finish, then refuse new ones.
    pub async fn close(&self) {
        let all = u32::try_from(self.max_connections).unwrap_or(u32::MAX);
        if tokio::time::timeout(self.acquire_timeout, self.permits.acquire_many(all))
            .await
            .is_err()
        {
            warn!("Event store closing with operations still in flight");
        }
        self.permits.close();
        info!("Event store closed");
    }

    async fn acquire(&self) -> Result<SemaphorePermit<'_>, DatabaseError> {
        match tokio::time::timeout(self.acquire_timeout, self.permits.acquire()).await {
            Ok(Ok(permit)) => Ok(permit),
            Ok(Err(_)) => Err(DatabaseError::Pool("event store is closed".into())),
            Err(_) => Err(DatabaseError::Pool(format!(
                "no connection available within {:?}",
                self.acquire_timeout
            ))),
        }
    }

    /// Run a single-row aggregate query.
    async fn query_one(&self, op: &str, sql: &str) -> Result<Option<libsql::Row>, DatabaseError> {
        let _permit = self.acquire().await?;
        let mut rows = self
            .conn
            .query(sql, ())
            .await
            .map_err(|e| DatabaseError::Query(format!("{op}: {e}")))?;
        rows.next()
            .await
            .map_err(|e| DatabaseError::Query(format!("{op}: {e}")))
    }
}

// ── Helper functions ────────────────────────────────────────────────

fn to_json<T: Serialize + ?Sized>(value: &T) -> Result<String, DatabaseError> {
    serde_json::to_string(value).map_err(|e| DatabaseError::Serialization(e.to_string()))
}

fn from_json<T: DeserializeOwned>(column: &str, raw: &str) -> Result<T, DatabaseError> {
    serde_json::from_str(raw)
        .map_err(|e| DatabaseError::Serialization(format!("{column}: {e}")))
}

fn to_count(value: i64) -> u64 {
    u64::try_from(value).unwrap_or(0)
}

/// Map a libsql Row to an Event. Column order matches `EVENT_COLUMNS`.
fn row_to_event(row: &libsql::Row) -> Result<Event, DatabaseError> {
    let text = |idx: i32| -> Result<String, DatabaseError> {
        row.get::<String>(idx)
            .map_err(|e| DatabaseError::Query(format!("read column {idx}: {e}")))
    };

    let id_str = text(0)?;
    let status_str = text(7)?;
    let created_str = text(13)?;
    let missing_json: Option<String> = row.get(8).ok();
    let latency: Option<i64> = row.get(10).ok();
    let error_kind: Option<String> = row.get(11).ok();

    Ok(Event {
        id: Uuid::parse_str(&id_str)
            .map_err(|e| DatabaseError::Serialization(format!("id '{id_str}': {e}")))?,
        from_email: text(1)?,
        subject: text(2)?,
        items: from_json("items_json", &text(3)?)?,
        availability: from_json("availability_json", &text(4)?)?,
        pricing: from_json("pricing_json", &text(5)?)?,
        currency: text(6)?,
        status: status_str.parse().map_err(DatabaseError::Serialization)?,
        missing: missing_json
            .map(|raw| from_json("missing_json", &raw))
            .transpose()?,
        quote_id: row.get(9).ok(),
        latency_ms: latency.map(to_count),
        error_kind: error_kind.as_deref().and_then(ErrorKind::parse),
        reason: row.get(12).ok(),
        created_at: DateTime::parse_from_rfc3339(&created_str)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| DatabaseError::Serialization(format!("created_at '{created_str}': {e}")))?,
    })
}

// ── EventStore impl ─────────────────────────────────────────────────

#[async_trait]
impl EventStore for LibSqlEventStore {
    async fn record(&self, event: &Event) -> Result<(), DatabaseError> {
        let items_json = to_json(&event.items)?;
        let availability_json = to_json(&event.availability)?;
        let pricing_json = to_json(&event.pricing)?;
        let missing_json = event.missing.as_ref().map(to_json).transpose()?;
        let latency = event
            .latency_ms
            .map(|ms| i64::try_from(ms).unwrap_or(i64::MAX));

        let sql = format!(
            "INSERT INTO events ({EVENT_COLUMNS}) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)"
        );

        let _permit = self.acquire().await?;
        let insert = self.conn.execute(
            &sql,
            params![
                event.id.to_string(),
                event.from_email.as_str(),
                event.subject.as_str(),
                items_json,
                availability_json,
                pricing_json,
                event.currency.as_str(),
                event.status.as_str(),
                missing_json,
                event.quote_id.clone(),
                latency,
                event.error_kind.map(|k| k.as_str().to_string()),
                event.reason.clone(),
                event.created_at.to_rfc3339_opts(SecondsFormat::Micros, true),
            ],
        );

        match tokio::time::timeout(self.write_timeout, insert).await {
            Ok(result) => {
                result.map_err(|e| DatabaseError::Query(format!("record event: {e}")))?;
            }
            Err(_) => {
                return Err(DatabaseError::Timeout {
                    op: "record event".into(),
                    timeout: self.write_timeout,
                });
            }
        }

        debug!(event_id = %event.id, status = %event.status, "Event recorded");
        Ok(())
    }

    async fn count_events(&self) -> Result<u64, DatabaseError> {
        let row = self
            .query_one("count events", "SELECT COUNT(*) FROM events")
            .await?;
        match row {
            Some(row) => row
                .get::<i64>(0)
                .map(to_count)
                .map_err(|e| DatabaseError::Query(format!("count events: {e}"))),
            None => Ok(0),
        }
    }

    async fn counts_by_status(&self) -> Result<BTreeMap<String, u64>, DatabaseError> {
        let _permit = self.acquire().await?;
        let mut rows = self
            .conn
            .query("SELECT status, COUNT(*) FROM events GROUP BY status", ())
            .await
            .map_err(|e| DatabaseError::Query(format!("counts by status: {e}")))?;

        let mut counts = BTreeMap::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("counts by status: {e}")))?
        {
            let status: String = row
                .get(0)
                .map_err(|e| DatabaseError::Query(format!("counts by status: {e}")))?;
            let count: i64 = row
                .get(1)
                .map_err(|e| DatabaseError::Query(format!("counts by status: {e}")))?;
            counts.insert(status, to_count(count));
        }
        Ok(counts)
    }

    async fn top_missing_reasons(&self, limit: usize) -> Result<Vec<ReasonCount>, DatabaseError> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);

        let _permit = self.acquire().await?;
        let mut rows = self
            .conn
            .query(
                "SELECT je.value AS reason, COUNT(*) AS n
                 FROM events, json_each(events.missing_json) AS je
                 WHERE events.missing_json IS NOT NULL
                 GROUP BY je.value
                 ORDER BY n DESC, reason ASC
                 LIMIT ?1",
                params![limit],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("top missing reasons: {e}")))?;

        let mut reasons = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("top missing reasons: {e}")))?
        {
            let reason: String = row
                .get(0)
                .map_err(|e| DatabaseError::Query(format!("top missing reasons: {e}")))?;
            let count: i64 = row
                .get(1)
                .map_err(|e| DatabaseError::Query(format!("top missing reasons: {e}")))?;
            reasons.push(ReasonCount {
                reason,
                count: to_count(count),
            });
        }
        Ok(reasons)
    }

    async fn average_latency_ms(&self) -> Result<Option<f64>, DatabaseError> {
        let row = self
            .query_one(
                "average latency",
                "SELECT AVG(latency_ms) FROM events WHERE latency_ms IS NOT NULL",
            )
            .await?;
        // AVG over no rows is NULL.
        Ok(row.and_then(|row| row.get::<f64>(0).ok()))
    }

    async fn list_recent(&self, limit: usize) -> Result<Vec<Event>, DatabaseError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);

        let _permit = self.acquire().await?;
        let mut rows = self
            .conn
            .query(
                &format!(
                    "SELECT {EVENT_COLUMNS} FROM events \
                     ORDER BY created_at DESC, rowid DESC LIMIT ?1"
                ),
                params![limit],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("list recent events: {e}")))?;

        let mut events = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("list recent events: {e}")))?
        {
            events.push(row_to_event(&row)?);
        }
        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    use crate::pipeline::types::{LineItem, MissingReason, OutcomeStatus, SkuMap};

    async fn memory_store() -> LibSqlEventStore {
        LibSqlEventStore::new_memory(&StoreConfig::default())
            .await
            .unwrap()
    }

    fn event(
        status: OutcomeStatus,
        missing: Option<Vec<MissingReason>>,
        latency_ms: Option<u64>,
        minute: u32,
    ) -> Event {
        Event {
            id: Uuid::new_v4(),
            from_email: "buyer@acme.test".into(),
            subject: "RFQ".into(),
            items: vec![LineItem::new("Widget A", 2), LineItem::new("Widget-B", 1)],
            availability: [("Widget A", true), ("Widget-B", false)].into_iter().collect(),
            pricing: [("Widget A", dec!(12.50)), ("Widget-B", dec!(9.90))]
                .into_iter()
                .collect(),
            currency: "USD".into(),
            status,
            missing,
            quote_id: (status == OutcomeStatus::Created).then(|| "Q-1".to_string()),
            latency_ms,
            error_kind: None,
            reason: None,
            created_at: Utc.with_ymd_and_hms(2026, 3, 1, 9, minute, 0).unwrap(),
        }
    }

    #[tokio::test]
    async fn record_and_list_recent_preserves_snapshot() {
        let store = memory_store().await;
        let mut original = event(
            OutcomeStatus::Incomplete,
            Some(vec![MissingReason::Stock("Widget-B".into())]),
            Some(42),
            0,
        );
        original.error_kind = Some(ErrorKind::Notify);
        original.reason = Some("delivery failed: refused".into());
        store.record(&original).await.unwrap();

        let listed = store.list_recent(10).await.unwrap();
        assert_eq!(listed, vec![original]);
        // Insertion order of the maps survives storage.
        let skus: Vec<&str> = listed[0].availability.iter().map(|(k, _)| k).collect();
        assert_eq!(skus, vec!["Widget A", "Widget-B"]);
    }

    #[tokio::test]
    async fn list_recent_is_newest_first_and_limited() {
        let store = memory_store().await;
        let older = event(OutcomeStatus::Created, None, Some(10), 1);
        let newer = event(OutcomeStatus::Error, None, Some(20), 2);
        store.record(&older).await.unwrap();
        store.record(&newer).await.unwrap();

        let listed = store.list_recent(1).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, newer.id);
    }

    #[tokio::test]
    async fn aggregates_over_empty_store() {
        let store = memory_store().await;
        assert_eq!(store.count_events().await.unwrap(), 0);
        assert!(store.counts_by_status().await.unwrap().is_empty());
        assert!(store.top_missing_reasons(5).await.unwrap().is_empty());
        assert_eq!(store.average_latency_ms().await.unwrap(), None);
    }

    #[tokio::test]
    async fn aggregates_count_status_reasons_and_latency() {
        let store = memory_store().await;
        let stock_b = MissingReason::Stock("Widget-B".into());
        for e in [
            event(OutcomeStatus::Created, None, Some(100), 0),
            event(OutcomeStatus::Incomplete, Some(vec![MissingReason::Items]), Some(50), 1),
            event(
                OutcomeStatus::Incomplete,
                Some(vec![MissingReason::CustomerId, stock_b.clone()]),
                Some(30),
                2,
            ),
            event(OutcomeStatus::Incomplete, Some(vec![stock_b]), None, 3),
            event(OutcomeStatus::Error, None, Some(20), 4),
        ] {
            store.record(&e).await.unwrap();
        }

        assert_eq!(store.count_events().await.unwrap(), 5);

        let by_status = store.counts_by_status().await.unwrap();
        assert_eq!(by_status.get("created"), Some(&1));
        assert_eq!(by_status.get("incomplete"), Some(&3));
        assert_eq!(by_status.get("error"), Some(&1));

        let top = store.top_missing_reasons(2).await.unwrap();
        assert_eq!(
            top,
            vec![
                ReasonCount { reason: "stock:Widget-B".into(), count: 2 },
                // "customer_id" and "items" tie at 1; ascending order wins.
                ReasonCount { reason: "customer_id".into(), count: 1 },
            ]
        );
        assert!(store.top_missing_reasons(0).await.unwrap().is_empty());

        // (100 + 50 + 30 + 20) / 4, the event without latency is skipped.
        assert_eq!(store.average_latency_ms().await.unwrap(), Some(50.0));
    }

    #[tokio::test]
    async fn busy_pool_fails_fast() {
        let config = StoreConfig {
            max_connections: 1,
            acquire_timeout: Duration::from_millis(50),
            ..StoreConfig::default()
        };
        let store = LibSqlEventStore::new_memory(&config).await.unwrap();
        let _held = store.permits.acquire().await.unwrap();

        let err = store
            .record(&event(OutcomeStatus::Created, None, Some(1), 0))
            .await
            .unwrap_err();
        assert!(matches!(err, DatabaseError::Pool(_)));
    }

    #[tokio::test]
    async fn closed_store_rejects_operations() {
        let store = memory_store().await;
        store.close().await;

        let err = store.count_events().await.unwrap_err();
        assert!(matches!(err, DatabaseError::Pool(_)));
    }

    #[tokio::test]
    async fn file_store_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let config = StoreConfig {
            path: dir.path().join("nested").join("events.db"),
            ..StoreConfig::default()
        };

        let recorded = event(OutcomeStatus::Created, None, Some(7), 0);
        {
            let store = LibSqlEventStore::new_local(&config).await.unwrap();
            store.record(&recorded).await.unwrap();
            store.close().await;
        }

        let reopened = LibSqlEventStore::new_local(&config).await.unwrap();
        assert_eq!(reopened.count_events().await.unwrap(), 1);
        assert_eq!(reopened.list_recent(5).await.unwrap()[0].id, recorded.id);
    }

    #[test]
    fn sku_map_json_is_ordered_object() {
        let map: SkuMap<bool> = [("b", true), ("a", false)].into_iter().collect();
        assert_eq!(to_json(&map).unwrap(), r#"{"b":true,"a":false}"#);
    }
}
