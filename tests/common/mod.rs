#![allow(clippy::expect_used, clippy::unwrap_used, dead_code)]

use std::{fs, time::Duration};

use async_trait::async_trait;
use chrono::Utc;
use payment_receiver::{
    reconcile::{
        Correlation, EventClaim, NewAnomaly, PaymentStore, PaymentUpsert, SqliteStore,
        StoreError, TransitionResult,
    },
    types::{Order, OrderStatus, Payment, ProcessedOutcome, WebhookEvent},
    webhook::{ParsedEvent, parse_event},
};
use serde_json::json;
use sqlx::{
    Connection, SqliteConnection, SqlitePool,
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions},
};
use std::sync::{
    Arc,
    atomic::{AtomicBool, AtomicUsize, Ordering},
};
use tempfile::NamedTempFile;

pub struct TestDb {
    pub pool: SqlitePool,
    _db_file: NamedTempFile,
}

pub async fn setup_db() -> TestDb {
    setup_db_shared(1).await
}

pub async fn setup_db_shared(max_connections: u32) -> TestDb {
    let db_file = NamedTempFile::new().expect("create temp sqlite file");
    let options = SqliteConnectOptions::new()
        .filename(db_file.path())
        .create_if_missing(true)
        .foreign_keys(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_secs(5));

    let mut conn = SqliteConnection::connect_with(&options)
        .await
        .expect("connect sqlite for migrations");
    run_migrations(&mut conn).await.expect("run migrations");
    conn.close().await.expect("close migration conn");

    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections)
        .connect_with(options)
        .await
        .expect("connect sqlite");

    TestDb {
        pool,
        _db_file: db_file,
    }
}

async fn run_migrations(conn: &mut SqliteConnection) -> Result<(), sqlx::Error> {
    let mut entries: Vec<_> = fs::read_dir("migrations")
        .map_err(sqlx::Error::Io)?
        .filter_map(|e| e.ok())
        .filter(|e| e.path().extension().and_then(|ext| ext.to_str()) == Some("sql"))
        .collect();
    entries.sort_by_key(|e| e.file_name());

    for entry in entries {
        let contents = fs::read_to_string(entry.path()).map_err(sqlx::Error::Io)?;
        for stmt in contents.split(';') {
            let stmt = stmt.trim();
            if !stmt.is_empty() {
                sqlx::query(stmt).execute(&mut *conn).await?;
            }
        }
    }
    Ok(())
}

pub async fn seed_order(pool: &SqlitePool, id: &str, status: &str) {
    let now = Utc::now().to_rfc3339();
    sqlx::query(
        r#"
        INSERT INTO orders (id, user_id, status, amount, currency, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(id)
    .bind("user_1")
    .bind(status)
    .bind(4_200_i64)
    .bind("usd")
    .bind(&now)
    .bind(&now)
    .execute(pool)
    .await
    .expect("insert order");
}

pub async fn seed_payment(pool: &SqlitePool, order_id: &str, processor_payment_id: &str, status: &str) {
    let now = Utc::now().to_rfc3339();
    sqlx::query(
        r#"
        INSERT INTO payments (
            id, order_id, processor_payment_id, status, amount, currency,
            raw_verified_payload, created_at, updated_at
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(uuid::Uuid::new_v4().to_string())
    .bind(order_id)
    .bind(processor_payment_id)
    .bind(status)
    .bind(4_200_i64)
    .bind("usd")
    .bind("{}")
    .bind(&now)
    .bind(&now)
    .execute(pool)
    .await
    .expect("insert payment");
}

pub async fn order_status(pool: &SqlitePool, id: &str) -> String {
    sqlx::query_scalar("SELECT status FROM orders WHERE id = ?")
        .bind(id)
        .fetch_one(pool)
        .await
        .expect("fetch order status")
}

pub async fn payment_statuses(pool: &SqlitePool, processor_payment_id: &str) -> Vec<String> {
    sqlx::query_scalar("SELECT status FROM payments WHERE processor_payment_id = ?")
        .bind(processor_payment_id)
        .fetch_all(pool)
        .await
        .expect("fetch payments")
}

pub async fn count_rows(pool: &SqlitePool, table: &str) -> i64 {
    sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {table}"))
        .fetch_one(pool)
        .await
        .expect("count rows")
}

pub async fn marker_outcome(pool: &SqlitePool, event_id: &str) -> Option<String> {
    sqlx::query_scalar("SELECT outcome FROM processed_events WHERE event_id = ?")
        .bind(event_id)
        .fetch_optional(pool)
        .await
        .expect("fetch marker")
}

pub fn event_body(
    event_id: &str,
    event_type: &str,
    order_id: Option<&str>,
    payment_id: &str,
) -> Vec<u8> {
    let mut data = json!({
        "payment_id": payment_id,
        "amount": 4200,
        "currency": "USD",
    });
    if let Some(order_id) = order_id {
        data["order_id"] = json!(order_id);
    }
    serde_json::to_vec(&json!({
        "id": event_id,
        "type": event_type,
        "created_at": 1_700_000_000,
        "data": data,
    }))
    .expect("serialize event")
}

pub fn event(event_id: &str, event_type: &str, order_id: Option<&str>, payment_id: &str) -> (WebhookEvent, Vec<u8>) {
    let body = event_body(event_id, event_type, order_id, payment_id);
    match parse_event(&body).expect("parse event") {
        ParsedEvent::Supported(event) => (event, body),
        ParsedEvent::Unsupported { event_type, .. } => {
            unreachable!("unsupported test event type {event_type}")
        }
    }
}

/// Delegates to `SqliteStore`, optionally stalling the first payment upsert
/// and counting how often the store is entered.
#[derive(Clone)]
pub struct InstrumentedStore {
    pub inner: SqliteStore,
    pub begins: Arc<AtomicUsize>,
    stall_first_upsert: Option<Duration>,
    stalled: Arc<AtomicBool>,
}

impl InstrumentedStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            inner: SqliteStore::new(pool),
            begins: Arc::new(AtomicUsize::new(0)),
            stall_first_upsert: None,
            stalled: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn stalling_first_upsert(pool: SqlitePool, stall: Duration) -> Self {
        Self {
            stall_first_upsert: Some(stall),
            ..Self::new(pool)
        }
    }

    pub fn begin_count(&self) -> usize {
        self.begins.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PaymentStore for InstrumentedStore {
    type Tx = <SqliteStore as PaymentStore>::Tx;

    async fn begin(&self) -> Result<Self::Tx, StoreError> {
        self.begins.fetch_add(1, Ordering::SeqCst);
        self.inner.begin().await
    }

    async fn commit(&self, tx: Self::Tx) -> Result<(), StoreError> {
        self.inner.commit(tx).await
    }

    async fn rollback(&self, tx: Self::Tx) -> Result<(), StoreError> {
        self.inner.rollback(tx).await
    }

    async fn record_processed_event(
        &self,
        tx: &mut Self::Tx,
        event: &WebhookEvent,
    ) -> Result<EventClaim, StoreError> {
        self.inner.record_processed_event(tx, event).await
    }

    async fn complete_processed_event(
        &self,
        tx: &mut Self::Tx,
        event_id: &str,
        outcome: ProcessedOutcome,
        order_id: &str,
    ) -> Result<(), StoreError> {
        self.inner
            .complete_processed_event(tx, event_id, outcome, order_id)
            .await
    }

    async fn find_order(
        &self,
        tx: &mut Self::Tx,
        correlation: &Correlation,
    ) -> Result<Option<Order>, StoreError> {
        self.inner.find_order(tx, correlation).await
    }

    async fn upsert_payment(
        &self,
        tx: &mut Self::Tx,
        upsert: &PaymentUpsert<'_>,
    ) -> Result<Payment, StoreError> {
        if let Some(stall) = self.stall_first_upsert
            && !self.stalled.swap(true, Ordering::SeqCst)
        {
            tokio::time::sleep(stall).await;
        }
        self.inner.upsert_payment(tx, upsert).await
    }

    async fn transition_order(
        &self,
        tx: &mut Self::Tx,
        order_id: &str,
        from: OrderStatus,
        to: OrderStatus,
    ) -> Result<TransitionResult, StoreError> {
        self.inner.transition_order(tx, order_id, from, to).await
    }

    async fn record_anomaly(&self, anomaly: &NewAnomaly<'_>) -> Result<(), StoreError> {
        self.inner.record_anomaly(anomaly).await
    }
}
