use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::{Sqlite, SqlitePool, Transaction};
use uuid::Uuid;

use crate::types::{
    AnomalyKind, Order, OrderStatus, Payment, PaymentStatus, ProcessedOutcome, WebhookEvent,
};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Db(#[from] sqlx::Error),
    #[error("store call timed out after {0:?}")]
    Timeout(Duration),
    #[error("invalid stored value: {0}")]
    Parse(String),
}

/// The processor-provided identifier used to find the order an event refers to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Correlation {
    OrderId(String),
    /// Resolved through an existing payment row.
    ProcessorPaymentId(String),
}

impl Correlation {
    pub fn for_event(event: &WebhookEvent) -> Self {
        match event.payload.order_id.as_deref() {
            Some(order_id) => Correlation::OrderId(order_id.to_string()),
            None => Correlation::ProcessorPaymentId(event.payload.processor_payment_id.clone()),
        }
    }

    pub fn id(&self) -> &str {
        match self {
            Correlation::OrderId(id) | Correlation::ProcessorPaymentId(id) => id,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventClaim {
    Claimed,
    AlreadyProcessed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionResult {
    Applied,
    /// The order was no longer in the expected `from` status.
    Conflict,
}

#[derive(Debug, Clone)]
pub struct PaymentUpsert<'a> {
    pub order_id: &'a str,
    pub processor_payment_id: &'a str,
    pub status: PaymentStatus,
    pub amount: Option<i64>,
    pub currency: Option<&'a str>,
    pub raw_verified_payload: &'a str,
}

#[derive(Debug, Clone)]
pub struct NewAnomaly<'a> {
    pub event_id: &'a str,
    pub event_type: &'a str,
    pub kind: AnomalyKind,
    pub correlation_id: &'a str,
    pub detail: &'a str,
}

/// Storage consumed by the reconciliation engine.
///
/// Every mutating call takes `&mut Self::Tx`. The lifecycle is `begin`, any
/// number of calls against the transaction, then `commit` or `rollback`.
/// Dropping a transaction without committing MUST roll it back, so an
/// abandoned unit of work (error, timeout) never leaves a partial write.
///
/// Concurrency control comes from the store itself: the unique key on the
/// processed-event marker and the compare-and-swap in `transition_order`.
#[async_trait]
pub trait PaymentStore: Send + Sync + 'static {
    type Tx: Send;

    async fn begin(&self) -> Result<Self::Tx, StoreError>;

    async fn commit(&self, tx: Self::Tx) -> Result<(), StoreError>;

    async fn rollback(&self, tx: Self::Tx) -> Result<(), StoreError>;

    /// Claim the idempotency marker for `event`. Returns
    /// `EventClaim::AlreadyProcessed` when another committed (or in-flight)
    /// transaction holds it.
    async fn record_processed_event(
        &self,
        tx: &mut Self::Tx,
        event: &WebhookEvent,
    ) -> Result<EventClaim, StoreError>;

    /// Stamp the final outcome on a marker claimed in the same transaction.
    async fn complete_processed_event(
        &self,
        tx: &mut Self::Tx,
        event_id: &str,
        outcome: ProcessedOutcome,
        order_id: &str,
    ) -> Result<(), StoreError>;

    async fn find_order(
        &self,
        tx: &mut Self::Tx,
        correlation: &Correlation,
    ) -> Result<Option<Order>, StoreError>;

    /// Insert or update the payment keyed on `processor_payment_id`.
    async fn upsert_payment(
        &self,
        tx: &mut Self::Tx,
        upsert: &PaymentUpsert<'_>,
    ) -> Result<Payment, StoreError>;

    /// Compare-and-swap on the order status.
    async fn transition_order(
        &self,
        tx: &mut Self::Tx,
        order_id: &str,
        from: OrderStatus,
        to: OrderStatus,
    ) -> Result<TransitionResult, StoreError>;

    /// Written outside any reconciliation transaction.
    async fn record_anomaly(&self, anomaly: &NewAnomaly<'_>) -> Result<(), StoreError>;
}

#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl PaymentStore for SqliteStore {
    type Tx = Transaction<'static, Sqlite>;

    async fn begin(&self) -> Result<Self::Tx, StoreError> {
        Ok(self.pool.begin().await?)
    }

    async fn commit(&self, tx: Self::Tx) -> Result<(), StoreError> {
        tx.commit().await?;
        Ok(())
    }

    async fn rollback(&self, tx: Self::Tx) -> Result<(), StoreError> {
        tx.rollback().await?;
        Ok(())
    }

    async fn record_processed_event(
        &self,
        tx: &mut Self::Tx,
        event: &WebhookEvent,
    ) -> Result<EventClaim, StoreError> {
        let result = sqlx::query(
            r#"
            INSERT INTO processed_events (
                event_id,
                event_type,
                outcome,
                order_id,
                processor_payment_id,
                occurred_at,
                processed_at
            )
            VALUES (?, ?, 'in_progress', ?, ?, ?, ?)
            ON CONFLICT(event_id) DO NOTHING
            "#,
        )
        .bind(&event.event_id)
        .bind(event.kind.wire_name())
        .bind(event.payload.order_id.as_deref())
        .bind(&event.payload.processor_payment_id)
        .bind(&event.occurred_at)
        .bind(format_utc(Utc::now()))
        .execute(&mut **tx)
        .await?;

        if result.rows_affected() == 0 {
            return Ok(EventClaim::AlreadyProcessed);
        }
        Ok(EventClaim::Claimed)
    }

    async fn complete_processed_event(
        &self,
        tx: &mut Self::Tx,
        event_id: &str,
        outcome: ProcessedOutcome,
        order_id: &str,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE processed_events
            SET outcome = ?,
                order_id = ?,
                processed_at = ?
            WHERE event_id = ?
            "#,
        )
        .bind(processed_outcome_to_str(outcome))
        .bind(order_id)
        .bind(format_utc(Utc::now()))
        .bind(event_id)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    async fn find_order(
        &self,
        tx: &mut Self::Tx,
        correlation: &Correlation,
    ) -> Result<Option<Order>, StoreError> {
        let row = match correlation {
            Correlation::OrderId(order_id) => {
                sqlx::query_as::<_, OrderRow>(
                    r#"
                    SELECT id, user_id, status, amount, currency, created_at, updated_at
                    FROM orders
                    WHERE id = ?
                    "#,
                )
                .bind(order_id)
                .fetch_optional(&mut **tx)
                .await?
            }
            Correlation::ProcessorPaymentId(processor_payment_id) => {
                sqlx::query_as::<_, OrderRow>(
                    r#"
                    SELECT o.id, o.user_id, o.status, o.amount, o.currency, o.created_at, o.updated_at
                    FROM orders o
                    JOIN payments p ON p.order_id = o.id
                    WHERE p.processor_payment_id = ?
                    "#,
                )
                .bind(processor_payment_id)
                .fetch_optional(&mut **tx)
                .await?
            }
        };

        row.map(Order::try_from).transpose()
    }

    async fn upsert_payment(
        &self,
        tx: &mut Self::Tx,
        upsert: &PaymentUpsert<'_>,
    ) -> Result<Payment, StoreError> {
        let now_str = format_utc(Utc::now());
        let row = sqlx::query_as::<_, PaymentRow>(
            r#"
            INSERT INTO payments (
                id,
                order_id,
                processor_payment_id,
                status,
                amount,
                currency,
                raw_verified_payload,
                created_at,
                updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(processor_payment_id) DO UPDATE SET
                status = excluded.status,
                amount = COALESCE(payments.amount, excluded.amount),
                currency = COALESCE(payments.currency, excluded.currency),
                raw_verified_payload = excluded.raw_verified_payload,
                updated_at = excluded.updated_at
            RETURNING
                id,
                order_id,
                processor_payment_id,
                status,
                amount,
                currency,
                raw_verified_payload,
                created_at,
                updated_at
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(upsert.order_id)
        .bind(upsert.processor_payment_id)
        .bind(payment_status_to_str(upsert.status))
        .bind(upsert.amount)
        .bind(upsert.currency)
        .bind(upsert.raw_verified_payload)
        .bind(&now_str)
        .bind(&now_str)
        .fetch_one(&mut **tx)
        .await?;

        Payment::try_from(row)
    }

    async fn transition_order(
        &self,
        tx: &mut Self::Tx,
        order_id: &str,
        from: OrderStatus,
        to: OrderStatus,
    ) -> Result<TransitionResult, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE orders
            SET status = ?,
                updated_at = ?
            WHERE id = ?
              AND status = ?
            "#,
        )
        .bind(order_status_to_str(to))
        .bind(format_utc(Utc::now()))
        .bind(order_id)
        .bind(order_status_to_str(from))
        .execute(&mut **tx)
        .await?;

        if result.rows_affected() == 0 {
            return Ok(TransitionResult::Conflict);
        }
        Ok(TransitionResult::Applied)
    }

    async fn record_anomaly(&self, anomaly: &NewAnomaly<'_>) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO webhook_anomalies (
                id,
                event_id,
                event_type,
                kind,
                correlation_id,
                detail,
                recorded_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(anomaly.event_id)
        .bind(anomaly.event_type)
        .bind(anomaly_kind_to_str(anomaly.kind))
        .bind(anomaly.correlation_id)
        .bind(anomaly.detail)
        .bind(format_utc(Utc::now()))
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[derive(sqlx::FromRow)]
struct OrderRow {
    id: String,
    user_id: String,
    status: String,
    amount: i64,
    currency: String,
    created_at: String,
    updated_at: String,
}

impl TryFrom<OrderRow> for Order {
    type Error = StoreError;

    fn try_from(row: OrderRow) -> Result<Self, Self::Error> {
        Ok(Order {
            status: parse_order_status(&row.status)?,
            id: row.id,
            user_id: row.user_id,
            amount: row.amount,
            currency: row.currency,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct PaymentRow {
    id: String,
    order_id: String,
    processor_payment_id: String,
    status: String,
    amount: Option<i64>,
    currency: Option<String>,
    raw_verified_payload: String,
    created_at: String,
    updated_at: String,
}

impl TryFrom<PaymentRow> for Payment {
    type Error = StoreError;

    fn try_from(row: PaymentRow) -> Result<Self, Self::Error> {
        Ok(Payment {
            id: Uuid::parse_str(&row.id)
                .map_err(|err| StoreError::Parse(format!("invalid payment id: {err}")))?,
            status: parse_payment_status(&row.status)?,
            order_id: row.order_id,
            processor_payment_id: row.processor_payment_id,
            amount: row.amount,
            currency: row.currency,
            raw_verified_payload: row.raw_verified_payload,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

pub(crate) fn order_status_to_str(status: OrderStatus) -> &'static str {
    match status {
        OrderStatus::Pending => "pending",
        OrderStatus::Paid => "paid",
        OrderStatus::Failed => "failed",
        OrderStatus::Cancelled => "cancelled",
        OrderStatus::Refunded => "refunded",
    }
}

fn parse_order_status(status: &str) -> Result<OrderStatus, StoreError> {
    match status {
        "pending" => Ok(OrderStatus::Pending),
        "paid" => Ok(OrderStatus::Paid),
        "failed" => Ok(OrderStatus::Failed),
        "cancelled" => Ok(OrderStatus::Cancelled),
        "refunded" => Ok(OrderStatus::Refunded),
        other => Err(StoreError::Parse(format!("unknown order status: {other}"))),
    }
}

fn payment_status_to_str(status: PaymentStatus) -> &'static str {
    match status {
        PaymentStatus::Created => "created",
        PaymentStatus::Captured => "captured",
        PaymentStatus::Failed => "failed",
        PaymentStatus::Refunded => "refunded",
    }
}

fn parse_payment_status(status: &str) -> Result<PaymentStatus, StoreError> {
    match status {
        "created" => Ok(PaymentStatus::Created),
        "captured" => Ok(PaymentStatus::Captured),
        "failed" => Ok(PaymentStatus::Failed),
        "refunded" => Ok(PaymentStatus::Refunded),
        other => Err(StoreError::Parse(format!("unknown payment status: {other}"))),
    }
}

fn processed_outcome_to_str(outcome: ProcessedOutcome) -> &'static str {
    match outcome {
        ProcessedOutcome::Applied => "applied",
        ProcessedOutcome::StaleTransition => "stale_transition",
    }
}

fn anomaly_kind_to_str(kind: AnomalyKind) -> &'static str {
    match kind {
        AnomalyKind::OrderNotFound => "order_not_found",
    }
}

pub(crate) fn format_utc(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Millis, true)
}
