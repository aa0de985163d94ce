use std::time::Duration;

use tracing::{error, info};

use crate::reconcile::machine::{TransitionPlan, plan_transition};
use crate::reconcile::store::{
    Correlation, EventClaim, NewAnomaly, PaymentStore, PaymentUpsert, StoreError,
    TransitionResult,
};
use crate::types::{AnomalyKind, OrderStatus, Payment, ProcessedOutcome, WebhookEvent};

#[derive(Debug)]
pub enum ReconcileOutcome {
    Applied {
        order_id: String,
        order_status: OrderStatus,
        payment: Payment,
    },
    Ignored(IgnoreReason),
    Failed(FailureReason),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IgnoreReason {
    Duplicate,
    StaleTransition {
        order_id: String,
        current: OrderStatus,
    },
}

#[derive(Debug)]
pub enum FailureReason {
    OrderNotFound { correlation: Correlation },
    Store(StoreError),
}

impl FailureReason {
    /// Whether a redelivery of the same event can succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, FailureReason::Store(_))
    }
}

/// Apply `event` to the store as one atomic unit of work bounded by `timeout`.
///
/// The idempotency marker, the order transition and the payment upsert
/// commit together or not at all. A timeout drops the transaction, which
/// rolls it back, and surfaces as a retryable `Failed`.
pub async fn reconcile<S: PaymentStore>(
    store: &S,
    event: &WebhookEvent,
    raw_body: &[u8],
    timeout: Duration,
) -> ReconcileOutcome {
    let outcome = match tokio::time::timeout(timeout, apply_event(store, event, raw_body)).await {
        Ok(Ok(outcome)) => outcome,
        Ok(Err(err)) => ReconcileOutcome::Failed(FailureReason::Store(err)),
        Err(_) => ReconcileOutcome::Failed(FailureReason::Store(StoreError::Timeout(timeout))),
    };

    log_outcome(event, &outcome);

    if let ReconcileOutcome::Failed(FailureReason::OrderNotFound { correlation }) = &outcome {
        flag_missing_order(store, event, correlation, timeout).await;
    }

    outcome
}

async fn apply_event<S: PaymentStore>(
    store: &S,
    event: &WebhookEvent,
    raw_body: &[u8],
) -> Result<ReconcileOutcome, StoreError> {
    let mut tx = store.begin().await?;

    // Claimed first so a concurrent duplicate waits on the write lock and
    // then sees the conflict.
    if store.record_processed_event(&mut tx, event).await? == EventClaim::AlreadyProcessed {
        store.rollback(tx).await?;
        return Ok(ReconcileOutcome::Ignored(IgnoreReason::Duplicate));
    }

    let correlation = Correlation::for_event(event);
    let Some(order) = store.find_order(&mut tx, &correlation).await? else {
        // Not marking the event lets an operator replay it once the order exists.
        store.rollback(tx).await?;
        return Ok(ReconcileOutcome::Failed(FailureReason::OrderNotFound {
            correlation,
        }));
    };

    let (from, to, payment_status) = match plan_transition(event.kind, order.status) {
        TransitionPlan::Apply {
            from,
            to,
            payment_status,
        } => (from, to, payment_status),
        TransitionPlan::Stale => {
            return finish_stale(store, tx, event, order.id, order.status).await;
        }
    };

    if store.transition_order(&mut tx, &order.id, from, to).await? == TransitionResult::Conflict {
        let current = store
            .find_order(&mut tx, &Correlation::OrderId(order.id.clone()))
            .await?
            .map_or(order.status, |order| order.status);
        return finish_stale(store, tx, event, order.id, current).await;
    }

    let raw_verified_payload = String::from_utf8_lossy(raw_body);
    let payment = store
        .upsert_payment(
            &mut tx,
            &PaymentUpsert {
                order_id: &order.id,
                processor_payment_id: &event.payload.processor_payment_id,
                status: payment_status,
                amount: event.payload.amount,
                currency: event.payload.currency.as_deref(),
                raw_verified_payload: &raw_verified_payload,
            },
        )
        .await?;

    store
        .complete_processed_event(&mut tx, &event.event_id, ProcessedOutcome::Applied, &order.id)
        .await?;
    store.commit(tx).await?;

    Ok(ReconcileOutcome::Applied {
        order_id: order.id,
        order_status: to,
        payment,
    })
}

async fn finish_stale<S: PaymentStore>(
    store: &S,
    mut tx: S::Tx,
    event: &WebhookEvent,
    order_id: String,
    current: OrderStatus,
) -> Result<ReconcileOutcome, StoreError> {
    store
        .complete_processed_event(
            &mut tx,
            &event.event_id,
            ProcessedOutcome::StaleTransition,
            &order_id,
        )
        .await?;
    store.commit(tx).await?;

    Ok(ReconcileOutcome::Ignored(IgnoreReason::StaleTransition {
        order_id,
        current,
    }))
}

async fn flag_missing_order<S: PaymentStore>(
    store: &S,
    event: &WebhookEvent,
    correlation: &Correlation,
    timeout: Duration,
) {
    let detail = match correlation {
        Correlation::OrderId(_) => "no order with this id",
        Correlation::ProcessorPaymentId(_) => "no payment row links this processor payment id",
    };
    let anomaly = NewAnomaly {
        event_id: &event.event_id,
        event_type: event.kind.wire_name(),
        kind: AnomalyKind::OrderNotFound,
        correlation_id: correlation.id(),
        detail,
    };

    match tokio::time::timeout(timeout, store.record_anomaly(&anomaly)).await {
        Ok(Ok(())) => {}
        Ok(Err(err)) => {
            error!(event_id = %event.event_id, error = %err, "failed to record webhook anomaly");
        }
        Err(_) => {
            error!(event_id = %event.event_id, "timed out recording webhook anomaly");
        }
    }
}

fn log_outcome(event: &WebhookEvent, outcome: &ReconcileOutcome) {
    let event_id = event.event_id.as_str();
    let event_type = event.kind.wire_name();
    match outcome {
        ReconcileOutcome::Applied {
            order_id,
            order_status,
            payment,
        } => info!(
            event_id,
            event_type,
            order_id = %order_id,
            order_status = ?order_status,
            processor_payment_id = %payment.processor_payment_id,
            "payment event applied"
        ),
        ReconcileOutcome::Ignored(IgnoreReason::Duplicate) => {
            info!(event_id, event_type, "duplicate delivery ignored");
        }
        ReconcileOutcome::Ignored(IgnoreReason::StaleTransition { order_id, current }) => info!(
            event_id,
            event_type,
            order_id = %order_id,
            current = ?current,
            "stale transition ignored"
        ),
        ReconcileOutcome::Failed(FailureReason::OrderNotFound { correlation }) => error!(
            event_id,
            event_type,
            correlation_id = correlation.id(),
            "no order matches payment event"
        ),
        ReconcileOutcome::Failed(FailureReason::Store(StoreError::Timeout(timeout))) => error!(
            event_id,
            event_type,
            timeout_ms = timeout.as_millis() as u64,
            "reconciliation timed out; processor will retry"
        ),
        ReconcileOutcome::Failed(FailureReason::Store(err)) => {
            error!(event_id, event_type, error = %err, "reconciliation failed");
        }
    }
}
