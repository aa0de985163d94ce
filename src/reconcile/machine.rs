use crate::types::{EventKind, OrderStatus, PaymentStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionPlan {
    Apply {
        from: OrderStatus,
        to: OrderStatus,
        payment_status: PaymentStatus,
    },
    /// The event no longer applies to the order's current status. Recorded as
    /// processed, never applied.
    Stale,
}

/// Decide what `kind` does to an order currently in `current`.
///
/// Only `pending -> paid`, `pending -> failed` and `paid -> refunded` apply.
/// Everything else, including a capture landing on a `failed` order, is a
/// stale transition.
pub fn plan_transition(kind: EventKind, current: OrderStatus) -> TransitionPlan {
    match (kind, current) {
        (EventKind::PaymentCaptured, OrderStatus::Pending) => TransitionPlan::Apply {
            from: current,
            to: OrderStatus::Paid,
            payment_status: PaymentStatus::Captured,
        },
        (EventKind::PaymentFailed, OrderStatus::Pending) => TransitionPlan::Apply {
            from: current,
            to: OrderStatus::Failed,
            payment_status: PaymentStatus::Failed,
        },
        (EventKind::RefundProcessed, OrderStatus::Paid) => TransitionPlan::Apply {
            from: current,
            to: OrderStatus::Refunded,
            payment_status: PaymentStatus::Refunded,
        },
        _ => TransitionPlan::Stale,
    }
}
