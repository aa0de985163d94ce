use serde::{Deserialize, Serialize};
use specta::Type;

/// A verified, decoded processor notification. Only its effects are
/// persisted; `event_id` is kept as the idempotency key.
#[derive(Debug, Clone, Serialize, Deserialize, Type)]
pub struct WebhookEvent {
    pub event_id: String,
    pub kind: EventKind,
    /// RFC 3339, UTC.
    pub occurred_at: String,
    pub payload: PaymentPayload,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Type, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    PaymentCaptured,
    PaymentFailed,
    RefundProcessed,
}

impl EventKind {
    /// The processor's name for this kind on the wire.
    pub fn wire_name(self) -> &'static str {
        match self {
            EventKind::PaymentCaptured => "payment.captured",
            EventKind::PaymentFailed => "payment.failed",
            EventKind::RefundProcessed => "refund.processed",
        }
    }

    pub fn from_wire_name(value: &str) -> Option<Self> {
        match value {
            "payment.captured" => Some(EventKind::PaymentCaptured),
            "payment.failed" => Some(EventKind::PaymentFailed),
            "refund.processed" => Some(EventKind::RefundProcessed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Type)]
pub struct PaymentPayload {
    /// Local order id, when the processor echoes it back.
    pub order_id: Option<String>,
    pub processor_payment_id: String,
    pub amount: Option<i64>,
    pub currency: Option<String>,
    pub failure_reason: Option<String>,
}
