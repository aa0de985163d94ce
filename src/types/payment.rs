use serde::{Deserialize, Serialize};
use specta::Type;
use uuid::Uuid;

/// One row per distinct processor payment attempt. `processor_payment_id` is
/// unique across the table.
#[derive(Debug, Clone, Serialize, Deserialize, Type)]
pub struct Payment {
    pub id: Uuid,
    pub order_id: String,
    pub processor_payment_id: String,
    pub status: PaymentStatus,
    pub amount: Option<i64>,
    pub currency: Option<String>,
    pub raw_verified_payload: String,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Type, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Created,
    Captured,
    Failed,
    Refunded,
}
