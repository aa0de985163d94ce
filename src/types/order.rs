use serde::{Deserialize, Serialize};
use specta::Type;

#[derive(Debug, Clone, Serialize, Deserialize, Type)]
pub struct Order {
    pub id: String,
    pub user_id: String,
    pub status: OrderStatus,
    /// Minor currency units.
    pub amount: i64,
    pub currency: String,
    pub created_at: String,
    pub updated_at: String,
}

/// Orders only move forward: `pending -> {paid, failed} -> cancelled`, and
/// `paid -> refunded`. Nothing returns to `pending`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Type, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Paid,
    Failed,
    Cancelled,
    Refunded,
}
