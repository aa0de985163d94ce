use serde::{Deserialize, Serialize};
use specta::Type;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, Type)]
pub struct ProcessedEventRecord {
    pub event_id: String,
    pub event_type: String,
    pub outcome: ProcessedOutcome,
    pub order_id: Option<String>,
    pub processor_payment_id: String,
    pub occurred_at: String,
    pub processed_at: String,
}

/// Outcome stored alongside the idempotency marker.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Type, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ProcessedOutcome {
    Applied,
    StaleTransition,
}

#[derive(Debug, Clone, Serialize, Deserialize, Type)]
pub struct AnomalyRecord {
    pub id: Uuid,
    pub event_id: String,
    pub event_type: String,
    pub kind: AnomalyKind,
    pub correlation_id: String,
    pub detail: String,
    pub recorded_at: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Type, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyKind {
    OrderNotFound,
}

#[derive(Debug, Clone, Serialize, Deserialize, Type)]
pub struct ListProcessedEventsResponse {
    pub events: Vec<ProcessedEventRecord>,
    pub next_before: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Type)]
pub struct ListAnomaliesResponse {
    pub anomalies: Vec<AnomalyRecord>,
    pub next_before: Option<String>,
}
