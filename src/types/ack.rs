use serde::{Deserialize, Serialize};
use specta::Type;

/// Body of every 200 response. Anything acknowledged here will not be
/// retried by the processor.
#[derive(Debug, Clone, Serialize, Deserialize, Type)]
pub struct AckResponse {
    pub received: bool,
    pub outcome: AckOutcome,
    pub event_id: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Type, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AckOutcome {
    Applied,
    Duplicate,
    StaleTransition,
    OrderNotFound,
    ParseError,
    UnsupportedEvent,
}
