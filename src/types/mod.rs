pub mod ack;
pub mod api_error;
pub mod inspector;
pub mod order;
pub mod payment;
pub mod webhook_event;

#[allow(unused_imports)]
pub use ack::{AckOutcome, AckResponse};
#[allow(unused_imports)]
pub use api_error::{ApiErrorCode, ApiErrorResponse};
#[allow(unused_imports)]
pub use inspector::{
    AnomalyKind, AnomalyRecord, ListAnomaliesResponse, ListProcessedEventsResponse,
    ProcessedEventRecord, ProcessedOutcome,
};
#[allow(unused_imports)]
pub use order::{Order, OrderStatus};
#[allow(unused_imports)]
pub use payment::{Payment, PaymentStatus};
#[allow(unused_imports)]
pub use webhook_event::{EventKind, PaymentPayload, WebhookEvent};
