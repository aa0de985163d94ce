use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};

use crate::reconcile::{FailureReason, IgnoreReason, ReconcileOutcome, StoreError};
use crate::types::{AckOutcome, AckResponse, ApiErrorCode, ApiErrorResponse};
use crate::webhook::gate::RejectReason;

/// What the processor is told. The status code alone drives its retry
/// behaviour: 200 stops retries, 5xx schedules one, 4xx gives up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Ack {
    Handled(AckOutcome, Option<String>),
    Rejected(Rejection),
    Retry(RetryReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    UntrustedOrigin,
    RateLimited,
    SignatureInvalid,
    PayloadTooLarge,
    /// The body could not be read off the connection.
    UnreadableBody,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryReason {
    StoreTimeout,
    StoreFault,
}

impl From<RejectReason> for Rejection {
    fn from(reason: RejectReason) -> Self {
        match reason {
            RejectReason::UntrustedOrigin => Rejection::UntrustedOrigin,
            RejectReason::RateLimited => Rejection::RateLimited,
        }
    }
}

impl Ack {
    pub fn from_outcome(event_id: &str, outcome: &ReconcileOutcome) -> Self {
        let handled = |outcome| Ack::Handled(outcome, Some(event_id.to_string()));
        match outcome {
            ReconcileOutcome::Applied { .. } => handled(AckOutcome::Applied),
            ReconcileOutcome::Ignored(IgnoreReason::Duplicate) => handled(AckOutcome::Duplicate),
            ReconcileOutcome::Ignored(IgnoreReason::StaleTransition { .. }) => {
                handled(AckOutcome::StaleTransition)
            }
            ReconcileOutcome::Failed(FailureReason::OrderNotFound { .. }) => {
                handled(AckOutcome::OrderNotFound)
            }
            ReconcileOutcome::Failed(FailureReason::Store(StoreError::Timeout(_))) => {
                Ack::Retry(RetryReason::StoreTimeout)
            }
            ReconcileOutcome::Failed(FailureReason::Store(_)) => Ack::Retry(RetryReason::StoreFault),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Ack::Handled(..) => StatusCode::OK,
            Ack::Rejected(Rejection::UntrustedOrigin) => StatusCode::FORBIDDEN,
            Ack::Rejected(Rejection::RateLimited) => StatusCode::TOO_MANY_REQUESTS,
            Ack::Rejected(Rejection::SignatureInvalid) => StatusCode::UNAUTHORIZED,
            Ack::Rejected(Rejection::PayloadTooLarge) => StatusCode::PAYLOAD_TOO_LARGE,
            Ack::Rejected(Rejection::UnreadableBody) => StatusCode::BAD_REQUEST,
            Ack::Retry(RetryReason::StoreTimeout) => StatusCode::SERVICE_UNAVAILABLE,
            Ack::Retry(RetryReason::StoreFault) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for Ack {
    fn into_response(self) -> Response {
        let status = self.status();
        let (code, message) = match self {
            Ack::Handled(outcome, event_id) => {
                return (
                    status,
                    Json(AckResponse {
                        received: true,
                        outcome,
                        event_id,
                    }),
                )
                    .into_response();
            }
            Ack::Rejected(Rejection::UntrustedOrigin) => {
                (ApiErrorCode::Forbidden, "origin not allowed")
            }
            Ack::Rejected(Rejection::RateLimited) => (ApiErrorCode::RateLimited, "too many requests"),
            // One message for every signature failure.
            Ack::Rejected(Rejection::SignatureInvalid) => {
                (ApiErrorCode::Unauthorized, "invalid request")
            }
            Ack::Rejected(Rejection::PayloadTooLarge) => {
                (ApiErrorCode::PayloadTooLarge, "payload too large")
            }
            Ack::Rejected(Rejection::UnreadableBody) => {
                (ApiErrorCode::Validation, "request body could not be read")
            }
            Ack::Retry(RetryReason::StoreTimeout) => {
                (ApiErrorCode::Unavailable, "temporarily unavailable")
            }
            Ack::Retry(RetryReason::StoreFault) => (ApiErrorCode::Database, "database error"),
        };

        (
            status,
            Json(ApiErrorResponse {
                code,
                message: message.to_string(),
            }),
        )
            .into_response()
    }
}
