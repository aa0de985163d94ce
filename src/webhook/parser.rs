use chrono::{DateTime, SecondsFormat, Utc};
use serde::Deserialize;

use crate::types::{EventKind, PaymentPayload, WebhookEvent};

#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("malformed payload: {0}")]
    Json(String),
    #[error("missing required field `{0}`")]
    MissingField(&'static str),
    #[error("invalid field `{field}`: {reason}")]
    InvalidField { field: &'static str, reason: String },
}

#[derive(Debug, Clone)]
pub enum ParsedEvent {
    Supported(WebhookEvent),
    /// Well-formed envelope whose type this service does not reconcile.
    Unsupported { event_id: String, event_type: String },
}

#[derive(Deserialize)]
struct Envelope {
    id: Option<String>,
    #[serde(rename = "type")]
    event_type: Option<String>,
    created_at: Option<RawTimestamp>,
    data: Option<serde_json::Value>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawTimestamp {
    UnixSeconds(i64),
    Text(String),
}

#[derive(Deserialize)]
struct RawPaymentData {
    order_id: Option<String>,
    payment_id: Option<String>,
    amount: Option<i64>,
    currency: Option<String>,
    failure_reason: Option<String>,
}

/// A body that could not be decoded, with the event id when the envelope
/// got far enough to carry one.
#[derive(Debug, thiserror::Error)]
#[error("{error}")]
pub struct InvalidEvent {
    pub event_id: Option<String>,
    #[source]
    pub error: ParseError,
}

impl InvalidEvent {
    fn anonymous(error: ParseError) -> Self {
        Self {
            event_id: None,
            error,
        }
    }
}

/// Decode an already-verified body into a typed event.
pub fn parse_event(raw_body: &[u8]) -> Result<ParsedEvent, InvalidEvent> {
    let envelope: Envelope = serde_json::from_slice(raw_body)
        .map_err(|err| InvalidEvent::anonymous(ParseError::Json(err.to_string())))?;
    let event_id = required("id", envelope.id.clone()).map_err(InvalidEvent::anonymous)?;

    decode_envelope(event_id.clone(), envelope).map_err(|error| InvalidEvent {
        event_id: Some(event_id),
        error,
    })
}

fn decode_envelope(event_id: String, envelope: Envelope) -> Result<ParsedEvent, ParseError> {
    let event_type = required("type", envelope.event_type)?;
    let Some(kind) = EventKind::from_wire_name(&event_type) else {
        return Ok(ParsedEvent::Unsupported {
            event_id,
            event_type,
        });
    };

    let occurred_at = normalize_timestamp(
        envelope
            .created_at
            .ok_or(ParseError::MissingField("created_at"))?,
    )?;
    let data = envelope.data.ok_or(ParseError::MissingField("data"))?;
    let data: RawPaymentData =
        serde_json::from_value(data).map_err(|err| ParseError::InvalidField {
            field: "data",
            reason: err.to_string(),
        })?;

    let processor_payment_id = required("data.payment_id", data.payment_id)?;
    if let Some(amount) = data.amount
        && amount < 0
    {
        return Err(ParseError::InvalidField {
            field: "data.amount",
            reason: "must not be negative".to_string(),
        });
    }

    Ok(ParsedEvent::Supported(WebhookEvent {
        event_id,
        kind,
        occurred_at,
        payload: PaymentPayload {
            order_id: optional(data.order_id),
            processor_payment_id,
            amount: data.amount,
            currency: optional(data.currency).map(|currency| currency.to_ascii_lowercase()),
            failure_reason: optional(data.failure_reason),
        },
    }))
}

fn required(field: &'static str, value: Option<String>) -> Result<String, ParseError> {
    optional(value).ok_or(ParseError::MissingField(field))
}

fn optional(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn normalize_timestamp(raw: RawTimestamp) -> Result<String, ParseError> {
    let parsed = match raw {
        RawTimestamp::UnixSeconds(secs) => DateTime::<Utc>::from_timestamp(secs, 0),
        RawTimestamp::Text(text) => DateTime::parse_from_rfc3339(text.trim())
            .ok()
            .map(|dt| dt.with_timezone(&Utc)),
    };
    parsed
        .map(|dt| dt.to_rfc3339_opts(SecondsFormat::Secs, true))
        .ok_or_else(|| ParseError::InvalidField {
            field: "created_at",
            reason: "expected unix seconds or RFC 3339".to_string(),
        })
}
