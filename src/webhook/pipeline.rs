use std::net::IpAddr;

use tracing::{info, instrument, warn};

use crate::reconcile::{PaymentStore, reconcile};
use crate::state::AppState;
use crate::types::AckOutcome;
use crate::webhook::ack::{Ack, Rejection};
use crate::webhook::gate::GateDecision;
use crate::webhook::parser::{ParsedEvent, parse_event};
use crate::webhook::signature::SignatureVerdict;

/// One inbound notification as it came off the wire.
#[derive(Debug, Clone, Copy)]
pub struct Delivery<'a> {
    pub source: IpAddr,
    pub signature: Option<&'a str>,
    pub body: &'a [u8],
}

/// First stage, run before the body is read: untrusted or over-quota sources
/// are turned away without spending a body read or any cryptographic work.
pub fn screen_origin<S>(state: &AppState<S>, source: IpAddr) -> Result<(), Ack> {
    match state.gate.admit(source) {
        GateDecision::Admit => Ok(()),
        GateDecision::Reject(reason) => {
            warn!(source = %source, reason = ?reason, "delivery rejected by origin gate");
            Err(Ack::Rejected(reason.into()))
        }
    }
}

/// Signature, then parse, then reconcile, for a delivery that already passed
/// `screen_origin`. Each step either hands on or short-circuits to an `Ack`;
/// nothing reaches the store before the signature is checked.
#[instrument(skip_all, fields(source = %delivery.source))]
pub async fn process_delivery<S: PaymentStore>(state: &AppState<S>, delivery: Delivery<'_>) -> Ack {
    let verdict = match delivery.signature {
        Some(token) => state.verifier.verify(delivery.body, token),
        None => SignatureVerdict::Invalid,
    };
    if verdict == SignatureVerdict::Invalid {
        warn!(
            signature_present = delivery.signature.is_some(),
            "delivery rejected: signature did not verify"
        );
        return Ack::Rejected(Rejection::SignatureInvalid);
    }

    let event = match parse_event(delivery.body) {
        Ok(ParsedEvent::Supported(event)) => event,
        Ok(ParsedEvent::Unsupported {
            event_id,
            event_type,
        }) => {
            info!(event_id = %event_id, event_type = %event_type, "unsupported event acknowledged");
            return Ack::Handled(AckOutcome::UnsupportedEvent, Some(event_id));
        }
        Err(err) => {
            warn!(
                event_id = err.event_id.as_deref().unwrap_or("-"),
                error = %err,
                "unparseable payload acknowledged"
            );
            return Ack::Handled(AckOutcome::ParseError, err.event_id);
        }
    };

    let outcome = reconcile(
        &state.store,
        &event,
        delivery.body,
        state.webhook.store_timeout,
    )
    .await;

    Ack::from_outcome(&event.event_id, &outcome)
}
