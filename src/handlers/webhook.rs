use std::net::{IpAddr, SocketAddr};

use axum::{
    Extension, Json,
    body::{Body, Bytes},
    extract::{ConnectInfo, State, rejection::BytesRejection},
    http::{HeaderMap, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use tracing::warn;

use crate::{
    reconcile::PaymentStore,
    state::AppState,
    webhook::{Ack, Delivery, Rejection, process_delivery, screen_origin, source_address},
};

/// Source address that passed the origin gate, set by `origin_gate`.
#[derive(Debug, Clone, Copy)]
pub struct AdmittedSource(pub IpAddr);

/// Runs the origin gate ahead of the body extractor, so rejected sources
/// never have their body read.
pub async fn origin_gate<S>(
    State(state): State<AppState<S>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    let source = source_address(peer, req.headers(), state.webhook.trust_forwarded_for);
    if let Err(ack) = screen_origin(&state, source) {
        return ack.into_response();
    }

    req.extensions_mut().insert(AdmittedSource(source));
    next.run(req).await
}

pub async fn payment_webhook_handler<S: PaymentStore>(
    State(state): State<AppState<S>>,
    Extension(AdmittedSource(source)): Extension<AdmittedSource>,
    headers: HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> Ack {
    let body = match body {
        Ok(body) => body,
        Err(rejection) => {
            warn!(source = %source, error = %rejection, "delivery body rejected");
            return Ack::Rejected(if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
                Rejection::PayloadTooLarge
            } else {
                Rejection::UnreadableBody
            });
        }
    };
    let signature = headers
        .get(state.webhook.signature_header.as_str())
        .and_then(|value| value.to_str().ok());

    process_delivery(
        &state,
        Delivery {
            source,
            signature,
            body: &body,
        },
    )
    .await
}

#[derive(Serialize)]
pub struct HealthResponse {
    status: &'static str,
}

pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}
