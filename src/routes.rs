use axum::{
    Router,
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, post},
};

use crate::{
    auth::inspector_auth,
    handlers::{
        inspector::{list_anomalies_handler, list_processed_events_handler},
        webhook::{health_handler, origin_gate, payment_webhook_handler},
    },
    reconcile::PaymentStore,
    state::AppState,
};

/// Serve with `into_make_service_with_connect_info::<SocketAddr>()`; the
/// webhook route needs the peer address. The origin gate wraps the webhook
/// handler so it runs before the body is read.
pub fn build_router<S: PaymentStore + Clone>(state: AppState<S>) -> Router {
    let webhook_path = state.webhook.path.clone();
    let max_body_bytes = state.webhook.max_body_bytes;

    let inspector_router = Router::new()
        .route("/processed-events", get(list_processed_events_handler::<S>))
        .route("/anomalies", get(list_anomalies_handler::<S>))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            inspector_auth::<S>,
        ));

    Router::new()
        .route(
            &webhook_path,
            post(payment_webhook_handler::<S>)
                .layer(DefaultBodyLimit::max(max_body_bytes))
                .layer(middleware::from_fn_with_state(
                    state.clone(),
                    origin_gate::<S>,
                )),
        )
        .route("/health", get(health_handler))
        .nest("/internal/inspector", inspector_router)
        .with_state(state)
}
