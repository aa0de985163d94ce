use std::sync::Arc;

use sqlx::SqlitePool;

use crate::reconcile::SqliteStore;
use crate::webhook::{
    CidrAllowlist, GovernorRateLimiter, HmacSha256Verifier, OriginGate, SignatureVerifier,
    WebhookConfig,
};

#[derive(Clone)]
pub struct AppState<S = SqliteStore> {
    /// Read access for the inspector.
    pub pool: SqlitePool,
    pub store: S,
    pub webhook: Arc<WebhookConfig>,
    pub gate: OriginGate,
    pub verifier: Arc<dyn SignatureVerifier>,
    pub inspector_api_token: Option<String>,
}

impl<S> AppState<S> {
    /// Wires the configured allowlist, limiter and HMAC verifier.
    pub fn new(
        pool: SqlitePool,
        store: S,
        webhook: WebhookConfig,
        inspector_api_token: Option<String>,
    ) -> Self {
        let gate = OriginGate::new(
            Arc::new(CidrAllowlist::new(webhook.allowed_cidrs.clone())),
            Arc::new(GovernorRateLimiter::per_minute(
                webhook.rate_limit_per_minute,
                webhook.rate_limit_burst,
            )),
        );
        let verifier = Arc::new(HmacSha256Verifier::new(
            webhook.signing_secret.clone(),
            webhook.signature_encoding,
        ));

        Self {
            pool,
            store,
            webhook: Arc::new(webhook),
            gate,
            verifier,
            inspector_api_token,
        }
    }
}
