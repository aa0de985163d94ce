#![allow(clippy::expect_used, clippy::unwrap_used)]

mod common;

use std::{net::SocketAddr, time::Duration};

use axum::{
    Router,
    body::Body,
    extract::connect_info::MockConnectInfo,
    http::{Request, StatusCode},
};
use common::{TestDb, event, seed_order, setup_db};
use http_body_util::BodyExt;
use payment_receiver::{
    inspector::{ListParams, list_anomalies, list_processed_events},
    reconcile::{SqliteStore, reconcile},
    routes::build_router,
    state::AppState,
    types::{AnomalyKind, ProcessedOutcome},
    webhook::{WebhookConfig, WebhookSecret},
};
use serde_json::Value;
use tower::ServiceExt;

const TIMEOUT: Duration = Duration::from_secs(5);

fn app(db: &TestDb) -> Router {
    let state = AppState::new(
        db.pool.clone(),
        SqliteStore::new(db.pool.clone()),
        WebhookConfig::new(WebhookSecret::new("whsec_test")),
        None,
    );
    build_router(state).layer(MockConnectInfo(SocketAddr::from(([127, 0, 0, 1], 40_000))))
}

async fn get_json(app: Router, uri: &str) -> (StatusCode, Value) {
    let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    (status, serde_json::from_slice(&bytes).unwrap())
}

/// Three applied captures, one stale failure, one in-flight marker.
async fn seed_history(db: &TestDb) {
    let store = SqliteStore::new(db.pool.clone());
    for n in 1..=3 {
        let order_id = format!("ord_{n}");
        seed_order(&db.pool, &order_id, "pending").await;
        let (ev, body) = event(&format!("ev_{n}"), "payment.captured", Some(&order_id), &format!("pay_{n}"));
        reconcile(&store, &ev, &body, TIMEOUT).await;
    }
    let (stale, body) = event("ev_4", "payment.failed", Some("ord_1"), "pay_1");
    reconcile(&store, &stale, &body, TIMEOUT).await;

    sqlx::query(
        r#"
        INSERT INTO processed_events (
            event_id, event_type, outcome, order_id, processor_payment_id, occurred_at, processed_at
        )
        VALUES ('ev_inflight', 'payment.captured', 'in_progress', NULL, 'pay_x', '2024-01-01T00:00:00Z', '2999-01-01T00:00:00.000Z')
        "#,
    )
    .execute(&db.pool)
    .await
    .expect("insert in-flight marker");
}

#[tokio::test]
async fn processed_events_exclude_in_flight_markers() {
    let db = setup_db().await;
    seed_history(&db).await;

    let page = list_processed_events(
        &db.pool,
        &ListParams {
            limit: 50,
            before: None,
        },
    )
    .await
    .expect("list processed events");

    assert_eq!(page.items.len(), 4);
    assert!(page.next_before.is_none());
    assert!(page.items.iter().all(|record| record.event_id != "ev_inflight"));

    let stale = page
        .items
        .iter()
        .find(|record| record.event_id == "ev_4")
        .expect("stale marker listed");
    assert_eq!(stale.outcome, ProcessedOutcome::StaleTransition);
    assert_eq!(stale.order_id.as_deref(), Some("ord_1"));
}

#[tokio::test]
async fn processed_events_page_through_cursor() {
    let db = setup_db().await;
    seed_history(&db).await;

    let first = list_processed_events(
        &db.pool,
        &ListParams {
            limit: 3,
            before: None,
        },
    )
    .await
    .expect("first page");
    assert_eq!(first.items.len(), 3);
    let cursor = first.next_before.clone().expect("more pages");

    let second = list_processed_events(
        &db.pool,
        &ListParams {
            limit: 3,
            before: Some(cursor),
        },
    )
    .await
    .expect("second page");
    assert_eq!(second.items.len(), 1);
    assert!(second.next_before.is_none());

    let mut seen: Vec<_> = first
        .items
        .iter()
        .chain(second.items.iter())
        .map(|record| record.event_id.clone())
        .collect();
    seen.sort();
    assert_eq!(seen, vec!["ev_1", "ev_2", "ev_3", "ev_4"]);
}

#[tokio::test]
async fn processed_events_endpoint_returns_opaque_cursor() {
    let db = setup_db().await;
    seed_history(&db).await;

    let (status, first) = get_json(app(&db), "/internal/inspector/processed-events?limit=2").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(first["events"].as_array().unwrap().len(), 2);
    let cursor = first["next_before"].as_str().expect("cursor").to_string();

    let (status, second) = get_json(
        app(&db),
        &format!("/internal/inspector/processed-events?limit=2&before={cursor}"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(second["events"].as_array().unwrap().len(), 2);
    assert_eq!(second["next_before"], Value::Null);
}

#[tokio::test]
async fn invalid_limit_and_cursor_are_rejected() {
    let db = setup_db().await;

    let (status, body) = get_json(app(&db), "/internal/inspector/processed-events?limit=0").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "validation");

    let (status, _) = get_json(app(&db), "/internal/inspector/anomalies?limit=201").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) =
        get_json(app(&db), "/internal/inspector/processed-events?before=not-a-cursor").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "validation");
}

#[tokio::test]
async fn anomalies_list_unmatched_events() {
    let db = setup_db().await;
    let store = SqliteStore::new(db.pool.clone());
    let (by_order, body) = event("ev_8", "payment.captured", Some("ord_missing"), "pay_8");
    reconcile(&store, &by_order, &body, TIMEOUT).await;
    let (by_payment, body) = event("ev_9", "refund.processed", None, "pay_unknown");
    reconcile(&store, &by_payment, &body, TIMEOUT).await;

    let page = list_anomalies(
        &db.pool,
        &ListParams {
            limit: 50,
            before: None,
        },
    )
    .await
    .expect("list anomalies");

    assert_eq!(page.items.len(), 2);
    assert!(page
        .items
        .iter()
        .all(|anomaly| anomaly.kind == AnomalyKind::OrderNotFound));
    let by_payment = page
        .items
        .iter()
        .find(|anomaly| anomaly.event_id == "ev_9")
        .expect("payment-correlated anomaly");
    assert_eq!(by_payment.correlation_id, "pay_unknown");
    assert_eq!(by_payment.event_type, "refund.processed");

    let (status, json) = get_json(app(&db), "/internal/inspector/anomalies").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["anomalies"].as_array().unwrap().len(), 2);
}
