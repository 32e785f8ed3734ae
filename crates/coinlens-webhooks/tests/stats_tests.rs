//! Aggregated delivery health over real delivery records.

mod common;

use common::*;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer};

use coinlens_webhooks::models::WebhookEventType;
use coinlens_webhooks::WebhookError;

#[tokio::test]
async fn test_stats_over_mixed_outcomes() {
    let mock_server = MockServer::start().await;
    let ok = CaptureResponder::new();
    let broken = CaptureResponder::with_status(500);

    Mock::given(method("POST"))
        .and(path("/ok"))
        .respond_with(ok.clone())
        .mount(&mock_server)
        .await;
    Mock::given(method("POST"))
        .and(path("/broken"))
        .respond_with(broken.clone())
        .mount(&mock_server)
        .await;

    // Single attempt per event so each dispatch records exactly one outcome.
    let config = test_config().with_max_attempts(1);
    let harness = harness(config);

    let created = subscribe(
        &harness,
        USER_A,
        &format!("{}/ok", mock_server.uri()),
        &["price.alert.triggered"],
    )
    .await;

    for _ in 0..3 {
        harness
            .engine
            .dispatch(
                USER_A,
                WebhookEventType::PriceAlertTriggered,
                serde_json::json!({"symbol": "BTC"}),
            )
            .await
            .unwrap();
    }

    // Point the same subscription at the broken endpoint for one failure.
    harness
        .engine
        .subscriptions()
        .update(
            USER_A,
            created.id,
            coinlens_webhooks::models::UpdateWebhookRequest {
                url: Some(format!("{}/broken", mock_server.uri())),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    harness
        .engine
        .dispatch(
            USER_A,
            WebhookEventType::PriceAlertTriggered,
            serde_json::json!({"symbol": "BTC"}),
        )
        .await
        .unwrap();

    let stats = harness.engine.stats_for(USER_A, created.id).await.unwrap();

    assert_eq!(stats.total_deliveries, 4);
    assert_eq!(stats.success_count, 3);
    assert_eq!(stats.failure_count, 1);
    assert!((stats.success_rate - 0.75).abs() < f64::EPSILON);
    assert!(stats.average_latency_ms > 0.0);
    assert!(stats.last_success_at.is_some());
    assert!(stats.last_failure_at.is_some());
}

#[tokio::test]
async fn test_stats_with_no_deliveries() {
    let harness = harness(test_config());
    let created = subscribe(
        &harness,
        USER_A,
        "https://example.com/hook",
        &["price.alert.triggered"],
    )
    .await;

    let stats = harness.engine.stats_for(USER_A, created.id).await.unwrap();

    assert_eq!(stats.total_deliveries, 0);
    assert_eq!(stats.success_rate, 0.0);
    assert!(!stats.success_rate.is_nan());
    assert!(stats.last_success_at.is_none());
    assert!(stats.last_failure_at.is_none());
}

#[tokio::test]
async fn test_stats_scoped_to_owner() {
    let harness = harness(test_config());
    let created = subscribe(
        &harness,
        USER_A,
        "https://example.com/hook",
        &["price.alert.triggered"],
    )
    .await;

    let result = harness.engine.stats_for(USER_B, created.id).await;
    assert!(matches!(result, Err(WebhookError::SubscriptionNotFound)));
}

#[tokio::test]
async fn test_delivery_history_visible_to_owner() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(CaptureResponder::new())
        .mount(&mock_server)
        .await;

    let harness = harness(test_config());
    let created = subscribe(
        &harness,
        USER_A,
        &format!("{}/hook", mock_server.uri()),
        &["gas.alert.triggered"],
    )
    .await;

    harness
        .engine
        .dispatch(
            USER_A,
            WebhookEventType::GasAlertTriggered,
            serde_json::json!({"gwei": 80}),
        )
        .await
        .unwrap();

    let history = harness
        .engine
        .list_deliveries(USER_A, created.id, 50)
        .await
        .unwrap();
    assert_eq!(history.len(), 1);

    let record = harness
        .engine
        .get_delivery(USER_A, created.id, history[0].id)
        .await
        .unwrap();
    assert_eq!(record.id, history[0].id);

    // History is owner-scoped like everything else.
    let other = harness.engine.list_deliveries(USER_B, created.id, 50).await;
    assert!(matches!(other, Err(WebhookError::SubscriptionNotFound)));
}
