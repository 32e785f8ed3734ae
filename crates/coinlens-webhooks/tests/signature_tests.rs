//! End-to-end tests for payload signing.
//!
//! Every delivery must carry a `Coinlens-Signature` header that the
//! receiver can verify with the secret handed out at subscription time.

mod common;

use common::*;
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer};

use coinlens_webhooks::models::WebhookEventType;
use coinlens_webhooks::signature::{self, SignatureError};

#[tokio::test]
async fn test_delivery_carries_signature_header() {
    let mock_server = MockServer::start().await;
    let capture = CaptureResponder::new();

    Mock::given(method("POST"))
        .and(path("/hook"))
        .respond_with(capture.clone())
        .mount(&mock_server)
        .await;

    let harness = harness(test_config());
    let url = format!("{}/hook", mock_server.uri());
    subscribe(&harness, USER_A, &url, &["price.alert.triggered"]).await;

    harness
        .engine
        .dispatch(
            USER_A,
            WebhookEventType::PriceAlertTriggered,
            serde_json::json!({"symbol": "BTC", "price": 64000.5}),
        )
        .await
        .unwrap();

    let requests = capture.requests();
    assert_eq!(requests.len(), 1);

    let header = requests[0]
        .header(signature::SIGNATURE_HEADER)
        .expect("signature header present");
    assert!(header.starts_with("t="), "header is t=..,v1=..: {header}");

    let v1 = header
        .split(',')
        .find_map(|part| part.strip_prefix("v1="))
        .expect("v1 field present");
    assert_eq!(v1.len(), 64, "HMAC-SHA256 is 64 hex chars");
    assert!(v1.chars().all(|c| c.is_ascii_hexdigit()));
}

#[tokio::test]
async fn test_receiver_verifies_with_issued_secret() {
    let mock_server = MockServer::start().await;
    let capture = CaptureResponder::new();

    Mock::given(method("POST"))
        .and(path("/hook"))
        .respond_with(capture.clone())
        .mount(&mock_server)
        .await;

    let harness = harness(test_config());
    let url = format!("{}/hook", mock_server.uri());
    let created = subscribe(&harness, USER_A, &url, &["gas.alert.triggered"]).await;
    let secret = created.secret.expect("secret returned on create");

    harness
        .engine
        .dispatch(
            USER_A,
            WebhookEventType::GasAlertTriggered,
            serde_json::json!({"gwei": 120}),
        )
        .await
        .unwrap();

    let requests = capture.requests();
    assert!(verify_captured_signature(&requests[0], &secret));
    assert!(!verify_captured_signature(
        &requests[0],
        "whsec_0000000000000000000000000000000000000000000000000000000000000000"
    ));
}

#[tokio::test]
async fn test_tampered_body_fails_verification() {
    let mock_server = MockServer::start().await;
    let capture = CaptureResponder::new();

    Mock::given(method("POST"))
        .and(path("/hook"))
        .respond_with(capture.clone())
        .mount(&mock_server)
        .await;

    let harness = harness(test_config());
    let url = format!("{}/hook", mock_server.uri());
    let created = subscribe(&harness, USER_A, &url, &["price.alert.triggered"]).await;
    let secret = created.secret.unwrap();

    harness
        .engine
        .dispatch(
            USER_A,
            WebhookEventType::PriceAlertTriggered,
            serde_json::json!({"symbol": "ETH"}),
        )
        .await
        .unwrap();

    let requests = capture.requests();
    let captured = &requests[0];
    let header = captured.header(signature::SIGNATURE_HEADER).unwrap();

    // Flip one byte of the payload.
    let mut tampered = captured.body.clone();
    let last = tampered.len() - 1;
    tampered[last] ^= 0x01;

    assert_eq!(
        signature::verify(&tampered, header, &secret, 300),
        Err(SignatureError::Mismatch)
    );
    assert_eq!(signature::verify(&captured.body, header, &secret, 300), Ok(()));
}

#[tokio::test]
async fn test_rotated_secret_signs_subsequent_deliveries() {
    let mock_server = MockServer::start().await;
    let capture = CaptureResponder::new();

    Mock::given(method("POST"))
        .and(path("/hook"))
        .respond_with(capture.clone())
        .mount(&mock_server)
        .await;

    let harness = harness(test_config());
    let url = format!("{}/hook", mock_server.uri());
    let created = subscribe(&harness, USER_A, &url, &["market.summary.daily"]).await;
    let old_secret = created.secret.unwrap();

    let rotated = harness
        .engine
        .subscriptions()
        .regenerate_secret(USER_A, created.id)
        .await
        .unwrap();
    let new_secret = rotated.secret.expect("secret returned on rotation");
    assert_ne!(old_secret, new_secret);

    harness
        .engine
        .dispatch(
            USER_A,
            WebhookEventType::MarketSummaryDaily,
            serde_json::json!({"date": "2025-06-02"}),
        )
        .await
        .unwrap();

    let requests = capture.requests();
    let captured = &requests[0];
    assert!(verify_captured_signature(captured, &new_secret));
    assert!(
        !verify_captured_signature(captured, &old_secret),
        "old secret no longer verifies"
    );
}

#[tokio::test]
async fn test_delivery_without_match_sends_nothing() {
    let mock_server = MockServer::start().await;
    let counter = CountingResponder::new();

    Mock::given(method("POST"))
        .respond_with(counter.clone())
        .mount(&mock_server)
        .await;

    let harness = harness(test_config());
    let url = format!("{}/hook", mock_server.uri());
    subscribe(&harness, USER_A, &url, &["price.alert.triggered"]).await;

    // Different event type: no delivery, no request.
    let deliveries = harness
        .engine
        .dispatch(
            USER_A,
            WebhookEventType::WhaleMovementDetected,
            serde_json::json!({}),
        )
        .await
        .unwrap();

    assert!(deliveries.is_empty());
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(counter.count(), 0);
}
