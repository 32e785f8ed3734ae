//! Shared test utilities: engine harness, wiremock responders, fixtures.

#![allow(dead_code)]

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use uuid::Uuid;
use wiremock::{Request, Respond, ResponseTemplate};

use coinlens_webhooks::config::WebhookConfig;
use coinlens_webhooks::models::{CreateWebhookRequest, WebhookResponse};
use coinlens_webhooks::signature;
use coinlens_webhooks::store::memory::{InMemoryDeliveryStore, InMemorySubscriptionStore};
use coinlens_webhooks::transport::ReqwestTransport;
use coinlens_webhooks::WebhookEngine;

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

pub const USER_A: Uuid = Uuid::from_bytes([
    0x11, 0x11, 0x11, 0x11, 0x11, 0x11, 0x11, 0x11, 0x11, 0x11, 0x11, 0x11, 0x11, 0x11, 0x11, 0x11,
]);

pub const USER_B: Uuid = Uuid::from_bytes([
    0x22, 0x22, 0x22, 0x22, 0x22, 0x22, 0x22, 0x22, 0x22, 0x22, 0x22, 0x22, 0x22, 0x22, 0x22, 0x22,
]);

pub fn test_key() -> Vec<u8> {
    vec![0x42; 32]
}

/// Engine config suited to tests: HTTP targets allowed, millisecond backoff.
pub fn test_config() -> WebhookConfig {
    WebhookConfig::new(test_key())
        .with_allow_http(true)
        .with_backoff_schedule(vec![Duration::from_millis(25)])
}

// ---------------------------------------------------------------------------
// Engine harness
// ---------------------------------------------------------------------------

/// Assembled engine over in-memory stores, with direct store handles so
/// tests can observe records even after a subscription is deleted.
pub struct TestHarness {
    pub engine: WebhookEngine,
    pub subscriptions: Arc<InMemorySubscriptionStore>,
    pub deliveries: Arc<InMemoryDeliveryStore>,
}

/// Build an engine and spawn its retry worker on the current runtime.
pub fn harness(config: WebhookConfig) -> TestHarness {
    let subscriptions = Arc::new(InMemorySubscriptionStore::new());
    let deliveries = Arc::new(InMemoryDeliveryStore::new());
    let transport =
        Arc::new(ReqwestTransport::new(config.http_timeout).expect("build transport"));

    let (engine, worker) = WebhookEngine::new(
        config,
        subscriptions.clone(),
        deliveries.clone(),
        transport,
    )
    .expect("assemble engine");
    tokio::spawn(worker.run());

    TestHarness {
        engine,
        subscriptions,
        deliveries,
    }
}

/// Create a subscription to `url` listening for the given wire event types.
pub async fn subscribe(
    harness: &TestHarness,
    user_id: Uuid,
    url: &str,
    event_types: &[&str],
) -> WebhookResponse {
    harness
        .engine
        .subscriptions()
        .create(
            user_id,
            CreateWebhookRequest {
                url: url.to_string(),
                event_types: event_types.iter().map(|s| s.to_string()).collect(),
                description: None,
            },
        )
        .await
        .expect("create subscription")
}

/// Poll a webhook's delivery records every 10ms until `pred` holds.
///
/// Panics when `timeout` elapses first. Returns the records sorted by
/// attempt number.
pub async fn wait_for_records<F>(
    store: &InMemoryDeliveryStore,
    webhook_id: Uuid,
    timeout: Duration,
    pred: F,
) -> Vec<coinlens_webhooks::WebhookDelivery>
where
    F: Fn(&[coinlens_webhooks::WebhookDelivery]) -> bool,
{
    use coinlens_webhooks::store::DeliveryStore;

    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        let mut records = store
            .list_by_webhook(webhook_id, 1000)
            .await
            .expect("list deliveries");
        records.sort_by_key(|d| d.attempt_number);
        if pred(&records) {
            return records;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "timed out waiting for delivery records (have {})",
            records.len()
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

// ---------------------------------------------------------------------------
// CapturedRequest
// ---------------------------------------------------------------------------

/// A captured HTTP request with body and headers.
#[derive(Debug, Clone)]
pub struct CapturedRequest {
    pub body: Vec<u8>,
    pub headers: HashMap<String, String>,
    pub received_at: DateTime<Utc>,
}

impl CapturedRequest {
    /// Parse the body as JSON.
    pub fn body_json(&self) -> serde_json::Value {
        serde_json::from_slice(&self.body).expect("captured body is JSON")
    }

    /// Get a header value by name (case-insensitive).
    pub fn header(&self, name: &str) -> Option<&str> {
        let name_lower = name.to_lowercase();
        self.headers
            .iter()
            .find(|(k, _)| k.to_lowercase() == name_lower)
            .map(|(_, v)| v.as_str())
    }
}

/// Verify the signature header on a captured request against a secret.
pub fn verify_captured_signature(request: &CapturedRequest, secret: &str) -> bool {
    let Some(header) = request.header(signature::SIGNATURE_HEADER) else {
        return false;
    };
    signature::verify(&request.body, header, secret, 300).is_ok()
}

// ---------------------------------------------------------------------------
// Responders
// ---------------------------------------------------------------------------

/// Captures incoming requests and responds with a fixed status code.
#[derive(Clone)]
pub struct CaptureResponder {
    requests: Arc<Mutex<Vec<CapturedRequest>>>,
    response_code: u16,
}

impl CaptureResponder {
    pub fn new() -> Self {
        Self::with_status(200)
    }

    pub fn with_status(status: u16) -> Self {
        Self {
            requests: Arc::new(Mutex::new(Vec::new())),
            response_code: status,
        }
    }

    pub fn requests(&self) -> Vec<CapturedRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

impl Respond for CaptureResponder {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let captured = CapturedRequest {
            body: request.body.clone(),
            headers: request
                .headers
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_str().unwrap_or("").to_string()))
                .collect(),
            received_at: Utc::now(),
        };
        self.requests.lock().unwrap().push(captured);
        ResponseTemplate::new(self.response_code)
    }
}

/// Counts incoming requests.
#[derive(Clone)]
pub struct CountingResponder {
    count: Arc<AtomicU32>,
    response_code: u16,
}

impl CountingResponder {
    pub fn new() -> Self {
        Self::with_status(200)
    }

    pub fn with_status(status: u16) -> Self {
        Self {
            count: Arc::new(AtomicU32::new(0)),
            response_code: status,
        }
    }

    pub fn count(&self) -> u32 {
        self.count.load(Ordering::SeqCst)
    }
}

impl Respond for CountingResponder {
    fn respond(&self, _request: &Request) -> ResponseTemplate {
        self.count.fetch_add(1, Ordering::SeqCst);
        ResponseTemplate::new(self.response_code)
    }
}

/// Fails a specified number of times before succeeding.
#[derive(Clone)]
pub struct FailingResponder {
    attempt_count: Arc<AtomicU32>,
    failures_before_success: u32,
    failure_code: u16,
}

impl FailingResponder {
    /// Fails `n` times with 500, then returns 200.
    pub fn fail_times(n: u32) -> Self {
        Self {
            attempt_count: Arc::new(AtomicU32::new(0)),
            failures_before_success: n,
            failure_code: 500,
        }
    }

    pub fn attempt_count(&self) -> u32 {
        self.attempt_count.load(Ordering::SeqCst)
    }
}

impl Respond for FailingResponder {
    fn respond(&self, _request: &Request) -> ResponseTemplate {
        let n = self.attempt_count.fetch_add(1, Ordering::SeqCst);
        if n < self.failures_before_success {
            ResponseTemplate::new(self.failure_code)
        } else {
            ResponseTemplate::new(200)
        }
    }
}

/// Delays before responding.
#[derive(Clone)]
pub struct DelayedResponder {
    delay: Duration,
    response_code: u16,
}

impl DelayedResponder {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            response_code: 200,
        }
    }
}

impl Respond for DelayedResponder {
    fn respond(&self, _request: &Request) -> ResponseTemplate {
        ResponseTemplate::new(self.response_code).set_delay(self.delay)
    }
}
