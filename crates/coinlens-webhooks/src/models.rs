//! Domain models and API types for the webhook engine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::Validate;

/// Schema version stamped into every payload envelope.
pub const API_VERSION: &str = "2025-06-01";

// ---------------------------------------------------------------------------
// Event types
// ---------------------------------------------------------------------------

/// Closed set of platform events a subscription can listen to.
///
/// Shared between registry validation and dispatcher matching so an
/// unsupported type is unrepresentable past the API boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
pub enum WebhookEventType {
    #[serde(rename = "price.alert.triggered")]
    PriceAlertTriggered,
    #[serde(rename = "gas.alert.triggered")]
    GasAlertTriggered,
    #[serde(rename = "whale.movement.detected")]
    WhaleMovementDetected,
    #[serde(rename = "portfolio.snapshot.created")]
    PortfolioSnapshotCreated,
    #[serde(rename = "market.summary.daily")]
    MarketSummaryDaily,
    #[serde(rename = "webhook.test.ping")]
    TestPing,
}

impl WebhookEventType {
    /// Wire representation of the event type.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PriceAlertTriggered => "price.alert.triggered",
            Self::GasAlertTriggered => "gas.alert.triggered",
            Self::WhaleMovementDetected => "whale.movement.detected",
            Self::PortfolioSnapshotCreated => "portfolio.snapshot.created",
            Self::MarketSummaryDaily => "market.summary.daily",
            Self::TestPing => "webhook.test.ping",
        }
    }

    /// Parse a wire string; `None` for unknown types.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "price.alert.triggered" => Some(Self::PriceAlertTriggered),
            "gas.alert.triggered" => Some(Self::GasAlertTriggered),
            "whale.movement.detected" => Some(Self::WhaleMovementDetected),
            "portfolio.snapshot.created" => Some(Self::PortfolioSnapshotCreated),
            "market.summary.daily" => Some(Self::MarketSummaryDaily),
            "webhook.test.ping" => Some(Self::TestPing),
            _ => None,
        }
    }

    /// All supported event types.
    #[must_use]
    pub fn all() -> &'static [Self] {
        &[
            Self::PriceAlertTriggered,
            Self::GasAlertTriggered,
            Self::WhaleMovementDetected,
            Self::PortfolioSnapshotCreated,
            Self::MarketSummaryDaily,
            Self::TestPing,
        ]
    }

    /// Grouping used by the dashboard's event-type picker.
    #[must_use]
    pub fn category(&self) -> &'static str {
        match self {
            Self::PriceAlertTriggered | Self::GasAlertTriggered => "alerts",
            Self::WhaleMovementDetected => "onchain",
            Self::PortfolioSnapshotCreated => "portfolio",
            Self::MarketSummaryDaily => "market",
            Self::TestPing => "system",
        }
    }

    #[must_use]
    pub fn description(&self) -> &'static str {
        match self {
            Self::PriceAlertTriggered => "A configured price alert crossed its threshold",
            Self::GasAlertTriggered => "Network gas price crossed a configured threshold",
            Self::WhaleMovementDetected => "A tracked wallet moved above the whale threshold",
            Self::PortfolioSnapshotCreated => "A scheduled portfolio valuation snapshot is ready",
            Self::MarketSummaryDaily => "The daily market summary digest was generated",
            Self::TestPing => "Operator-triggered test delivery",
        }
    }
}

impl std::fmt::Display for WebhookEventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Subscription
// ---------------------------------------------------------------------------

/// A webhook subscription owned by one user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Webhook {
    pub id: Uuid,
    pub user_id: Uuid,
    pub url: String,
    pub event_types: Vec<WebhookEventType>,
    /// AES-256-GCM encrypted signing secret (base64). Plaintext leaves the
    /// engine only via create and regenerate.
    pub secret_encrypted: String,
    pub active: bool,
    pub description: Option<String>,
    pub consecutive_failures: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_triggered_at: Option<DateTime<Utc>>,
}

impl Webhook {
    /// Whether this subscription listens for the given event type.
    #[must_use]
    pub fn subscribes_to(&self, event_type: WebhookEventType) -> bool {
        self.event_types.contains(&event_type)
    }
}

// ---------------------------------------------------------------------------
// Payload envelope
// ---------------------------------------------------------------------------

/// Delivery metadata carried inside the envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PayloadMeta {
    pub webhook_id: Uuid,
    pub attempt_number: u32,
    pub api_version: String,
}

/// The signed JSON envelope POSTed to receivers.
///
/// `id` is the receiver-side idempotency key: retries of the same logical
/// event carry the same `id` with an incremented `meta.attemptNumber`.
/// `timestamp` is the emission time and is also stable across retries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct WebhookPayload {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub event_type: WebhookEventType,
    pub timestamp: DateTime<Utc>,
    pub data: serde_json::Value,
    pub meta: PayloadMeta,
}

impl WebhookPayload {
    /// Build the attempt-1 envelope for a subscription.
    #[must_use]
    pub fn new(webhook_id: Uuid, event_type: WebhookEventType, data: serde_json::Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            event_type,
            timestamp: Utc::now(),
            data,
            meta: PayloadMeta {
                webhook_id,
                attempt_number: 1,
                api_version: API_VERSION.to_string(),
            },
        }
    }

    /// The same logical envelope with a bumped attempt number.
    #[must_use]
    pub fn with_attempt(&self, attempt_number: u32) -> Self {
        let mut next = self.clone();
        next.meta.attempt_number = attempt_number;
        next
    }
}

// ---------------------------------------------------------------------------
// Delivery records
// ---------------------------------------------------------------------------

/// Per-attempt delivery state machine.
///
/// `Pending → Sending → { Success, Retrying, Failed }`. `Success` and
/// `Failed` are terminal; `Retrying` is followed by a fresh record with an
/// incremented attempt number, never by mutation of this one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    Pending,
    Sending,
    Success,
    Retrying,
    Failed,
}

impl DeliveryStatus {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Sending => "sending",
            Self::Success => "success",
            Self::Retrying => "retrying",
            Self::Failed => "failed",
        }
    }

    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "sending" => Some(Self::Sending),
            "success" => Some(Self::Success),
            "retrying" => Some(Self::Retrying),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    /// Terminal records are immutable.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Failed)
    }
}

/// One delivery attempt. A logical event produces one record per attempt so
/// the full retry history stays auditable.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct WebhookDelivery {
    pub id: Uuid,
    pub webhook_id: Uuid,
    pub event_type: WebhookEventType,
    pub payload: WebhookPayload,
    pub status: DeliveryStatus,
    pub http_status: Option<u16>,
    /// Response body excerpt, truncated to 4 KiB.
    pub response_body: Option<String>,
    pub latency_ms: Option<u64>,
    pub error: Option<String>,
    pub attempt_number: u32,
    pub next_retry_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl WebhookDelivery {
    /// Fresh `Pending` record for one attempt of a logical event.
    #[must_use]
    pub fn new(webhook_id: Uuid, payload: WebhookPayload) -> Self {
        Self {
            id: Uuid::new_v4(),
            webhook_id,
            event_type: payload.event_type,
            attempt_number: payload.meta.attempt_number,
            payload,
            status: DeliveryStatus::Pending,
            http_status: None,
            response_body: None,
            latency_ms: None,
            error: None,
            next_retry_at: None,
            created_at: Utc::now(),
            completed_at: None,
        }
    }
}

// ---------------------------------------------------------------------------
// API request/response types
// ---------------------------------------------------------------------------

/// Request body for creating a subscription.
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct CreateWebhookRequest {
    #[validate(length(min = 1, max = 2048))]
    pub url: String,
    /// Wire strings; validated against the closed event-type set.
    #[validate(length(min = 1))]
    pub event_types: Vec<String>,
    #[validate(length(max = 500))]
    pub description: Option<String>,
}

/// Patch body for updating a subscription. Absent fields are left unchanged.
#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
pub struct UpdateWebhookRequest {
    #[validate(length(min = 1, max = 2048))]
    pub url: Option<String>,
    #[validate(length(min = 1))]
    pub event_types: Option<Vec<String>>,
    #[validate(length(max = 500))]
    pub description: Option<String>,
    pub active: Option<bool>,
}

/// Subscription as exposed to its owner.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct WebhookResponse {
    pub id: Uuid,
    pub user_id: Uuid,
    pub url: String,
    pub event_types: Vec<WebhookEventType>,
    pub active: bool,
    pub description: Option<String>,
    pub consecutive_failures: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_triggered_at: Option<DateTime<Utc>>,
    /// Plaintext signing secret; present only on create and regenerate.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secret: Option<String>,
}

impl WebhookResponse {
    /// Response without the secret (list/get/update paths).
    #[must_use]
    pub fn from_webhook(webhook: Webhook) -> Self {
        Self {
            id: webhook.id,
            user_id: webhook.user_id,
            url: webhook.url,
            event_types: webhook.event_types,
            active: webhook.active,
            description: webhook.description,
            consecutive_failures: webhook.consecutive_failures,
            created_at: webhook.created_at,
            updated_at: webhook.updated_at,
            last_triggered_at: webhook.last_triggered_at,
            secret: None,
        }
    }

    /// Response revealing the plaintext secret (create/regenerate only).
    #[must_use]
    pub fn with_secret(webhook: Webhook, secret: String) -> Self {
        let mut response = Self::from_webhook(webhook);
        response.secret = Some(secret);
        response
    }
}

/// Query parameters for listing deliveries.
#[derive(Debug, Clone, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ListDeliveriesQuery {
    /// Maximum records to return (1..=200).
    #[serde(default = "default_delivery_limit")]
    pub limit: usize,
}

fn default_delivery_limit() -> usize {
    50
}

impl Default for ListDeliveriesQuery {
    fn default() -> Self {
        Self {
            limit: default_delivery_limit(),
        }
    }
}

/// Aggregated delivery health for one subscription.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct DeliveryStats {
    pub total_deliveries: u64,
    pub success_count: u64,
    pub failure_count: u64,
    /// `success_count / total_deliveries`, `0.0` when empty (never NaN).
    pub success_rate: f64,
    pub average_latency_ms: f64,
    pub last_success_at: Option<DateTime<Utc>>,
    pub last_failure_at: Option<DateTime<Utc>>,
}

impl DeliveryStats {
    /// Stats for a subscription with no recorded deliveries.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            total_deliveries: 0,
            success_count: 0,
            failure_count: 0,
            success_rate: 0.0,
            average_latency_ms: 0.0,
            last_success_at: None,
            last_failure_at: None,
        }
    }
}

/// One entry in the event-type listing.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct EventTypeInfo {
    pub event_type: String,
    pub category: String,
    pub description: String,
}

/// Response for the event-type listing endpoint.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct EventTypeListResponse {
    pub event_types: Vec<EventTypeInfo>,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_type_roundtrip() {
        for et in WebhookEventType::all() {
            assert_eq!(WebhookEventType::parse(et.as_str()), Some(*et));
        }
    }

    #[test]
    fn test_event_type_parse_unknown() {
        assert_eq!(WebhookEventType::parse("user.created"), None);
        assert_eq!(WebhookEventType::parse(""), None);
    }

    #[test]
    fn test_event_type_serde_uses_wire_strings() {
        let json = serde_json::to_string(&WebhookEventType::PriceAlertTriggered).unwrap();
        assert_eq!(json, "\"price.alert.triggered\"");
        let parsed: WebhookEventType = serde_json::from_str("\"gas.alert.triggered\"").unwrap();
        assert_eq!(parsed, WebhookEventType::GasAlertTriggered);
    }

    #[test]
    fn test_delivery_status_roundtrip() {
        for status in [
            DeliveryStatus::Pending,
            DeliveryStatus::Sending,
            DeliveryStatus::Success,
            DeliveryStatus::Retrying,
            DeliveryStatus::Failed,
        ] {
            assert_eq!(DeliveryStatus::parse(status.as_str()), Some(status));
        }
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(DeliveryStatus::Success.is_terminal());
        assert!(DeliveryStatus::Failed.is_terminal());
        assert!(!DeliveryStatus::Pending.is_terminal());
        assert!(!DeliveryStatus::Sending.is_terminal());
        assert!(!DeliveryStatus::Retrying.is_terminal());
    }

    #[test]
    fn test_payload_envelope_wire_shape() {
        let webhook_id = Uuid::new_v4();
        let payload = WebhookPayload::new(
            webhook_id,
            WebhookEventType::PriceAlertTriggered,
            serde_json::json!({"symbol": "ETH", "price": 3120.55}),
        );

        let value = serde_json::to_value(&payload).unwrap();
        assert_eq!(value["type"], "price.alert.triggered");
        assert_eq!(value["data"]["symbol"], "ETH");
        assert_eq!(value["meta"]["webhookId"], webhook_id.to_string());
        assert_eq!(value["meta"]["attemptNumber"], 1);
        assert_eq!(value["meta"]["apiVersion"], API_VERSION);
    }

    #[test]
    fn test_payload_with_attempt_keeps_idempotency_key() {
        let payload = WebhookPayload::new(
            Uuid::new_v4(),
            WebhookEventType::GasAlertTriggered,
            serde_json::json!({"gwei": 95}),
        );
        let retry = payload.with_attempt(3);

        assert_eq!(retry.id, payload.id);
        assert_eq!(retry.timestamp, payload.timestamp);
        assert_eq!(retry.data, payload.data);
        assert_eq!(retry.meta.attempt_number, 3);
    }

    #[test]
    fn test_new_delivery_starts_pending() {
        let payload = WebhookPayload::new(
            Uuid::new_v4(),
            WebhookEventType::TestPing,
            serde_json::json!({}),
        );
        let delivery = WebhookDelivery::new(payload.meta.webhook_id, payload.clone());

        assert_eq!(delivery.status, DeliveryStatus::Pending);
        assert_eq!(delivery.attempt_number, 1);
        assert_eq!(delivery.event_type, WebhookEventType::TestPing);
        assert!(delivery.completed_at.is_none());
    }

    #[test]
    fn test_response_secret_serialization() {
        let webhook = Webhook {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            url: "https://example.com/hook".to_string(),
            event_types: vec![WebhookEventType::PriceAlertTriggered],
            secret_encrypted: "opaque".to_string(),
            active: true,
            description: None,
            consecutive_failures: 0,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            last_triggered_at: None,
        };

        let without = serde_json::to_value(WebhookResponse::from_webhook(webhook.clone())).unwrap();
        assert!(without.get("secret").is_none());
        assert!(without.get("secret_encrypted").is_none());

        let with = serde_json::to_value(WebhookResponse::with_secret(
            webhook,
            "whsec_abc".to_string(),
        ))
        .unwrap();
        assert_eq!(with["secret"], "whsec_abc");
    }
}
