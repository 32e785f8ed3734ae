//! Event fan-out and delivery execution.
//!
//! `dispatch` fans an application event out to every matching active
//! subscription; each delivery attempt signs the envelope, POSTs it through
//! the injected transport, classifies the outcome, and appends one record
//! per attempt. Failures arm the retry scheduler until attempts run out.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use futures::future::join_all;
use uuid::Uuid;

use crate::config::WebhookConfig;
use crate::crypto::SecretCipher;
use crate::error::WebhookError;
use crate::models::{
    DeliveryStatus, Webhook, WebhookDelivery, WebhookEventType, WebhookPayload,
};
use crate::scheduler::RetryScheduler;
use crate::signature;
use crate::store::{DeliveryStore, SubscriptionStore};
use crate::transport::{HttpTransport, TransportError};

/// Response bodies are stored truncated to this many characters.
const RESPONSE_BODY_LIMIT: usize = 4096;

/// Executes webhook deliveries and owns the retry decision per attempt.
pub struct DeliveryService {
    subscriptions: Arc<dyn SubscriptionStore>,
    deliveries: Arc<dyn DeliveryStore>,
    transport: Arc<dyn HttpTransport>,
    scheduler: Arc<RetryScheduler>,
    cipher: SecretCipher,
    disable_threshold: u32,
}

impl DeliveryService {
    pub fn new(
        subscriptions: Arc<dyn SubscriptionStore>,
        deliveries: Arc<dyn DeliveryStore>,
        transport: Arc<dyn HttpTransport>,
        scheduler: Arc<RetryScheduler>,
        cipher: SecretCipher,
        config: &WebhookConfig,
    ) -> Self {
        Self {
            subscriptions,
            deliveries,
            transport,
            scheduler,
            cipher,
            disable_threshold: config.disable_threshold,
        }
    }

    /// Fan an event out to all active subscriptions of `user_id` that listen
    /// for `event_type`.
    ///
    /// Subscriptions are delivered to in parallel; one subscriber's failure
    /// is recorded on its own delivery record and never aborts the others.
    /// No matching subscription is not an error: returns an empty vec.
    pub async fn dispatch(
        &self,
        user_id: Uuid,
        event_type: WebhookEventType,
        data: serde_json::Value,
    ) -> Result<Vec<WebhookDelivery>, WebhookError> {
        let subscriptions = self
            .subscriptions
            .list_active_by_event(user_id, event_type)
            .await?;

        if subscriptions.is_empty() {
            tracing::debug!(
                target: "webhook_delivery",
                user_id = %user_id,
                event_type = %event_type,
                "No active subscriptions match event type"
            );
            return Ok(Vec::new());
        }

        tracing::info!(
            target: "webhook_delivery",
            user_id = %user_id,
            event_type = %event_type,
            subscription_count = subscriptions.len(),
            "Dispatching event to matching subscriptions"
        );

        let attempts = subscriptions.iter().map(|webhook| {
            let payload = WebhookPayload::new(webhook.id, event_type, data.clone());
            self.deliver_to_subscription(webhook, payload)
        });

        Ok(join_all(attempts).await.into_iter().flatten().collect())
    }

    /// Deliver a `TestPing` envelope to one subscription regardless of its
    /// subscribed event types.
    pub async fn send_test_event(
        &self,
        webhook_id: Uuid,
    ) -> Result<WebhookDelivery, WebhookError> {
        let webhook = self
            .subscriptions
            .get(webhook_id)
            .await?
            .ok_or(WebhookError::SubscriptionNotFound)?;

        let payload = WebhookPayload::new(
            webhook.id,
            WebhookEventType::TestPing,
            serde_json::json!({ "message": "Test delivery from Coinlens" }),
        );

        self.deliver_to_subscription(&webhook, payload)
            .await
            .ok_or_else(|| WebhookError::Internal("failed to record test delivery".to_string()))
    }

    /// Operator-triggered redelivery of a non-success delivery.
    ///
    /// The attempt counter stays monotonic per logical event lineage: the
    /// new attempt number is one past the highest recorded attempt for the
    /// same envelope, however that attempt was triggered.
    pub async fn retry(
        &self,
        delivery_id: Uuid,
    ) -> Result<Option<WebhookDelivery>, WebhookError> {
        let Some(delivery) = self.deliveries.get(delivery_id).await? else {
            return Ok(None);
        };

        if delivery.status == DeliveryStatus::Success {
            return Err(WebhookError::Validation(
                "only non-success deliveries can be redelivered".to_string(),
            ));
        }

        let Some(webhook) = self.subscriptions.get(delivery.webhook_id).await? else {
            return Ok(None);
        };

        // Later automatic attempts may already exist for this envelope.
        let highest_attempt = self
            .deliveries
            .list_by_webhook(webhook.id, usize::MAX)
            .await?
            .iter()
            .filter(|d| d.payload.id == delivery.payload.id)
            .map(|d| d.attempt_number)
            .max()
            .unwrap_or(delivery.attempt_number);

        let payload = delivery.payload.with_attempt(highest_attempt + 1);
        Ok(self.deliver_to_subscription(&webhook, payload).await)
    }

    /// Re-execute a delivery whose retry timer fired.
    ///
    /// The retry is abandoned without a new record when the subscription was
    /// deleted or deactivated in the meantime.
    pub async fn process_retry(&self, delivery_id: Uuid) {
        let delivery = match self.deliveries.get(delivery_id).await {
            Ok(Some(d)) => d,
            Ok(None) => {
                tracing::warn!(
                    target: "webhook_delivery",
                    delivery_id = %delivery_id,
                    "Due retry references a missing delivery record"
                );
                return;
            }
            Err(e) => {
                tracing::error!(
                    target: "webhook_delivery",
                    delivery_id = %delivery_id,
                    error = %e,
                    "Failed to load delivery for retry"
                );
                return;
            }
        };

        let webhook = match self.subscriptions.get(delivery.webhook_id).await {
            Ok(Some(w)) if w.active => w,
            Ok(Some(_)) => {
                tracing::info!(
                    target: "webhook_delivery",
                    delivery_id = %delivery_id,
                    webhook_id = %delivery.webhook_id,
                    "Abandoning retry, subscription is inactive"
                );
                return;
            }
            Ok(None) => {
                tracing::info!(
                    target: "webhook_delivery",
                    delivery_id = %delivery_id,
                    webhook_id = %delivery.webhook_id,
                    "Abandoning retry, subscription was deleted"
                );
                return;
            }
            Err(e) => {
                tracing::error!(
                    target: "webhook_delivery",
                    delivery_id = %delivery_id,
                    error = %e,
                    "Failed to load subscription for retry"
                );
                return;
            }
        };

        let payload = delivery.payload.with_attempt(delivery.attempt_number + 1);
        self.deliver_to_subscription(&webhook, payload).await;
    }

    /// Append a fresh attempt record and execute it.
    ///
    /// Returns `None` only when the record itself could not be appended;
    /// delivery failures come back as a record with the failure on it.
    async fn deliver_to_subscription(
        &self,
        webhook: &Webhook,
        payload: WebhookPayload,
    ) -> Option<WebhookDelivery> {
        let delivery = WebhookDelivery::new(webhook.id, payload);

        if let Err(e) = self.deliveries.append(delivery.clone()).await {
            tracing::error!(
                target: "webhook_delivery",
                webhook_id = %webhook.id,
                error = %e,
                "Failed to append delivery record"
            );
            return None;
        }

        Some(self.execute_attempt(webhook, delivery).await)
    }

    /// One HTTP delivery attempt with outcome classification.
    async fn execute_attempt(
        &self,
        webhook: &Webhook,
        mut delivery: WebhookDelivery,
    ) -> WebhookDelivery {
        delivery.status = DeliveryStatus::Sending;
        self.write_record(&delivery).await;

        let payload_bytes = match serde_json::to_vec(&delivery.payload) {
            Ok(bytes) => bytes,
            Err(e) => {
                return self
                    .handle_failure(
                        webhook,
                        delivery,
                        format!("Failed to serialize payload: {e}"),
                        None,
                        None,
                        None,
                    )
                    .await;
            }
        };

        // Always the current secret: rotation invalidates in-flight retries
        // signed with the old one, and receivers only know the current secret.
        let secret = match self.cipher.decrypt(&webhook.secret_encrypted) {
            Ok(secret) => secret,
            Err(e) => {
                return self
                    .handle_failure(
                        webhook,
                        delivery,
                        format!("Failed to decrypt signing secret: {e}"),
                        None,
                        None,
                        None,
                    )
                    .await;
            }
        };

        let headers = vec![
            ("Content-Type".to_string(), "application/json".to_string()),
            (
                signature::SIGNATURE_HEADER.to_string(),
                signature::build_header(&payload_bytes, &secret),
            ),
            (
                "Coinlens-Event-Id".to_string(),
                delivery.payload.id.to_string(),
            ),
        ];

        let start = Instant::now();
        let result = self
            .transport
            .post(&webhook.url, payload_bytes, &headers)
            .await;

        match result {
            Ok(response) => {
                let latency_ms = response.latency.as_millis() as u64;
                let body: String = response.body.chars().take(RESPONSE_BODY_LIMIT).collect();

                if (200..300).contains(&response.status) {
                    self.handle_success(webhook, delivery, response.status, body, latency_ms)
                        .await
                } else {
                    self.handle_failure(
                        webhook,
                        delivery,
                        format!("HTTP {}", response.status),
                        Some(response.status),
                        Some(body),
                        Some(latency_ms),
                    )
                    .await
                }
            }
            Err(e) => {
                let latency_ms = start.elapsed().as_millis() as u64;
                let message = match &e {
                    TransportError::Timeout(t) => format!("Request timeout ({}s)", t.as_secs()),
                    TransportError::Connect(msg) => format!("Connection failed: {msg}"),
                    TransportError::Other(msg) => format!("Request error: {msg}"),
                };
                self.handle_failure(webhook, delivery, message, None, None, Some(latency_ms))
                    .await
            }
        }
    }

    async fn handle_success(
        &self,
        webhook: &Webhook,
        mut delivery: WebhookDelivery,
        http_status: u16,
        body: String,
        latency_ms: u64,
    ) -> WebhookDelivery {
        delivery.status = DeliveryStatus::Success;
        delivery.http_status = Some(http_status);
        delivery.response_body = Some(body);
        delivery.latency_ms = Some(latency_ms);
        delivery.completed_at = Some(Utc::now());
        self.write_record(&delivery).await;

        tracing::info!(
            target: "webhook_delivery",
            delivery_id = %delivery.id,
            webhook_id = %webhook.id,
            event_id = %delivery.payload.id,
            event_type = %delivery.event_type,
            http_status,
            latency_ms,
            attempt_number = delivery.attempt_number,
            "Webhook delivery succeeded"
        );

        if webhook.consecutive_failures > 0 {
            if let Err(e) = self
                .subscriptions
                .reset_consecutive_failures(webhook.id)
                .await
            {
                tracing::error!(
                    target: "webhook_delivery",
                    webhook_id = %webhook.id,
                    error = %e,
                    "Failed to reset consecutive failures"
                );
            }
        }

        if let Err(e) = self
            .subscriptions
            .mark_triggered(webhook.id, Utc::now())
            .await
        {
            tracing::error!(
                target: "webhook_delivery",
                webhook_id = %webhook.id,
                error = %e,
                "Failed to record last-triggered timestamp"
            );
        }

        delivery
    }

    async fn handle_failure(
        &self,
        webhook: &Webhook,
        mut delivery: WebhookDelivery,
        error_message: String,
        http_status: Option<u16>,
        body: Option<String>,
        latency_ms: Option<u64>,
    ) -> WebhookDelivery {
        let has_next_retry = delivery.attempt_number < self.scheduler.max_attempts();

        delivery.http_status = http_status;
        delivery.response_body = body;
        delivery.latency_ms = latency_ms;
        delivery.error = Some(error_message.clone());

        tracing::warn!(
            target: "webhook_delivery",
            delivery_id = %delivery.id,
            webhook_id = %webhook.id,
            event_id = %delivery.payload.id,
            event_type = %delivery.event_type,
            error = %error_message,
            attempt_number = delivery.attempt_number,
            has_next_retry,
            "Webhook delivery failed"
        );

        if has_next_retry {
            let delay = self.scheduler.next_delay(delivery.attempt_number);
            delivery.status = DeliveryStatus::Retrying;
            delivery.next_retry_at = Some(
                Utc::now()
                    + chrono::Duration::from_std(delay)
                        .unwrap_or_else(|_| chrono::Duration::zero()),
            );
            // Record first, then arm the timer: the next attempt must never
            // start before this one is on disk.
            self.write_record(&delivery).await;
            self.scheduler
                .schedule_retry(webhook.id, delivery.id, delivery.attempt_number);
        } else {
            delivery.status = DeliveryStatus::Failed;
            delivery.completed_at = Some(Utc::now());
            self.write_record(&delivery).await;

            tracing::warn!(
                target: "webhook_delivery",
                delivery_id = %delivery.id,
                webhook_id = %webhook.id,
                event_id = %delivery.payload.id,
                attempt_number = delivery.attempt_number,
                "Delivery attempts exhausted, event will not be redelivered automatically"
            );
        }

        self.record_subscription_failure(webhook).await;

        delivery
    }

    /// Bump the consecutive-failure counter and auto-disable past threshold.
    async fn record_subscription_failure(&self, webhook: &Webhook) {
        let failures = match self
            .subscriptions
            .increment_consecutive_failures(webhook.id)
            .await
        {
            Ok(failures) => failures,
            Err(e) => {
                tracing::error!(
                    target: "webhook_delivery",
                    webhook_id = %webhook.id,
                    error = %e,
                    "Failed to increment consecutive failures"
                );
                return;
            }
        };

        if failures >= self.disable_threshold {
            tracing::warn!(
                target: "webhook_delivery",
                webhook_id = %webhook.id,
                consecutive_failures = failures,
                threshold = self.disable_threshold,
                "Auto-disabling subscription after consecutive failures"
            );

            if let Err(e) = self.subscriptions.set_active(webhook.id, false).await {
                tracing::error!(
                    target: "webhook_delivery",
                    webhook_id = %webhook.id,
                    error = %e,
                    "Failed to auto-disable subscription"
                );
            }

            self.scheduler.cancel_for_webhook(webhook.id);
        }
    }

    async fn write_record(&self, delivery: &WebhookDelivery) {
        if let Err(e) = self.deliveries.update(delivery.clone()).await {
            tracing::error!(
                target: "webhook_delivery",
                delivery_id = %delivery.id,
                error = %e,
                "Failed to update delivery record"
            );
        }
    }
}
