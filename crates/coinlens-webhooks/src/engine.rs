//! Library facade wiring stores, transport, scheduler, and services.
//!
//! The surrounding application constructs one [`WebhookEngine`] at startup,
//! spawns the returned [`RetryWorker`], and uses `dispatch` as the single
//! ingress point for raising events.

use std::sync::Arc;

use uuid::Uuid;

use crate::config::WebhookConfig;
use crate::crypto::SecretCipher;
use crate::error::WebhookError;
use crate::models::{DeliveryStats, WebhookDelivery, WebhookEventType};
use crate::scheduler::RetryScheduler;
use crate::services::delivery_service::DeliveryService;
use crate::services::stats_service::StatsService;
use crate::services::subscription_service::SubscriptionService;
use crate::store::memory::{InMemoryDeliveryStore, InMemorySubscriptionStore};
use crate::store::{DeliveryStore, SubscriptionStore};
use crate::transport::{HttpTransport, ReqwestTransport};
use crate::worker::RetryWorker;

/// The assembled webhook engine.
#[derive(Clone)]
pub struct WebhookEngine {
    subscriptions: Arc<SubscriptionService>,
    delivery: Arc<DeliveryService>,
    stats: Arc<StatsService>,
    scheduler: Arc<RetryScheduler>,
    delivery_store: Arc<dyn DeliveryStore>,
}

impl WebhookEngine {
    /// Assemble the engine from injected stores and transport.
    ///
    /// Returns the engine plus the retry worker; spawn the worker with
    /// `tokio::spawn(worker.run())` or scheduled retries will never execute.
    ///
    /// # Errors
    ///
    /// Fails when the configured encryption key is not 32 bytes.
    pub fn new(
        config: WebhookConfig,
        subscription_store: Arc<dyn SubscriptionStore>,
        delivery_store: Arc<dyn DeliveryStore>,
        transport: Arc<dyn HttpTransport>,
    ) -> Result<(Self, RetryWorker), WebhookError> {
        let cipher = SecretCipher::new(&config.encryption_key)?;
        let (scheduler, due_rx) =
            RetryScheduler::new(config.backoff_schedule.clone(), config.max_attempts);

        let delivery = Arc::new(DeliveryService::new(
            Arc::clone(&subscription_store),
            Arc::clone(&delivery_store),
            transport,
            Arc::clone(&scheduler),
            cipher.clone(),
            &config,
        ));
        let subscriptions = Arc::new(SubscriptionService::new(
            subscription_store,
            Arc::clone(&scheduler),
            cipher,
            &config,
        ));
        let stats = Arc::new(StatsService::new(Arc::clone(&delivery_store)));

        let worker = RetryWorker::new(Arc::clone(&delivery), due_rx);

        Ok((
            Self {
                subscriptions,
                delivery,
                stats,
                scheduler,
                delivery_store,
            },
            worker,
        ))
    }

    /// Engine over in-memory stores and the production HTTP transport.
    ///
    /// Suits development and tests; durable deployments inject the Postgres
    /// stores instead.
    pub fn in_memory(config: WebhookConfig) -> Result<(Self, RetryWorker), WebhookError> {
        let transport = ReqwestTransport::new(config.http_timeout)
            .map_err(|e| WebhookError::Internal(e.to_string()))?;
        Self::new(
            config,
            Arc::new(InMemorySubscriptionStore::new()),
            Arc::new(InMemoryDeliveryStore::new()),
            Arc::new(transport),
        )
    }

    /// Single ingress point for application events.
    pub async fn dispatch(
        &self,
        user_id: Uuid,
        event_type: WebhookEventType,
        data: serde_json::Value,
    ) -> Result<Vec<WebhookDelivery>, WebhookError> {
        self.delivery.dispatch(user_id, event_type, data).await
    }

    /// Deliver a test ping to one owned subscription.
    pub async fn send_test_event(
        &self,
        user_id: Uuid,
        webhook_id: Uuid,
    ) -> Result<WebhookDelivery, WebhookError> {
        self.subscriptions.get(user_id, webhook_id).await?;
        self.delivery.send_test_event(webhook_id).await
    }

    /// Operator-triggered redelivery of a non-success delivery.
    pub async fn retry(
        &self,
        delivery_id: Uuid,
    ) -> Result<Option<WebhookDelivery>, WebhookError> {
        self.delivery.retry(delivery_id).await
    }

    /// Delivery history for an owned subscription, most recent first.
    pub async fn list_deliveries(
        &self,
        user_id: Uuid,
        webhook_id: Uuid,
        limit: usize,
    ) -> Result<Vec<WebhookDelivery>, WebhookError> {
        self.subscriptions.get(user_id, webhook_id).await?;
        Ok(self.delivery_store.list_by_webhook(webhook_id, limit).await?)
    }

    /// One delivery record of an owned subscription.
    pub async fn get_delivery(
        &self,
        user_id: Uuid,
        webhook_id: Uuid,
        delivery_id: Uuid,
    ) -> Result<WebhookDelivery, WebhookError> {
        self.subscriptions.get(user_id, webhook_id).await?;
        match self.delivery_store.get(delivery_id).await? {
            Some(delivery) if delivery.webhook_id == webhook_id => Ok(delivery),
            _ => Err(WebhookError::DeliveryNotFound),
        }
    }

    /// Aggregated delivery health for an owned subscription.
    pub async fn stats_for(
        &self,
        user_id: Uuid,
        webhook_id: Uuid,
    ) -> Result<DeliveryStats, WebhookError> {
        self.subscriptions.get(user_id, webhook_id).await?;
        self.stats.stats_for(webhook_id).await
    }

    /// Subscription registry operations.
    #[must_use]
    pub fn subscriptions(&self) -> &SubscriptionService {
        &self.subscriptions
    }

    /// Retry timing state (pending timers, backoff table).
    #[must_use]
    pub fn scheduler(&self) -> &Arc<RetryScheduler> {
        &self.scheduler
    }
}
