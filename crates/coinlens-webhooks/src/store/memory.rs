//! In-memory store implementations.
//!
//! Back the engine in tests and development. Mutations serialize through a
//! mutex, which gives the same per-record atomicity the Postgres stores get
//! from single-row UPDATEs.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::{DeliveryStore, StoreError, SubscriptionStore};
use crate::models::{Webhook, WebhookDelivery, WebhookEventType};

/// Hash-map backed [`SubscriptionStore`].
#[derive(Default)]
pub struct InMemorySubscriptionStore {
    webhooks: Mutex<HashMap<Uuid, Webhook>>,
}

impl InMemorySubscriptionStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SubscriptionStore for InMemorySubscriptionStore {
    async fn get(&self, id: Uuid) -> Result<Option<Webhook>, StoreError> {
        Ok(self.webhooks.lock().unwrap().get(&id).cloned())
    }

    async fn put(&self, webhook: Webhook) -> Result<(), StoreError> {
        self.webhooks.lock().unwrap().insert(webhook.id, webhook);
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<bool, StoreError> {
        Ok(self.webhooks.lock().unwrap().remove(&id).is_some())
    }

    async fn list_by_user(&self, user_id: Uuid) -> Result<Vec<Webhook>, StoreError> {
        let mut webhooks: Vec<Webhook> = self
            .webhooks
            .lock()
            .unwrap()
            .values()
            .filter(|w| w.user_id == user_id)
            .cloned()
            .collect();
        webhooks.sort_by_key(|w| w.created_at);
        Ok(webhooks)
    }

    async fn count_by_user(&self, user_id: Uuid) -> Result<usize, StoreError> {
        Ok(self
            .webhooks
            .lock()
            .unwrap()
            .values()
            .filter(|w| w.user_id == user_id)
            .count())
    }

    async fn list_active_by_event(
        &self,
        user_id: Uuid,
        event_type: WebhookEventType,
    ) -> Result<Vec<Webhook>, StoreError> {
        let mut webhooks: Vec<Webhook> = self
            .webhooks
            .lock()
            .unwrap()
            .values()
            .filter(|w| w.user_id == user_id && w.active && w.subscribes_to(event_type))
            .cloned()
            .collect();
        webhooks.sort_by_key(|w| w.created_at);
        Ok(webhooks)
    }

    async fn increment_consecutive_failures(&self, id: Uuid) -> Result<u32, StoreError> {
        let mut webhooks = self.webhooks.lock().unwrap();
        let webhook = webhooks
            .get_mut(&id)
            .ok_or_else(|| StoreError::Database(format!("no subscription {id}")))?;
        webhook.consecutive_failures += 1;
        webhook.updated_at = Utc::now();
        Ok(webhook.consecutive_failures)
    }

    async fn reset_consecutive_failures(&self, id: Uuid) -> Result<(), StoreError> {
        let mut webhooks = self.webhooks.lock().unwrap();
        if let Some(webhook) = webhooks.get_mut(&id) {
            webhook.consecutive_failures = 0;
            webhook.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn mark_triggered(&self, id: Uuid, at: DateTime<Utc>) -> Result<(), StoreError> {
        let mut webhooks = self.webhooks.lock().unwrap();
        if let Some(webhook) = webhooks.get_mut(&id) {
            webhook.last_triggered_at = Some(at);
        }
        Ok(())
    }

    async fn set_active(&self, id: Uuid, active: bool) -> Result<bool, StoreError> {
        let mut webhooks = self.webhooks.lock().unwrap();
        match webhooks.get_mut(&id) {
            Some(webhook) => {
                webhook.active = active;
                webhook.updated_at = Utc::now();
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

/// Hash-map backed [`DeliveryStore`] keeping insertion order.
#[derive(Default)]
pub struct InMemoryDeliveryStore {
    deliveries: Mutex<Vec<WebhookDelivery>>,
}

impl InMemoryDeliveryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DeliveryStore for InMemoryDeliveryStore {
    async fn append(&self, delivery: WebhookDelivery) -> Result<(), StoreError> {
        self.deliveries.lock().unwrap().push(delivery);
        Ok(())
    }

    async fn update(&self, delivery: WebhookDelivery) -> Result<(), StoreError> {
        let mut deliveries = self.deliveries.lock().unwrap();
        match deliveries.iter_mut().find(|d| d.id == delivery.id) {
            Some(existing) => {
                *existing = delivery;
                Ok(())
            }
            None => Err(StoreError::Database(format!(
                "no delivery {} to update",
                delivery.id
            ))),
        }
    }

    async fn get(&self, id: Uuid) -> Result<Option<WebhookDelivery>, StoreError> {
        Ok(self
            .deliveries
            .lock()
            .unwrap()
            .iter()
            .find(|d| d.id == id)
            .cloned())
    }

    async fn list_by_webhook(
        &self,
        webhook_id: Uuid,
        limit: usize,
    ) -> Result<Vec<WebhookDelivery>, StoreError> {
        let deliveries = self.deliveries.lock().unwrap();
        Ok(deliveries
            .iter()
            .rev()
            .filter(|d| d.webhook_id == webhook_id)
            .take(limit)
            .cloned()
            .collect())
    }
}
