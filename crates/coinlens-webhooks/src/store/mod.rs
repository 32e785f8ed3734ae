//! Persistence interfaces consumed by the engine.
//!
//! The engine never owns storage: the application injects a
//! [`SubscriptionStore`] and a [`DeliveryStore`]. `memory` backs tests and
//! development; `postgres` is the durable implementation.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::models::{Webhook, WebhookDelivery, WebhookEventType};

/// Error surfaced by a store implementation.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(String),

    #[error("stored record is corrupt: {0}")]
    Corrupt(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        StoreError::Database(e.to_string())
    }
}

/// Subscription persistence.
///
/// Mutating methods are atomic per record; concurrent delivery attempts for
/// different events on the same webhook must not lose counter updates.
#[async_trait]
pub trait SubscriptionStore: Send + Sync {
    async fn get(&self, id: Uuid) -> Result<Option<Webhook>, StoreError>;

    /// Insert or replace a subscription.
    async fn put(&self, webhook: Webhook) -> Result<(), StoreError>;

    /// Returns whether a record was removed.
    async fn delete(&self, id: Uuid) -> Result<bool, StoreError>;

    async fn list_by_user(&self, user_id: Uuid) -> Result<Vec<Webhook>, StoreError>;

    async fn count_by_user(&self, user_id: Uuid) -> Result<usize, StoreError>;

    /// Active subscriptions of a user whose event-type set contains `event_type`.
    async fn list_active_by_event(
        &self,
        user_id: Uuid,
        event_type: WebhookEventType,
    ) -> Result<Vec<Webhook>, StoreError>;

    /// Atomically bump the consecutive-failure counter; returns the new value.
    async fn increment_consecutive_failures(&self, id: Uuid) -> Result<u32, StoreError>;

    async fn reset_consecutive_failures(&self, id: Uuid) -> Result<(), StoreError>;

    async fn mark_triggered(&self, id: Uuid, at: DateTime<Utc>) -> Result<(), StoreError>;

    /// Returns whether the record existed.
    async fn set_active(&self, id: Uuid, active: bool) -> Result<bool, StoreError>;
}

/// Delivery-attempt persistence. Append-mostly: one record per attempt.
#[async_trait]
pub trait DeliveryStore: Send + Sync {
    async fn append(&self, delivery: WebhookDelivery) -> Result<(), StoreError>;

    /// Status transition of an existing record (keyed by `delivery.id`).
    async fn update(&self, delivery: WebhookDelivery) -> Result<(), StoreError>;

    async fn get(&self, id: Uuid) -> Result<Option<WebhookDelivery>, StoreError>;

    /// Most recent records first.
    async fn list_by_webhook(
        &self,
        webhook_id: Uuid,
        limit: usize,
    ) -> Result<Vec<WebhookDelivery>, StoreError>;
}
