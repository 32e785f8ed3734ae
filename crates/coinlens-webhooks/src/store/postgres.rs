//! Postgres store implementations backed by sqlx.
//!
//! Schema lives in `migrations/`. Counter updates and status transitions are
//! single-row UPDATEs, which is all the atomicity the engine requires.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use super::{DeliveryStore, StoreError, SubscriptionStore};
use crate::models::{DeliveryStatus, Webhook, WebhookDelivery, WebhookEventType, WebhookPayload};

/// [`SubscriptionStore`] over the `webhook_subscriptions` table.
#[derive(Clone)]
pub struct PgSubscriptionStore {
    pool: PgPool,
}

impl PgSubscriptionStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(FromRow)]
struct SubscriptionRow {
    id: Uuid,
    user_id: Uuid,
    url: String,
    event_types: Vec<String>,
    secret_encrypted: String,
    active: bool,
    description: Option<String>,
    consecutive_failures: i32,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    last_triggered_at: Option<DateTime<Utc>>,
}

impl TryFrom<SubscriptionRow> for Webhook {
    type Error = StoreError;

    fn try_from(row: SubscriptionRow) -> Result<Self, StoreError> {
        let event_types = row
            .event_types
            .iter()
            .map(|et| {
                WebhookEventType::parse(et)
                    .ok_or_else(|| StoreError::Corrupt(format!("unknown event type {et}")))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Webhook {
            id: row.id,
            user_id: row.user_id,
            url: row.url,
            event_types,
            secret_encrypted: row.secret_encrypted,
            active: row.active,
            description: row.description,
            consecutive_failures: row.consecutive_failures.max(0) as u32,
            created_at: row.created_at,
            updated_at: row.updated_at,
            last_triggered_at: row.last_triggered_at,
        })
    }
}

const SUBSCRIPTION_COLUMNS: &str = "id, user_id, url, event_types, secret_encrypted, active, \
     description, consecutive_failures, created_at, updated_at, last_triggered_at";

#[async_trait]
impl SubscriptionStore for PgSubscriptionStore {
    async fn get(&self, id: Uuid) -> Result<Option<Webhook>, StoreError> {
        let row: Option<SubscriptionRow> = sqlx::query_as(&format!(
            "SELECT {SUBSCRIPTION_COLUMNS} FROM webhook_subscriptions WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Webhook::try_from).transpose()
    }

    async fn put(&self, webhook: Webhook) -> Result<(), StoreError> {
        let event_types: Vec<String> = webhook
            .event_types
            .iter()
            .map(|et| et.as_str().to_string())
            .collect();

        sqlx::query(
            "INSERT INTO webhook_subscriptions \
                 (id, user_id, url, event_types, secret_encrypted, active, description, \
                  consecutive_failures, created_at, updated_at, last_triggered_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11) \
             ON CONFLICT (id) DO UPDATE SET \
                 url = EXCLUDED.url, \
                 event_types = EXCLUDED.event_types, \
                 secret_encrypted = EXCLUDED.secret_encrypted, \
                 active = EXCLUDED.active, \
                 description = EXCLUDED.description, \
                 consecutive_failures = EXCLUDED.consecutive_failures, \
                 updated_at = EXCLUDED.updated_at, \
                 last_triggered_at = EXCLUDED.last_triggered_at",
        )
        .bind(webhook.id)
        .bind(webhook.user_id)
        .bind(&webhook.url)
        .bind(&event_types)
        .bind(&webhook.secret_encrypted)
        .bind(webhook.active)
        .bind(&webhook.description)
        .bind(webhook.consecutive_failures as i32)
        .bind(webhook.created_at)
        .bind(webhook.updated_at)
        .bind(webhook.last_triggered_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM webhook_subscriptions WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_by_user(&self, user_id: Uuid) -> Result<Vec<Webhook>, StoreError> {
        let rows: Vec<SubscriptionRow> = sqlx::query_as(&format!(
            "SELECT {SUBSCRIPTION_COLUMNS} FROM webhook_subscriptions \
             WHERE user_id = $1 ORDER BY created_at"
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Webhook::try_from).collect()
    }

    async fn count_by_user(&self, user_id: Uuid) -> Result<usize, StoreError> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM webhook_subscriptions WHERE user_id = $1")
                .bind(user_id)
                .fetch_one(&self.pool)
                .await?;
        Ok(count.max(0) as usize)
    }

    async fn list_active_by_event(
        &self,
        user_id: Uuid,
        event_type: WebhookEventType,
    ) -> Result<Vec<Webhook>, StoreError> {
        let rows: Vec<SubscriptionRow> = sqlx::query_as(&format!(
            "SELECT {SUBSCRIPTION_COLUMNS} FROM webhook_subscriptions \
             WHERE user_id = $1 AND active AND $2 = ANY(event_types) \
             ORDER BY created_at"
        ))
        .bind(user_id)
        .bind(event_type.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Webhook::try_from).collect()
    }

    async fn increment_consecutive_failures(&self, id: Uuid) -> Result<u32, StoreError> {
        let failures: i32 = sqlx::query_scalar(
            "UPDATE webhook_subscriptions \
             SET consecutive_failures = consecutive_failures + 1, updated_at = NOW() \
             WHERE id = $1 \
             RETURNING consecutive_failures",
        )
        .bind(id)
        .fetch_one(&self.pool)
        .await?;
        Ok(failures.max(0) as u32)
    }

    async fn reset_consecutive_failures(&self, id: Uuid) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE webhook_subscriptions \
             SET consecutive_failures = 0, updated_at = NOW() \
             WHERE id = $1",
        )
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn mark_triggered(&self, id: Uuid, at: DateTime<Utc>) -> Result<(), StoreError> {
        sqlx::query("UPDATE webhook_subscriptions SET last_triggered_at = $2 WHERE id = $1")
            .bind(id)
            .bind(at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn set_active(&self, id: Uuid, active: bool) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE webhook_subscriptions SET active = $2, updated_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .bind(active)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}

/// [`DeliveryStore`] over the `webhook_deliveries` table.
#[derive(Clone)]
pub struct PgDeliveryStore {
    pool: PgPool,
}

impl PgDeliveryStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(FromRow)]
struct DeliveryRow {
    id: Uuid,
    webhook_id: Uuid,
    event_type: String,
    payload: Json<WebhookPayload>,
    status: String,
    http_status: Option<i16>,
    response_body: Option<String>,
    latency_ms: Option<i64>,
    error: Option<String>,
    attempt_number: i32,
    next_retry_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
}

impl TryFrom<DeliveryRow> for WebhookDelivery {
    type Error = StoreError;

    fn try_from(row: DeliveryRow) -> Result<Self, StoreError> {
        let event_type = WebhookEventType::parse(&row.event_type)
            .ok_or_else(|| StoreError::Corrupt(format!("unknown event type {}", row.event_type)))?;
        let status = DeliveryStatus::parse(&row.status)
            .ok_or_else(|| StoreError::Corrupt(format!("unknown status {}", row.status)))?;

        Ok(WebhookDelivery {
            id: row.id,
            webhook_id: row.webhook_id,
            event_type,
            payload: row.payload.0,
            status,
            http_status: row.http_status.map(|s| s.max(0) as u16),
            response_body: row.response_body,
            latency_ms: row.latency_ms.map(|l| l.max(0) as u64),
            error: row.error,
            attempt_number: row.attempt_number.max(0) as u32,
            next_retry_at: row.next_retry_at,
            created_at: row.created_at,
            completed_at: row.completed_at,
        })
    }
}

const DELIVERY_COLUMNS: &str = "id, webhook_id, event_type, payload, status, http_status, \
     response_body, latency_ms, error, attempt_number, next_retry_at, created_at, completed_at";

#[async_trait]
impl DeliveryStore for PgDeliveryStore {
    async fn append(&self, delivery: WebhookDelivery) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO webhook_deliveries \
                 (id, webhook_id, event_type, payload, status, http_status, response_body, \
                  latency_ms, error, attempt_number, next_retry_at, created_at, completed_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)",
        )
        .bind(delivery.id)
        .bind(delivery.webhook_id)
        .bind(delivery.event_type.as_str())
        .bind(Json(&delivery.payload))
        .bind(delivery.status.as_str())
        .bind(delivery.http_status.map(|s| s as i16))
        .bind(&delivery.response_body)
        .bind(delivery.latency_ms.map(|l| l as i64))
        .bind(&delivery.error)
        .bind(delivery.attempt_number as i32)
        .bind(delivery.next_retry_at)
        .bind(delivery.created_at)
        .bind(delivery.completed_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn update(&self, delivery: WebhookDelivery) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE webhook_deliveries SET \
                 payload = $2, status = $3, http_status = $4, response_body = $5, \
                 latency_ms = $6, error = $7, attempt_number = $8, next_retry_at = $9, \
                 completed_at = $10 \
             WHERE id = $1",
        )
        .bind(delivery.id)
        .bind(Json(&delivery.payload))
        .bind(delivery.status.as_str())
        .bind(delivery.http_status.map(|s| s as i16))
        .bind(&delivery.response_body)
        .bind(delivery.latency_ms.map(|l| l as i64))
        .bind(&delivery.error)
        .bind(delivery.attempt_number as i32)
        .bind(delivery.next_retry_at)
        .bind(delivery.completed_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<WebhookDelivery>, StoreError> {
        let row: Option<DeliveryRow> = sqlx::query_as(&format!(
            "SELECT {DELIVERY_COLUMNS} FROM webhook_deliveries WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(WebhookDelivery::try_from).transpose()
    }

    async fn list_by_webhook(
        &self,
        webhook_id: Uuid,
        limit: usize,
    ) -> Result<Vec<WebhookDelivery>, StoreError> {
        let limit = limit.min(i64::MAX as usize) as i64;
        let rows: Vec<DeliveryRow> = sqlx::query_as(&format!(
            "SELECT {DELIVERY_COLUMNS} FROM webhook_deliveries \
             WHERE webhook_id = $1 \
             ORDER BY created_at DESC, attempt_number DESC \
             LIMIT $2"
        ))
        .bind(webhook_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(WebhookDelivery::try_from).collect()
    }
}
