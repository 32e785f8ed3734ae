//! Subscription CRUD with URL safety, per-user caps, and secret lifecycle.

use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use crate::config::WebhookConfig;
use crate::crypto::SecretCipher;
use crate::error::WebhookError;
use crate::models::{
    CreateWebhookRequest, UpdateWebhookRequest, Webhook, WebhookResponse,
};
use crate::scheduler::RetryScheduler;
use crate::secret;
use crate::store::SubscriptionStore;
use crate::validation;

/// Registry of webhook subscriptions, scoped to the owning user on every
/// operation.
pub struct SubscriptionService {
    store: Arc<dyn SubscriptionStore>,
    scheduler: Arc<RetryScheduler>,
    cipher: SecretCipher,
    max_subscriptions: usize,
    allow_http: bool,
}

impl SubscriptionService {
    pub fn new(
        store: Arc<dyn SubscriptionStore>,
        scheduler: Arc<RetryScheduler>,
        cipher: SecretCipher,
        config: &WebhookConfig,
    ) -> Self {
        Self {
            store,
            scheduler,
            cipher,
            max_subscriptions: config.max_subscriptions_per_user,
            allow_http: config.allow_http,
        }
    }

    /// Create a subscription.
    ///
    /// The response carries the plaintext signing secret; this is the only
    /// time it is revealed (besides [`Self::regenerate_secret`]).
    pub async fn create(
        &self,
        user_id: Uuid,
        request: CreateWebhookRequest,
    ) -> Result<WebhookResponse, WebhookError> {
        validation::validate_webhook_url(&request.url, self.allow_http)?;
        let event_types = validation::parse_event_types(&request.event_types)?;

        let count = self.store.count_by_user(user_id).await?;
        if count >= self.max_subscriptions {
            return Err(WebhookError::LimitExceeded {
                limit: self.max_subscriptions,
            });
        }

        let plaintext_secret = secret::generate();
        let secret_encrypted = self.cipher.encrypt(&plaintext_secret)?;

        let now = Utc::now();
        let webhook = Webhook {
            id: Uuid::new_v4(),
            user_id,
            url: request.url,
            event_types,
            secret_encrypted,
            active: true,
            description: request.description,
            consecutive_failures: 0,
            created_at: now,
            updated_at: now,
            last_triggered_at: None,
        };

        self.store.put(webhook.clone()).await?;

        tracing::info!(
            target: "webhook_subscriptions",
            webhook_id = %webhook.id,
            user_id = %user_id,
            url = %webhook.url,
            "Created webhook subscription"
        );

        Ok(WebhookResponse::with_secret(webhook, plaintext_secret))
    }

    /// List all subscriptions owned by a user.
    pub async fn list(&self, user_id: Uuid) -> Result<Vec<WebhookResponse>, WebhookError> {
        let webhooks = self.store.list_by_user(user_id).await?;
        Ok(webhooks.into_iter().map(WebhookResponse::from_webhook).collect())
    }

    /// Fetch one owned subscription.
    pub async fn get(&self, user_id: Uuid, id: Uuid) -> Result<WebhookResponse, WebhookError> {
        let webhook = self.load_owned(user_id, id).await?;
        Ok(WebhookResponse::from_webhook(webhook))
    }

    /// Apply a patch; absent fields stay unchanged. Changed URL and event
    /// types are re-validated. Deactivation cancels pending retries.
    pub async fn update(
        &self,
        user_id: Uuid,
        id: Uuid,
        patch: UpdateWebhookRequest,
    ) -> Result<WebhookResponse, WebhookError> {
        let mut webhook = self.load_owned(user_id, id).await?;

        if let Some(url) = patch.url {
            validation::validate_webhook_url(&url, self.allow_http)?;
            webhook.url = url;
        }
        if let Some(event_types) = patch.event_types {
            webhook.event_types = validation::parse_event_types(&event_types)?;
        }
        if let Some(description) = patch.description {
            webhook.description = Some(description);
        }
        let deactivated = match patch.active {
            Some(active) => {
                let deactivated = webhook.active && !active;
                // Re-enabling starts with a clean failure streak.
                if !webhook.active && active {
                    webhook.consecutive_failures = 0;
                }
                webhook.active = active;
                deactivated
            }
            None => false,
        };

        webhook.updated_at = Utc::now();
        self.store.put(webhook.clone()).await?;

        if deactivated {
            let cancelled = self.scheduler.cancel_for_webhook(webhook.id);
            if cancelled > 0 {
                tracing::info!(
                    target: "webhook_subscriptions",
                    webhook_id = %webhook.id,
                    cancelled,
                    "Cancelled pending retries for deactivated subscription"
                );
            }
        }

        Ok(WebhookResponse::from_webhook(webhook))
    }

    /// Delete an owned subscription and cancel its pending retries.
    pub async fn delete(&self, user_id: Uuid, id: Uuid) -> Result<(), WebhookError> {
        // Ownership check before the destructive step.
        self.load_owned(user_id, id).await?;

        let removed = self.store.delete(id).await?;
        if !removed {
            return Err(WebhookError::SubscriptionNotFound);
        }

        let cancelled = self.scheduler.cancel_for_webhook(id);
        tracing::info!(
            target: "webhook_subscriptions",
            webhook_id = %id,
            user_id = %user_id,
            cancelled_retries = cancelled,
            "Deleted webhook subscription"
        );

        Ok(())
    }

    /// Replace the signing secret, invalidating the previous one immediately.
    ///
    /// In-flight retries are unaffected: every attempt signs with the
    /// current secret at send time.
    pub async fn regenerate_secret(
        &self,
        user_id: Uuid,
        id: Uuid,
    ) -> Result<WebhookResponse, WebhookError> {
        let mut webhook = self.load_owned(user_id, id).await?;

        let plaintext_secret = secret::generate();
        webhook.secret_encrypted = self.cipher.encrypt(&plaintext_secret)?;
        webhook.updated_at = Utc::now();
        self.store.put(webhook.clone()).await?;

        tracing::info!(
            target: "webhook_subscriptions",
            webhook_id = %id,
            user_id = %user_id,
            "Rotated webhook signing secret"
        );

        Ok(WebhookResponse::with_secret(webhook, plaintext_secret))
    }

    async fn load_owned(&self, user_id: Uuid, id: Uuid) -> Result<Webhook, WebhookError> {
        match self.store.get(id).await? {
            Some(webhook) if webhook.user_id == user_id => Ok(webhook),
            // Another user's subscription is indistinguishable from a
            // missing one.
            _ => Err(WebhookError::SubscriptionNotFound),
        }
    }
}
