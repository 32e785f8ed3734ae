//! Axum router setup for webhook endpoints.

use axum::{
    routing::{get, post},
    Router,
};

use crate::engine::WebhookEngine;
use crate::handlers::{deliveries, subscriptions};

/// Shared state for webhook handlers.
#[derive(Clone)]
pub struct WebhooksState {
    pub engine: WebhookEngine,
}

impl WebhooksState {
    #[must_use]
    pub fn new(engine: WebhookEngine) -> Self {
        Self { engine }
    }
}

/// Creates the webhook router with all routes.
///
/// The application mounts this behind its auth middleware, which must
/// install an [`crate::handlers::OwnerId`] extension on every request.
pub fn webhooks_router(state: WebhooksState) -> Router {
    Router::new()
        // Subscription CRUD
        .route(
            "/webhooks",
            post(subscriptions::create_webhook_handler)
                .get(subscriptions::list_webhooks_handler),
        )
        .route(
            "/webhooks/:id",
            get(subscriptions::get_webhook_handler)
                .patch(subscriptions::update_webhook_handler)
                .delete(subscriptions::delete_webhook_handler),
        )
        // Secret rotation + test delivery
        .route(
            "/webhooks/:id/rotate-secret",
            post(subscriptions::rotate_secret_handler),
        )
        .route("/webhooks/:id/test", post(subscriptions::test_webhook_handler))
        // Event types
        .route(
            "/webhook-event-types",
            get(subscriptions::list_event_types_handler),
        )
        // Delivery history + stats
        .route(
            "/webhooks/:id/deliveries",
            get(deliveries::list_deliveries_handler),
        )
        .route(
            "/webhooks/:id/deliveries/:delivery_id",
            get(deliveries::get_delivery_handler),
        )
        .route(
            "/webhooks/:id/deliveries/:delivery_id/redeliver",
            post(deliveries::redeliver_handler),
        )
        .route("/webhooks/:id/stats", get(deliveries::stats_handler))
        .with_state(state)
}
