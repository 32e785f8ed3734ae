//! Delivery-history, stats, and redelivery handlers.

use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use uuid::Uuid;

use crate::error::{ApiResult, WebhookError};
use crate::handlers::OwnerId;
use crate::models::{DeliveryStats, ListDeliveriesQuery, WebhookDelivery};
use crate::router::WebhooksState;

/// List recent deliveries for a subscription.
#[utoipa::path(
    get,
    path = "/webhooks/{id}/deliveries",
    tag = "Webhooks",
    params(
        ("id" = Uuid, Path, description = "Subscription ID"),
        ListDeliveriesQuery,
    ),
    responses(
        (status = 200, description = "Delivery records, most recent first", body = [WebhookDelivery]),
        (status = 404, description = "Subscription not found"),
    )
)]
pub async fn list_deliveries_handler(
    State(state): State<WebhooksState>,
    Extension(OwnerId(user_id)): Extension<OwnerId>,
    Path(id): Path<Uuid>,
    Query(query): Query<ListDeliveriesQuery>,
) -> ApiResult<Json<Vec<WebhookDelivery>>> {
    let limit = query.limit.clamp(1, 200);
    let deliveries = state.engine.list_deliveries(user_id, id, limit).await?;
    Ok(Json(deliveries))
}

/// Get a single delivery record.
#[utoipa::path(
    get,
    path = "/webhooks/{id}/deliveries/{delivery_id}",
    tag = "Webhooks",
    params(
        ("id" = Uuid, Path, description = "Subscription ID"),
        ("delivery_id" = Uuid, Path, description = "Delivery ID"),
    ),
    responses(
        (status = 200, description = "Delivery record", body = WebhookDelivery),
        (status = 404, description = "Subscription or delivery not found"),
    )
)]
pub async fn get_delivery_handler(
    State(state): State<WebhooksState>,
    Extension(OwnerId(user_id)): Extension<OwnerId>,
    Path((id, delivery_id)): Path<(Uuid, Uuid)>,
) -> ApiResult<Json<WebhookDelivery>> {
    let delivery = state.engine.get_delivery(user_id, id, delivery_id).await?;
    Ok(Json(delivery))
}

/// Manually redeliver a non-success delivery.
#[utoipa::path(
    post,
    path = "/webhooks/{id}/deliveries/{delivery_id}/redeliver",
    tag = "Webhooks",
    params(
        ("id" = Uuid, Path, description = "Subscription ID"),
        ("delivery_id" = Uuid, Path, description = "Delivery ID"),
    ),
    responses(
        (status = 200, description = "Resulting delivery record", body = WebhookDelivery),
        (status = 400, description = "Delivery already succeeded"),
        (status = 404, description = "Subscription or delivery not found"),
    )
)]
pub async fn redeliver_handler(
    State(state): State<WebhooksState>,
    Extension(OwnerId(user_id)): Extension<OwnerId>,
    Path((id, delivery_id)): Path<(Uuid, Uuid)>,
) -> ApiResult<Json<WebhookDelivery>> {
    // Ownership check; also rejects a delivery id from another subscription.
    state.engine.get_delivery(user_id, id, delivery_id).await?;

    let delivery = state
        .engine
        .retry(delivery_id)
        .await?
        .ok_or(WebhookError::DeliveryNotFound)?;

    Ok(Json(delivery))
}

/// Aggregated delivery health for a subscription.
#[utoipa::path(
    get,
    path = "/webhooks/{id}/stats",
    tag = "Webhooks",
    params(("id" = Uuid, Path, description = "Subscription ID")),
    responses(
        (status = 200, description = "Delivery statistics", body = DeliveryStats),
        (status = 404, description = "Subscription not found"),
    )
)]
pub async fn stats_handler(
    State(state): State<WebhooksState>,
    Extension(OwnerId(user_id)): Extension<OwnerId>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<DeliveryStats>> {
    let stats = state.engine.stats_for(user_id, id).await?;
    Ok(Json(stats))
}
