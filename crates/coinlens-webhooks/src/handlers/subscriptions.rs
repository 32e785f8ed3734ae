//! CRUD handlers for webhook subscriptions.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use uuid::Uuid;
use validator::Validate;

use crate::error::{ApiResult, WebhookError};
use crate::handlers::OwnerId;
use crate::models::{
    CreateWebhookRequest, EventTypeInfo, EventTypeListResponse, UpdateWebhookRequest,
    WebhookDelivery, WebhookEventType, WebhookResponse,
};
use crate::router::WebhooksState;

/// Create a new webhook subscription.
#[utoipa::path(
    post,
    path = "/webhooks",
    tag = "Webhooks",
    request_body = CreateWebhookRequest,
    responses(
        (status = 201, description = "Subscription created; response includes the signing secret", body = WebhookResponse),
        (status = 400, description = "Invalid URL or event type"),
        (status = 409, description = "Subscription limit exceeded"),
    )
)]
pub async fn create_webhook_handler(
    State(state): State<WebhooksState>,
    Extension(OwnerId(user_id)): Extension<OwnerId>,
    Json(request): Json<CreateWebhookRequest>,
) -> ApiResult<(StatusCode, Json<WebhookResponse>)> {
    request
        .validate()
        .map_err(|e| WebhookError::Validation(e.to_string()))?;

    let response = state.engine.subscriptions().create(user_id, request).await?;

    Ok((StatusCode::CREATED, Json(response)))
}

/// List the caller's webhook subscriptions.
#[utoipa::path(
    get,
    path = "/webhooks",
    tag = "Webhooks",
    responses(
        (status = 200, description = "Subscriptions owned by the caller", body = [WebhookResponse]),
    )
)]
pub async fn list_webhooks_handler(
    State(state): State<WebhooksState>,
    Extension(OwnerId(user_id)): Extension<OwnerId>,
) -> ApiResult<Json<Vec<WebhookResponse>>> {
    let response = state.engine.subscriptions().list(user_id).await?;
    Ok(Json(response))
}

/// Get a single webhook subscription.
#[utoipa::path(
    get,
    path = "/webhooks/{id}",
    tag = "Webhooks",
    params(("id" = Uuid, Path, description = "Subscription ID")),
    responses(
        (status = 200, description = "Subscription details", body = WebhookResponse),
        (status = 404, description = "Subscription not found"),
    )
)]
pub async fn get_webhook_handler(
    State(state): State<WebhooksState>,
    Extension(OwnerId(user_id)): Extension<OwnerId>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<WebhookResponse>> {
    let response = state.engine.subscriptions().get(user_id, id).await?;
    Ok(Json(response))
}

/// Update a webhook subscription.
#[utoipa::path(
    patch,
    path = "/webhooks/{id}",
    tag = "Webhooks",
    params(("id" = Uuid, Path, description = "Subscription ID")),
    request_body = UpdateWebhookRequest,
    responses(
        (status = 200, description = "Subscription updated", body = WebhookResponse),
        (status = 400, description = "Invalid URL or event type"),
        (status = 404, description = "Subscription not found"),
    )
)]
pub async fn update_webhook_handler(
    State(state): State<WebhooksState>,
    Extension(OwnerId(user_id)): Extension<OwnerId>,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateWebhookRequest>,
) -> ApiResult<Json<WebhookResponse>> {
    request
        .validate()
        .map_err(|e| WebhookError::Validation(e.to_string()))?;

    let response = state
        .engine
        .subscriptions()
        .update(user_id, id, request)
        .await?;

    Ok(Json(response))
}

/// Delete a webhook subscription and cancel its pending retries.
#[utoipa::path(
    delete,
    path = "/webhooks/{id}",
    tag = "Webhooks",
    params(("id" = Uuid, Path, description = "Subscription ID")),
    responses(
        (status = 204, description = "Subscription deleted"),
        (status = 404, description = "Subscription not found"),
    )
)]
pub async fn delete_webhook_handler(
    State(state): State<WebhooksState>,
    Extension(OwnerId(user_id)): Extension<OwnerId>,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    state.engine.subscriptions().delete(user_id, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Rotate the signing secret.
#[utoipa::path(
    post,
    path = "/webhooks/{id}/rotate-secret",
    tag = "Webhooks",
    params(("id" = Uuid, Path, description = "Subscription ID")),
    responses(
        (status = 200, description = "New secret in the response body", body = WebhookResponse),
        (status = 404, description = "Subscription not found"),
    )
)]
pub async fn rotate_secret_handler(
    State(state): State<WebhooksState>,
    Extension(OwnerId(user_id)): Extension<OwnerId>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<WebhookResponse>> {
    let response = state
        .engine
        .subscriptions()
        .regenerate_secret(user_id, id)
        .await?;
    Ok(Json(response))
}

/// Trigger a test delivery to one subscription.
#[utoipa::path(
    post,
    path = "/webhooks/{id}/test",
    tag = "Webhooks",
    params(("id" = Uuid, Path, description = "Subscription ID")),
    responses(
        (status = 200, description = "Resulting delivery record", body = WebhookDelivery),
        (status = 404, description = "Subscription not found"),
    )
)]
pub async fn test_webhook_handler(
    State(state): State<WebhooksState>,
    Extension(OwnerId(user_id)): Extension<OwnerId>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<WebhookDelivery>> {
    let delivery = state.engine.send_test_event(user_id, id).await?;
    Ok(Json(delivery))
}

/// List all supported webhook event types.
#[utoipa::path(
    get,
    path = "/webhook-event-types",
    tag = "Webhooks",
    responses(
        (status = 200, description = "List of event types", body = EventTypeListResponse),
    )
)]
pub async fn list_event_types_handler() -> Json<EventTypeListResponse> {
    let event_types = WebhookEventType::all()
        .iter()
        .map(|et| EventTypeInfo {
            event_type: et.as_str().to_string(),
            category: et.category().to_string(),
            description: et.description().to_string(),
        })
        .collect();

    Json(EventTypeListResponse { event_types })
}
