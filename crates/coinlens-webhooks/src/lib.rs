//! Webhook subscription and delivery engine for the Coinlens platform.
//!
//! Provides per-user webhook subscription management, signed event envelopes
//! (HMAC-SHA256 over timestamped payloads), HTTP delivery with bounded
//! retries and backoff, and per-subscription delivery tracking.

pub mod config;
pub mod crypto;
pub mod engine;
pub mod error;
pub mod handlers;
pub mod models;
pub mod router;
pub mod scheduler;
pub mod secret;
pub mod services;
pub mod signature;
pub mod store;
pub mod transport;
pub mod validation;
pub mod worker;

pub use config::WebhookConfig;
pub use engine::WebhookEngine;
pub use error::WebhookError;
pub use handlers::OwnerId;
pub use models::{DeliveryStatus, WebhookDelivery, WebhookEventType, WebhookPayload};
pub use router::{webhooks_router, WebhooksState};
pub use signature::{Signature, SignatureError};
pub use worker::RetryWorker;
