//! HTTP handlers for the webhook API surface.

pub mod deliveries;
pub mod subscriptions;

use uuid::Uuid;

/// Authenticated caller identity.
///
/// Installed as a request extension by the application's auth middleware;
/// the engine itself performs no authentication.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OwnerId(pub Uuid);
