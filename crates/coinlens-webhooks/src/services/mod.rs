//! Engine services: subscription registry, delivery execution, stats.

pub mod delivery_service;
pub mod stats_service;
pub mod subscription_service;
