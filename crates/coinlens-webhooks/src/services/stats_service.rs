//! Delivery-health aggregation.

use std::sync::Arc;

use uuid::Uuid;

use crate::error::WebhookError;
use crate::models::{DeliveryStats, DeliveryStatus, WebhookDelivery};
use crate::store::DeliveryStore;

/// Pure aggregation over the delivery records of one subscription.
pub struct StatsService {
    deliveries: Arc<dyn DeliveryStore>,
}

impl StatsService {
    pub fn new(deliveries: Arc<dyn DeliveryStore>) -> Self {
        Self { deliveries }
    }

    /// Aggregate delivery health for a webhook.
    ///
    /// Counts every attempt with a recorded outcome: `Success` records are
    /// successes, `Retrying` and `Failed` records are failures. Records
    /// still `Pending`/`Sending` are skipped. With no recorded attempts the
    /// success rate is `0.0`, never NaN.
    pub async fn stats_for(&self, webhook_id: Uuid) -> Result<DeliveryStats, WebhookError> {
        let records = self.deliveries.list_by_webhook(webhook_id, usize::MAX).await?;
        Ok(aggregate(&records))
    }
}

fn aggregate(records: &[WebhookDelivery]) -> DeliveryStats {
    let mut stats = DeliveryStats::empty();
    let mut latency_sum: u128 = 0;
    let mut latency_count: u64 = 0;

    for record in records {
        let outcome_at = record.completed_at.unwrap_or(record.created_at);
        match record.status {
            DeliveryStatus::Success => {
                stats.success_count += 1;
                stats.last_success_at = Some(match stats.last_success_at {
                    Some(at) => at.max(outcome_at),
                    None => outcome_at,
                });
            }
            DeliveryStatus::Retrying | DeliveryStatus::Failed => {
                stats.failure_count += 1;
                stats.last_failure_at = Some(match stats.last_failure_at {
                    Some(at) => at.max(outcome_at),
                    None => outcome_at,
                });
            }
            DeliveryStatus::Pending | DeliveryStatus::Sending => continue,
        }

        if let Some(latency_ms) = record.latency_ms {
            latency_sum += u128::from(latency_ms);
            latency_count += 1;
        }
    }

    stats.total_deliveries = stats.success_count + stats.failure_count;
    if stats.total_deliveries > 0 {
        stats.success_rate = stats.success_count as f64 / stats.total_deliveries as f64;
    }
    if latency_count > 0 {
        stats.average_latency_ms = latency_sum as f64 / latency_count as f64;
    }

    stats
}
