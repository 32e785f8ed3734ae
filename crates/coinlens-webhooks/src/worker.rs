//! Background worker that executes due retries.

use std::sync::Arc;

use tokio::sync::mpsc;
use uuid::Uuid;

use crate::services::delivery_service::DeliveryService;

/// Drains the scheduler's due-retry channel and re-executes deliveries.
///
/// Spawn with `tokio::spawn(worker.run())`. The loop ends once the
/// scheduler (the only sender) is dropped.
pub struct RetryWorker {
    delivery_service: Arc<DeliveryService>,
    rx: mpsc::UnboundedReceiver<Uuid>,
}

impl RetryWorker {
    #[must_use]
    pub fn new(
        delivery_service: Arc<DeliveryService>,
        rx: mpsc::UnboundedReceiver<Uuid>,
    ) -> Self {
        Self {
            delivery_service,
            rx,
        }
    }

    pub async fn run(mut self) {
        tracing::info!(target: "webhook_delivery", "Retry worker started");

        while let Some(delivery_id) = self.rx.recv().await {
            self.delivery_service.process_retry(delivery_id).await;
        }

        tracing::info!(target: "webhook_delivery", "Retry worker stopped");
    }
}
