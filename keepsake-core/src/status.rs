use async_trait::async_trait;
use serde::Serialize;
use tracing::debug;
use uuid::Uuid;

use crate::TransportError;

/// Body posted to the order-status endpoint once pickup is booked.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct OrderStatusUpdate {
    pub order_id: Uuid,
    pub tracking_id: String,
    pub pickup_id: String,
}

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("status endpoint answered {0}")]
    NotAcknowledged(u16),
}

#[async_trait]
pub trait OrderStatusNotifier: Send + Sync {
    async fn notify(&self, update: &OrderStatusUpdate) -> Result<(), NotifyError>;
}

/// Used when no order-status endpoint is configured
pub struct DisabledStatusNotifier;

#[async_trait]
impl OrderStatusNotifier for DisabledStatusNotifier {
    async fn notify(&self, update: &OrderStatusUpdate) -> Result<(), NotifyError> {
        debug!("No order-status endpoint configured, skipping update for {}", update.order_id);
        Ok(())
    }
}
