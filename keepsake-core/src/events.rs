use async_trait::async_trait;
use keepsake_shared::models::events::FulfillmentEvent;
use tracing::info;

#[async_trait]
pub trait FulfillmentEvents: Send + Sync {
    /// Publish an event. Failures are reported but must not affect the order.
    async fn publish(&self, event: &FulfillmentEvent) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}

/// Sink used when no broker is configured: events only reach the log.
pub struct LogEventSink;

#[async_trait]
impl FulfillmentEvents for LogEventSink {
    async fn publish(&self, event: &FulfillmentEvent) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let payload = serde_json::to_string(event)?;
        info!(event = event.kind(), order_id = %event.order_id(), "{}", payload);
        Ok(())
    }
}
