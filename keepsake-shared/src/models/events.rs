use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct PaymentConfirmedEvent {
    pub order_id: Uuid,
    pub gateway_order_id: String,
    pub payment_reference: String,
    pub timestamp: i64,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct OrderFulfilledEvent {
    pub order_id: Uuid,
    pub tracking_id: String,
    pub pickup_id: String,
    pub timestamp: i64,
}

/// Raised whenever a post-payment logistics stage fails and back-office
/// has to take over the order.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ManualFulfillmentRequiredEvent {
    pub order_id: Uuid,
    pub failed_stage: String,
    pub reason: String,
    pub tracking_id: Option<String>,
    pub timestamp: i64,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FulfillmentEvent {
    PaymentConfirmed(PaymentConfirmedEvent),
    OrderFulfilled(OrderFulfilledEvent),
    ManualFulfillmentRequired(ManualFulfillmentRequiredEvent),
}

impl FulfillmentEvent {
    /// Topic suffix used when the event is published to a broker.
    pub fn kind(&self) -> &'static str {
        match self {
            FulfillmentEvent::PaymentConfirmed(_) => "payment.confirmed",
            FulfillmentEvent::OrderFulfilled(_) => "order.fulfilled",
            FulfillmentEvent::ManualFulfillmentRequired(_) => "order.manual_fulfillment_required",
        }
    }

    pub fn order_id(&self) -> Uuid {
        match self {
            FulfillmentEvent::PaymentConfirmed(e) => e.order_id,
            FulfillmentEvent::OrderFulfilled(e) => e.order_id,
            FulfillmentEvent::ManualFulfillmentRequired(e) => e.order_id,
        }
    }
}
