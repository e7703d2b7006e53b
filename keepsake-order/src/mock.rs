//! In-process stand-ins for the gateway, the carrier and the status endpoint.
//! Used by the test suites and by local runs without external accounts.

use async_trait::async_trait;
use keepsake_core::carrier::{CarrierPickupRequest, CarrierReply, CarrierShipmentRequest, PickupCarrier, ShipmentCarrier};
use keepsake_core::events::FulfillmentEvents;
use keepsake_core::payment::{GatewayError, GatewayOrder, GatewayOrderRequest, PaymentGateway};
use keepsake_core::status::{NotifyError, OrderStatusNotifier, OrderStatusUpdate};
use keepsake_core::TransportError;
use keepsake_shared::models::events::FulfillmentEvent;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::Mutex;
use uuid::Uuid;

pub struct MockPaymentGateway {
    failure: Option<String>,
    calls: AtomicUsize,
    requests: Mutex<Vec<GatewayOrderRequest>>,
}

impl Default for MockPaymentGateway {
    fn default() -> Self {
        Self::new()
    }
}

impl MockPaymentGateway {
    pub fn new() -> Self {
        Self {
            failure: None,
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Every order creation answers with a 503 carrying `reason`
    pub fn failing(reason: impl Into<String>) -> Self {
        Self {
            failure: Some(reason.into()),
            ..Self::new()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub async fn requests(&self) -> Vec<GatewayOrderRequest> {
        self.requests.lock().await.clone()
    }
}

#[async_trait]
impl PaymentGateway for MockPaymentGateway {
    async fn create_order(&self, request: &GatewayOrderRequest) -> Result<GatewayOrder, GatewayError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().await.push(request.clone());

        if let Some(reason) = &self.failure {
            return Err(GatewayError::Rejected {
                status: 503,
                body: reason.clone(),
            });
        }

        // The receipt is the order id, so the gateway id stays traceable
        let suffix = if request.receipt.is_empty() {
            Uuid::new_v4().simple().to_string()
        } else {
            request.receipt.replace('-', "")
        };

        Ok(GatewayOrder {
            gateway_order_id: format!("order_{}", suffix),
            amount_minor_units: request.amount_minor_units,
            currency: request.currency.clone(),
        })
    }
}

pub fn shipment_success_reply(awb: &str) -> CarrierReply {
    let body = serde_json::json!({
        "success": true,
        "shipments": [{ "awb": awb, "status": "Manifested" }]
    });
    CarrierReply::new(200, body.to_string())
}

pub fn pickup_success_reply(pickup_id: &str) -> CarrierReply {
    let body = serde_json::json!({
        "success": true,
        "pickup": { "pickupId": pickup_id }
    });
    CarrierReply::new(200, body.to_string())
}

/// Shipment carrier that answers every call with a scripted reply.
/// The reply can be swapped mid-test to model an outage that recovers.
pub struct ScriptedShipmentCarrier {
    reply: Mutex<Result<CarrierReply, TransportError>>,
    calls: AtomicUsize,
    requests: Mutex<Vec<CarrierShipmentRequest>>,
}

impl ScriptedShipmentCarrier {
    fn with(reply: Result<CarrierReply, TransportError>) -> Self {
        Self {
            reply: Mutex::new(reply),
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn succeeding(awb: &str) -> Self {
        Self::with(Ok(shipment_success_reply(awb)))
    }

    pub fn replying(status: u16, body: &str) -> Self {
        Self::with(Ok(CarrierReply::new(status, body)))
    }

    pub fn failing(error: TransportError) -> Self {
        Self::with(Err(error))
    }

    pub async fn set_reply(&self, reply: Result<CarrierReply, TransportError>) {
        *self.reply.lock().await = reply;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub async fn last_request(&self) -> Option<CarrierShipmentRequest> {
        self.requests.lock().await.last().cloned()
    }
}

#[async_trait]
impl ShipmentCarrier for ScriptedShipmentCarrier {
    async fn create_shipment(&self, request: &CarrierShipmentRequest) -> Result<CarrierReply, TransportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().await.push(request.clone());
        self.reply.lock().await.clone()
    }
}

pub struct ScriptedPickupCarrier {
    reply: Mutex<Result<CarrierReply, TransportError>>,
    calls: AtomicUsize,
    batches: Mutex<Vec<Vec<CarrierPickupRequest>>>,
}

impl ScriptedPickupCarrier {
    fn with(reply: Result<CarrierReply, TransportError>) -> Self {
        Self {
            reply: Mutex::new(reply),
            calls: AtomicUsize::new(0),
            batches: Mutex::new(Vec::new()),
        }
    }

    pub fn succeeding(pickup_id: &str) -> Self {
        Self::with(Ok(pickup_success_reply(pickup_id)))
    }

    pub fn replying(status: u16, body: &str) -> Self {
        Self::with(Ok(CarrierReply::new(status, body)))
    }

    pub fn failing(error: TransportError) -> Self {
        Self::with(Err(error))
    }

    pub fn timing_out() -> Self {
        Self::failing(TransportError::Timeout("pickup request exceeded deadline".to_string()))
    }

    pub async fn set_reply(&self, reply: Result<CarrierReply, TransportError>) {
        *self.reply.lock().await = reply;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub async fn last_batch(&self) -> Vec<CarrierPickupRequest> {
        self.batches.lock().await.last().cloned().unwrap_or_default()
    }
}

#[async_trait]
impl PickupCarrier for ScriptedPickupCarrier {
    async fn create_pickups(&self, requests: &[CarrierPickupRequest]) -> Result<CarrierReply, TransportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.batches.lock().await.push(requests.to_vec());
        self.reply.lock().await.clone()
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    fail_with: Option<u16>,
    updates: Mutex<Vec<OrderStatusUpdate>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the update, then answer as if the endpoint returned `status`
    pub fn rejecting(status: u16) -> Self {
        Self {
            fail_with: Some(status),
            ..Self::default()
        }
    }

    pub async fn updates(&self) -> Vec<OrderStatusUpdate> {
        self.updates.lock().await.clone()
    }
}

#[async_trait]
impl OrderStatusNotifier for RecordingNotifier {
    async fn notify(&self, update: &OrderStatusUpdate) -> Result<(), NotifyError> {
        self.updates.lock().await.push(update.clone());
        match self.fail_with {
            Some(status) => Err(NotifyError::NotAcknowledged(status)),
            None => Ok(()),
        }
    }
}

#[derive(Default)]
pub struct RecordingEventSink {
    events: Mutex<Vec<FulfillmentEvent>>,
}

impl RecordingEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn events(&self) -> Vec<FulfillmentEvent> {
        self.events.lock().await.clone()
    }

    pub async fn kinds(&self) -> Vec<&'static str> {
        self.events.lock().await.iter().map(|e| e.kind()).collect()
    }
}

#[async_trait]
impl FulfillmentEvents for RecordingEventSink {
    async fn publish(&self, event: &FulfillmentEvent) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.events.lock().await.push(event.clone());
        Ok(())
    }
}
