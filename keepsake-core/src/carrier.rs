use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::TransportError;

/// Carrier product class sent as a single letter on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProductCode {
    #[serde(rename = "D")]
    D,
    #[serde(rename = "C")]
    C,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaymentMode {
    Prepaid,
    #[serde(rename = "COD")]
    Cod,
}

/// Shipment creation payload, field names as the carrier expects them.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CarrierShipmentRequest {
    pub order_id: String,
    pub product: ProductCode,
    pub payment_mode: PaymentMode,
    pub name: String,
    pub address: String,
    pub city: String,
    pub state: String,
    pub country: String,
    pub phone: String,
    pub email: String,
    pub postal_code: String,
    pub pickup_location_code: String,
    pub weight: f64,
    pub length: f64,
    pub width: f64,
    pub height: f64,
    pub service_type: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ShipmentIdentifier {
    pub awb: String,
}

/// One pickup object per tracking id; a batch shares the same window.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CarrierPickupRequest {
    pub pickup_location: String,
    pub pickup_date: String,
    pub pickup_start_time: String,
    pub pickup_end_time: String,
    pub shipment_identifiers: Vec<ShipmentIdentifier>,
    pub product_label: String,
    pub payment_reference: String,
}

/// Raw carrier answer. Interpretation happens in the domain services
/// because the carrier mixes business failures across 2xx and 5xx statuses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CarrierReply {
    pub status: u16,
    pub body: String,
}

impl CarrierReply {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ShipmentResponseBody {
    pub success: bool,
    #[serde(default)]
    pub shipments: Vec<CarrierShipment>,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CarrierShipment {
    #[serde(default)]
    pub awb: String,
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PickupResponseBody {
    pub success: bool,
    #[serde(default)]
    pub pickup: Option<CarrierPickup>,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CarrierPickup {
    #[serde(rename = "pickupId")]
    pub pickup_id: String,
}

#[async_trait]
pub trait ShipmentCarrier: Send + Sync {
    async fn create_shipment(&self, request: &CarrierShipmentRequest) -> Result<CarrierReply, TransportError>;
}

#[async_trait]
pub trait PickupCarrier: Send + Sync {
    async fn create_pickups(&self, requests: &[CarrierPickupRequest]) -> Result<CarrierReply, TransportError>;
}
