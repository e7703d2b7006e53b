use chrono::Utc;
use keepsake_core::carrier::{
    CarrierReply, CarrierShipmentRequest, PaymentMode, ProductCode, ShipmentCarrier, ShipmentResponseBody,
};
use keepsake_core::FailureDetail;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::models::{Dimensions, ShipmentRecord, ShippingAddress};

/// Carrier account settings shared by the shipment and pickup services
#[derive(Debug, Clone)]
pub struct CarrierSettings {
    pub pickup_location_code: String,
    pub product_code: ProductCode,
    pub service_type: String,
    /// Answer every request locally with a fixed success
    pub use_mock: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ShipmentRequest {
    pub order_id: Uuid,
    pub address: ShippingAddress,
    pub weight_grams: f64,
    pub dimensions: Dimensions,
    pub payment_mode: PaymentMode,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ShipmentError {
    #[error("Missing shipment fields: {}", .0.join(", "))]
    MissingShipmentFields(Vec<&'static str>),

    #[error("Shipment creation failed: {0}")]
    Failed(FailureDetail),
}

impl ShipmentError {
    pub fn into_failure(self) -> FailureDetail {
        match self {
            ShipmentError::MissingShipmentFields(_) => FailureDetail::invalid_input(self.to_string()),
            ShipmentError::Failed(detail) => detail,
        }
    }
}

fn missing_fields(request: &ShipmentRequest) -> Vec<&'static str> {
    let mut missing = Vec::new();
    let address = &request.address;

    for (field, value) in [
        ("street", &address.street),
        ("state", &address.state),
        ("country", &address.country),
        ("postal_code", &address.postal_code),
    ] {
        if value.trim().is_empty() {
            missing.push(field);
        }
    }

    for (field, value) in [
        ("weight", request.weight_grams),
        ("length", request.dimensions.length_cm),
        ("width", request.dimensions.width_cm),
        ("height", request.dimensions.height_cm),
    ] {
        if !value.is_finite() || value <= 0.0 {
            missing.push(field);
        }
    }

    missing
}

/// Read a carrier answer. Business failures arrive with 200 or 5xx alike,
/// so the body decides first and the status only afterwards.
pub fn interpret_shipment_reply(reply: &CarrierReply) -> Result<(String, String), FailureDetail> {
    let body: ShipmentResponseBody = match serde_json::from_str(&reply.body) {
        Ok(body) => body,
        Err(e) => {
            return Err(FailureDetail::transport(format!("unparseable carrier response: {}", e))
                .with_raw(reply.status, &reply.body));
        }
    };

    if !body.success {
        let reason = body.reason.unwrap_or_else(|| "carrier reported failure".to_string());
        return Err(FailureDetail::business(reason).with_raw(reply.status, &reply.body));
    }

    if !(200..300).contains(&reply.status) {
        return Err(FailureDetail::transport(format!("carrier answered HTTP {}", reply.status))
            .with_raw(reply.status, &reply.body));
    }

    match body.shipments.into_iter().next() {
        Some(first) if !first.awb.trim().is_empty() => {
            Ok((first.awb, first.status.unwrap_or_else(|| "Created".to_string())))
        }
        _ => Err(FailureDetail::transport("carrier response carried no tracking id")
            .with_raw(reply.status, &reply.body)),
    }
}

/// Thin, retryable carrier adapter. It does not look at payment state.
pub struct ShipmentService {
    carrier: Arc<dyn ShipmentCarrier>,
    settings: CarrierSettings,
}

impl ShipmentService {
    pub fn new(carrier: Arc<dyn ShipmentCarrier>, settings: CarrierSettings) -> Self {
        Self { carrier, settings }
    }

    fn build_payload(&self, request: &ShipmentRequest) -> CarrierShipmentRequest {
        let address = &request.address;
        CarrierShipmentRequest {
            order_id: request.order_id.to_string(),
            product: self.settings.product_code,
            payment_mode: request.payment_mode,
            name: address.name.clone(),
            address: address.street.clone(),
            city: address.city.clone(),
            state: address.state.clone(),
            country: address.country.clone(),
            phone: address.phone.expose().clone(),
            email: address.email.expose().clone(),
            postal_code: address.postal_code.clone(),
            pickup_location_code: self.settings.pickup_location_code.clone(),
            weight: request.weight_grams,
            length: request.dimensions.length_cm,
            width: request.dimensions.width_cm,
            height: request.dimensions.height_cm,
            service_type: self.settings.service_type.clone(),
        }
    }

    pub async fn create_shipment(&self, request: ShipmentRequest) -> Result<ShipmentRecord, ShipmentError> {
        let missing = missing_fields(&request);
        if !missing.is_empty() {
            warn!("Shipment for order {} missing fields: {:?}", request.order_id, missing);
            return Err(ShipmentError::MissingShipmentFields(missing));
        }

        let (tracking_id, carrier_status) = if self.settings.use_mock {
            let simple = request.order_id.simple().to_string();
            let suffix = simple.get(..8).unwrap_or(&simple).to_uppercase();
            (format!("MOCK-AWB-{}", suffix), "Manifested".to_string())
        } else {
            let payload = self.build_payload(&request);
            let reply = self
                .carrier
                .create_shipment(&payload)
                .await
                .map_err(|e| ShipmentError::Failed(e.into()))?;
            interpret_shipment_reply(&reply).map_err(ShipmentError::Failed)?
        };

        info!("Carrier accepted shipment for order {}: AWB {}", request.order_id, tracking_id);

        Ok(ShipmentRecord {
            order_id: request.order_id,
            tracking_id,
            carrier_status,
            weight_grams: request.weight_grams,
            dimensions: request.dimensions,
            created_at: Utc::now(),
        })
    }
}
