use async_trait::async_trait;
use keepsake_core::carrier::{CarrierPickupRequest, CarrierReply, CarrierShipmentRequest, PickupCarrier, ShipmentCarrier};
use keepsake_core::TransportError;
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;
use tracing::debug;

use crate::http::{client_with_timeout, read_reply, transport_error};

pub const SHIPMENTS_PATH: &str = "/shipments";
pub const PICKUPS_PATH: &str = "/pickups";

/// Carrier REST client. Returns the raw reply; the domain services decide
/// what counts as success.
pub struct HttpCarrierClient {
    http: Client,
    base_url: String,
    api_token: String,
}

impl HttpCarrierClient {
    pub fn new(base_url: impl Into<String>, api_token: impl Into<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
        Ok(Self {
            http: client_with_timeout(timeout)?,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_token: api_token.into(),
        })
    }

    async fn post<T: Serialize + ?Sized>(&self, path: &str, body: &T) -> Result<CarrierReply, TransportError> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.api_token)
            .json(body)
            .send()
            .await
            .map_err(|e| transport_error(path, e))?;

        let (status, body) = read_reply(path, response).await?;
        debug!("Carrier {} answered HTTP {}", path, status);
        Ok(CarrierReply::new(status, body))
    }
}

#[async_trait]
impl ShipmentCarrier for HttpCarrierClient {
    async fn create_shipment(&self, request: &CarrierShipmentRequest) -> Result<CarrierReply, TransportError> {
        // The carrier takes a list even for a single parcel
        self.post(SHIPMENTS_PATH, &serde_json::json!({ "shipments": [request] })).await
    }
}

#[async_trait]
impl PickupCarrier for HttpCarrierClient {
    async fn create_pickups(&self, requests: &[CarrierPickupRequest]) -> Result<CarrierReply, TransportError> {
        self.post(PICKUPS_PATH, requests).await
    }
}
