use async_trait::async_trait;
use keepsake_core::payment::{GatewayError, GatewayOrder, GatewayOrderRequest, PaymentGateway};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

use crate::http::{client_with_timeout, read_reply, transport_error};

#[derive(Debug, Serialize)]
struct CreateOrderBody<'a> {
    amount: i64,
    currency: &'a str,
    receipt: &'a str,
    notes: &'a BTreeMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct CreateOrderResponse {
    id: String,
    amount: i64,
    currency: String,
}

/// Orders API of the payment gateway, authenticated with the key pair
pub struct HttpPaymentGateway {
    http: Client,
    base_url: String,
    key_id: String,
    key_secret: String,
}

impl HttpPaymentGateway {
    pub fn new(
        base_url: impl Into<String>,
        key_id: impl Into<String>,
        key_secret: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        Ok(Self {
            http: client_with_timeout(timeout)?,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            key_id: key_id.into(),
            key_secret: key_secret.into(),
        })
    }
}

#[async_trait]
impl PaymentGateway for HttpPaymentGateway {
    async fn create_order(&self, request: &GatewayOrderRequest) -> Result<GatewayOrder, GatewayError> {
        let url = format!("{}/v1/orders", self.base_url);
        let body = CreateOrderBody {
            amount: request.amount_minor_units,
            currency: &request.currency,
            receipt: &request.receipt,
            notes: &request.notes,
        };

        let response = self
            .http
            .post(&url)
            .basic_auth(&self.key_id, Some(&self.key_secret))
            .json(&body)
            .send()
            .await
            .map_err(|e| transport_error("payment gateway", e))?;

        let (status, text) = read_reply("payment gateway", response).await?;
        if !(200..300).contains(&status) {
            return Err(GatewayError::Rejected { status, body: text });
        }

        let parsed: CreateOrderResponse =
            serde_json::from_str(&text).map_err(|e| GatewayError::InvalidResponse(e.to_string()))?;

        Ok(GatewayOrder {
            gateway_order_id: parsed.id,
            amount_minor_units: parsed.amount,
            currency: parsed.currency,
        })
    }
}
