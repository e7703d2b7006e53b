use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::collections::BTreeMap;
use tracing::warn;

use crate::TransportError;

/// Order object the gateway is asked to create before the shopper authorizes payment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GatewayOrderRequest {
    pub amount_minor_units: i64,
    pub currency: String,
    pub receipt: String,
    pub notes: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GatewayOrder {
    pub gateway_order_id: String,
    pub amount_minor_units: i64,
    pub currency: String,
}

/// A gateway-side reservation of an amount. Immutable once created.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PaymentIntent {
    pub gateway_order_id: String,
    pub amount_minor_units: i64,
    pub currency: String,
    pub created_at: DateTime<Utc>,
}

/// Callback delivered by the gateway once the shopper completes payment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PaymentConfirmation {
    pub gateway_payment_id: String,
    pub gateway_order_id: String,
    pub signature: String,
}

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("gateway rejected request with status {status}: {body}")]
    Rejected { status: u16, body: String },
    #[error("unexpected gateway response: {0}")]
    InvalidResponse(String),
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Create a gateway order for the given amount
    async fn create_order(&self, request: &GatewayOrderRequest) -> Result<GatewayOrder, GatewayError>;
}

/// Authenticates confirmation callbacks. Implementations must never trust
/// anything asserted by the client beyond what the signature covers.
pub trait SignatureVerifier: Send + Sync {
    fn verify(&self, confirmation: &PaymentConfirmation) -> bool;
}

type HmacSha256 = Hmac<Sha256>;

/// HMAC-SHA256 over `"{gateway_order_id}|{gateway_payment_id}"`, hex encoded.
#[derive(Clone)]
pub struct HmacSignatureVerifier {
    secret: Vec<u8>,
}

impl HmacSignatureVerifier {
    pub fn new(secret: impl AsRef<[u8]>) -> Self {
        Self {
            secret: secret.as_ref().to_vec(),
        }
    }

    /// Produce the signature the gateway would send for this pair.
    pub fn sign(&self, gateway_order_id: &str, gateway_payment_id: &str) -> Option<String> {
        let mut mac = HmacSha256::new_from_slice(&self.secret).ok()?;
        mac.update(signing_payload(gateway_order_id, gateway_payment_id).as_bytes());
        Some(hex::encode(mac.finalize().into_bytes()))
    }
}

impl SignatureVerifier for HmacSignatureVerifier {
    fn verify(&self, confirmation: &PaymentConfirmation) -> bool {
        let Ok(expected) = hex::decode(confirmation.signature.trim()) else {
            warn!(
                "Signature for gateway order {} is not valid hex",
                confirmation.gateway_order_id
            );
            return false;
        };

        let Ok(mut mac) = HmacSha256::new_from_slice(&self.secret) else {
            return false;
        };
        mac.update(
            signing_payload(&confirmation.gateway_order_id, &confirmation.gateway_payment_id).as_bytes(),
        );
        // verify_slice compares in constant time
        mac.verify_slice(&expected).is_ok()
    }
}

fn signing_payload(gateway_order_id: &str, gateway_payment_id: &str) -> String {
    format!("{}|{}", gateway_order_id, gateway_payment_id)
}
