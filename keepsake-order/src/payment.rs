use chrono::Utc;
use keepsake_core::payment::{GatewayError, GatewayOrderRequest, PaymentGateway, PaymentIntent};
use keepsake_core::FailureDetail;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{error, info};
use uuid::Uuid;

use crate::models::OrderDraft;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PaymentIntentError {
    #[error("Invalid amount: {0}")]
    InvalidAmount(Decimal),

    #[error("Unsupported currency: {0}")]
    UnsupportedCurrency(String),

    #[error("Payment gateway unreachable: {0}")]
    GatewayUnreachable(String),

    #[error("Payment intent creation failed: {0}")]
    CreationFailed(String),
}

impl PaymentIntentError {
    /// Only gateway-side failures are worth a new checkout attempt by the shopper
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            PaymentIntentError::GatewayUnreachable(_) | PaymentIntentError::CreationFailed(_)
        )
    }

    /// Ledger form of the failure, keeping network trouble apart from refusals
    pub fn to_failure(&self) -> FailureDetail {
        match self {
            PaymentIntentError::InvalidAmount(_) | PaymentIntentError::UnsupportedCurrency(_) => {
                FailureDetail::invalid_input(self.to_string())
            }
            PaymentIntentError::GatewayUnreachable(_) => FailureDetail::transport(self.to_string()),
            PaymentIntentError::CreationFailed(_) => FailureDetail::gateway_rejected(self.to_string()),
        }
    }
}

/// Receipt and free-form notes attached to the gateway order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IntentMetadata {
    pub receipt: String,
    pub notes: BTreeMap<String, String>,
}

impl IntentMetadata {
    pub fn for_order(order_id: Uuid, draft: &OrderDraft) -> Self {
        let mut notes = BTreeMap::new();
        notes.insert("order_id".to_string(), order_id.to_string());
        notes.insert("items".to_string(), draft.total_quantity().to_string());
        notes.insert("postal_code".to_string(), draft.shipping_address.postal_code.clone());
        Self {
            receipt: order_id.to_string(),
            notes,
        }
    }
}

/// Convert a decimal amount into integral minor units (paise, cents).
pub fn to_minor_units(amount: Decimal) -> Result<i64, PaymentIntentError> {
    if amount <= Decimal::ZERO {
        return Err(PaymentIntentError::InvalidAmount(amount));
    }

    let scaled = amount
        .checked_mul(Decimal::ONE_HUNDRED)
        .ok_or(PaymentIntentError::InvalidAmount(amount))?;
    if !scaled.fract().is_zero() {
        return Err(PaymentIntentError::InvalidAmount(amount));
    }

    scaled
        .to_i64()
        .ok_or(PaymentIntentError::InvalidAmount(amount))
}

/// Thin request/response wrapper around the payment gateway
pub struct PaymentIntentService {
    gateway: Arc<dyn PaymentGateway>,
    currency: String,
}

impl PaymentIntentService {
    pub fn new(gateway: Arc<dyn PaymentGateway>, currency: impl Into<String>) -> Self {
        Self {
            gateway,
            currency: currency.into(),
        }
    }

    /// Input checks shared by `create_intent` and the orchestrator's pre-flight
    pub fn validate(&self, amount: Decimal, currency: &str) -> Result<i64, PaymentIntentError> {
        let minor = to_minor_units(amount)?;
        if !currency.eq_ignore_ascii_case(&self.currency) {
            return Err(PaymentIntentError::UnsupportedCurrency(currency.to_string()));
        }
        Ok(minor)
    }

    /// Create a gateway order for `amount`. Exactly one outbound call on valid
    /// input, none otherwise. The caller persists the returned identifier.
    pub async fn create_intent(
        &self,
        amount: Decimal,
        currency: &str,
        metadata: IntentMetadata,
    ) -> Result<PaymentIntent, PaymentIntentError> {
        let amount_minor_units = self.validate(amount, currency)?;

        let request = GatewayOrderRequest {
            amount_minor_units,
            currency: self.currency.clone(),
            receipt: metadata.receipt,
            notes: metadata.notes,
        };

        let order = self.gateway.create_order(&request).await.map_err(|e| {
            error!("Gateway order creation failed for receipt {}: {}", request.receipt, e);
            match e {
                GatewayError::Transport(t) => PaymentIntentError::GatewayUnreachable(t.to_string()),
                other => PaymentIntentError::CreationFailed(other.to_string()),
            }
        })?;

        if order.amount_minor_units != amount_minor_units || !order.currency.eq_ignore_ascii_case(&self.currency) {
            return Err(PaymentIntentError::CreationFailed(format!(
                "gateway echoed {} {} for a request of {} {}",
                order.amount_minor_units, order.currency, amount_minor_units, self.currency
            )));
        }

        info!(
            "Created gateway order {} for {} minor units",
            order.gateway_order_id,
            amount_minor_units
        );

        Ok(PaymentIntent {
            gateway_order_id: order.gateway_order_id,
            amount_minor_units,
            currency: order.currency,
            created_at: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockPaymentGateway;

    #[test]
    fn test_minor_unit_conversion() {
        assert_eq!(to_minor_units(Decimal::new(50000, 2)).unwrap(), 50000);
        assert_eq!(to_minor_units(Decimal::from(12)).unwrap(), 1200);
        assert!(to_minor_units(Decimal::ZERO).is_err());
        // fraction of a paisa
        assert!(to_minor_units(Decimal::new(10005, 3)).is_err());
        // too large to scale
        assert_eq!(to_minor_units(Decimal::MAX), Err(PaymentIntentError::InvalidAmount(Decimal::MAX)));
    }

    #[test]
    fn test_failure_kinds_follow_the_error() {
        use keepsake_core::FailureKind;

        let unreachable = PaymentIntentError::GatewayUnreachable("connection refused".into());
        assert_eq!(unreachable.to_failure().kind, FailureKind::Transport);

        let rejected = PaymentIntentError::CreationFailed("gateway echoed 1 USD".into());
        assert_eq!(rejected.to_failure().kind, FailureKind::GatewayRejected);

        let invalid = PaymentIntentError::InvalidAmount(Decimal::ZERO);
        assert_eq!(invalid.to_failure().kind, FailureKind::InvalidInput);
    }

    #[tokio::test]
    async fn test_negative_amount_makes_no_gateway_call() {
        let gateway = Arc::new(MockPaymentGateway::new());
        let service = PaymentIntentService::new(gateway.clone(), "INR");

        let result = service
            .create_intent(Decimal::from(-10), "INR", IntentMetadata::default())
            .await;

        assert_eq!(result, Err(PaymentIntentError::InvalidAmount(Decimal::from(-10))));
        assert_eq!(gateway.calls(), 0);
    }

    #[tokio::test]
    async fn test_other_currency_is_rejected() {
        let gateway = Arc::new(MockPaymentGateway::new());
        let service = PaymentIntentService::new(gateway.clone(), "INR");

        let result = service
            .create_intent(Decimal::from(10), "USD", IntentMetadata::default())
            .await;

        assert!(matches!(result, Err(PaymentIntentError::UnsupportedCurrency(_))));
        assert_eq!(gateway.calls(), 0);
    }

    #[tokio::test]
    async fn test_create_intent() {
        let gateway = Arc::new(MockPaymentGateway::new());
        let service = PaymentIntentService::new(gateway.clone(), "INR");
        let metadata = IntentMetadata { receipt: "rcpt-1".into(), ..Default::default() };

        let intent = service
            .create_intent(Decimal::new(50000, 2), "INR", metadata)
            .await
            .unwrap();

        assert_eq!(intent.amount_minor_units, 50000);
        assert_eq!(intent.currency, "INR");
        assert!(intent.gateway_order_id.starts_with("order_"));
        assert_eq!(gateway.calls(), 1);
    }

    #[tokio::test]
    async fn test_gateway_failure_is_not_retried() {
        let gateway = Arc::new(MockPaymentGateway::failing("gateway down"));
        let service = PaymentIntentService::new(gateway.clone(), "INR");

        let err = service
            .create_intent(Decimal::from(500), "INR", IntentMetadata::default())
            .await
            .unwrap_err();

        assert!(err.is_retryable());
        assert_eq!(err.to_failure().kind, keepsake_core::FailureKind::GatewayRejected);
        assert_eq!(gateway.calls(), 1);
    }
}
