use axum::{extract::State, Json};
use keepsake_core::payment::PaymentConfirmation;
use keepsake_order::OrderStatus;
use serde::Serialize;
use uuid::Uuid;

use crate::error::AppError;
use crate::state::AppState;

/// What the storefront shows after payment. Logistics trouble is not
/// surfaced here; back-office picks it up from the ledger.
#[derive(Debug, Serialize)]
pub struct ConfirmationResponse {
    pub order_id: Uuid,
    pub status: OrderStatus,
    pub message: String,
}

/// POST /v1/webhooks/payments/confirm
/// Payment callback carrying the gateway ids and their signature
pub async fn confirm_payment(
    State(state): State<AppState>,
    Json(payload): Json<PaymentConfirmation>,
) -> Result<Json<ConfirmationResponse>, AppError> {
    tracing::info!(
        "Received payment confirmation {} for gateway order {}",
        payload.gateway_payment_id,
        payload.gateway_order_id
    );

    let report = state.orchestrator.confirm_payment(&payload).await?;
    if report.follow_up_required {
        tracing::warn!("Order {} needs manual fulfillment", report.order_id);
    }

    Ok(Json(ConfirmationResponse {
        order_id: report.order_id,
        status: report.status,
        message: report.shopper_message,
    }))
}
