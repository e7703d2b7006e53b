use axum::{
    extract::{Path, Query, State},
    Json,
};
use keepsake_order::{FulfillmentReport, InvariantViolation, Order, OrderStatus};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::AppError;
use crate::state::AppState;

// ============================================================================
// Request Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct OrderListQuery {
    pub status: Option<String>,
}

// ============================================================================
// Order Queue
// ============================================================================

/// GET /v1/admin/orders?status=MANUAL_FULFILLMENT_REQUIRED
pub async fn list_orders(
    State(state): State<AppState>,
    Query(query): Query<OrderListQuery>,
) -> Result<Json<Vec<Order>>, AppError> {
    let orders = match query.status.as_deref() {
        Some(raw) => {
            let status: OrderStatus = raw
                .parse()
                .map_err(|_| AppError::ValidationError(format!("unknown order status {}", raw)))?;
            state.ledger.list_by_status(status).await?
        }
        None => state.ledger.list_all().await?,
    };

    Ok(Json(orders))
}

// ============================================================================
// Manual Reconciliation
// ============================================================================

/// POST /v1/admin/orders/{id}/replay/shipment
pub async fn replay_shipment(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
) -> Result<Json<FulfillmentReport>, AppError> {
    tracing::info!("Admin replay of shipment for order {}", order_id);
    let report = state.orchestrator.replay_shipment(order_id).await?;
    Ok(Json(report))
}

/// POST /v1/admin/orders/{id}/replay/pickup
pub async fn replay_pickup(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
) -> Result<Json<FulfillmentReport>, AppError> {
    tracing::info!("Admin replay of pickup for order {}", order_id);
    let report = state.orchestrator.replay_pickup(order_id).await?;
    Ok(Json(report))
}

/// GET /v1/admin/ledger/audit
pub async fn audit(State(state): State<AppState>) -> Result<Json<Vec<InvariantViolation>>, AppError> {
    let violations = state.ledger.audit().await?;
    if !violations.is_empty() {
        tracing::error!("Ledger audit found {} invariant violation(s)", violations.len());
    }
    Ok(Json(violations))
}
