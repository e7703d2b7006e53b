use axum::{
    extract::{Path, State},
    Json,
};
use chrono::{DateTime, Utc};
use keepsake_order::models::{DraftItem, Totals};
use keepsake_order::{Order, OrderStatus};
use serde::Serialize;
use uuid::Uuid;

use crate::error::AppError;
use crate::state::AppState;

// ============================================================================
// Response Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct OrderResponse {
    pub id: Uuid,
    pub status: OrderStatus,
    pub items: Vec<DraftItem>,
    pub totals: Totals,
    pub currency: String,
    pub tracking_id: Option<String>,
    pub pickup_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Order> for OrderResponse {
    fn from(order: Order) -> Self {
        Self {
            tracking_id: order.tracking_id().map(str::to_string),
            pickup_id: order.pickup_id().map(str::to_string),
            id: order.id,
            status: order.status,
            items: order.items,
            totals: order.totals,
            currency: order.currency,
            created_at: order.created_at,
            updated_at: order.updated_at,
        }
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /v1/orders/{id}
pub async fn get_order(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
) -> Result<Json<OrderResponse>, AppError> {
    let order = state.ledger.get(order_id).await?;
    Ok(Json(OrderResponse::from(order)))
}
