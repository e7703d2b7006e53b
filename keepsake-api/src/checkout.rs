use axum::{extract::State, http::StatusCode, Json};
use keepsake_order::{CheckoutSession, OrderDraft};

use crate::error::AppError;
use crate::state::AppState;

/// POST /v1/checkout
/// Open an order for a cart draft and create the gateway order
pub async fn create_checkout(
    State(state): State<AppState>,
    Json(draft): Json<OrderDraft>,
) -> Result<(StatusCode, Json<CheckoutSession>), AppError> {
    tracing::info!("Checkout requested for {} item line(s)", draft.items.len());

    let session = state.orchestrator.begin_checkout(&draft).await?;
    Ok((StatusCode::CREATED, Json(session)))
}
