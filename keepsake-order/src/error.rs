use rust_decimal::Decimal;
use uuid::Uuid;

use crate::models::{OrderStatus, Stage};

/// Reasons an order draft is refused before anything external happens
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DraftError {
    #[error("Invalid amount: {0} (must be a positive value)")]
    InvalidAmount(Decimal),

    #[error("Order draft has no items")]
    NoItems,

    #[error("Invalid item at position {index}: {reason}")]
    InvalidItem { index: usize, reason: String },

    #[error("Negative amount for {0}")]
    NegativeAmount(&'static str),

    #[error("Subtotal {actual} does not match line items ({expected})")]
    SubtotalMismatch { expected: Decimal, actual: Decimal },

    #[error("Total {actual} does not equal subtotal + shipping fee + tax ({expected})")]
    TotalMismatch { expected: Decimal, actual: Decimal },

    #[error("Unsupported currency: {0}")]
    UnsupportedCurrency(String),

    #[error("Order draft has no currency")]
    MissingCurrency,

    #[error("Total item quantity is too large")]
    QuantityOverflow,
}

#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("Order not found: {0}")]
    NotFound(Uuid),

    #[error("No order for gateway order {0}")]
    UnknownGatewayOrder(String),

    #[error("Cannot record {stage} for order {order_id} in status {from}")]
    InvalidTransition {
        order_id: Uuid,
        stage: Stage,
        from: OrderStatus,
    },

    #[error("Precondition violated: {0}")]
    PreconditionViolated(String),

    #[error("Conflicting write: {0}")]
    Conflict(String),

    #[error(transparent)]
    InvalidDraft(#[from] DraftError),

    #[error("Ledger storage error: {0}")]
    Storage(String),
}

pub type LedgerResult<T> = Result<T, LedgerError>;
