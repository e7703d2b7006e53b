pub mod carrier;
pub mod events;
pub mod failure;
pub mod payment;
pub mod status;

pub use failure::{FailureDetail, FailureKind};

/// Failure raised before an external system produced any answer.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TransportError {
    #[error("request timed out: {0}")]
    Timeout(String),
    #[error("connection failed: {0}")]
    Connection(String),
    #[error("request failed: {0}")]
    Request(String),
}
