use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use keepsake_order::{LedgerError, OrchestratorError};
use serde_json::json;

#[derive(Debug)]
pub enum AppError {
    AuthenticationError(String),
    ValidationError(String),
    NotFoundError(String),
    ConflictError(String),
    UpstreamError(String),
    InternalServerError(String),
    Anyhow(anyhow::Error),
}

fn classify_ledger(err: &LedgerError) -> AppError {
    match err {
        LedgerError::NotFound(_) | LedgerError::UnknownGatewayOrder(_) => AppError::NotFoundError(err.to_string()),
        LedgerError::InvalidTransition { .. } | LedgerError::PreconditionViolated(_) | LedgerError::Conflict(_) => {
            AppError::ConflictError(err.to_string())
        }
        LedgerError::InvalidDraft(_) => AppError::ValidationError(err.to_string()),
        LedgerError::Storage(_) => AppError::InternalServerError(err.to_string()),
    }
}

fn classify_orchestrator(err: &OrchestratorError) -> AppError {
    match err {
        OrchestratorError::InvalidInput(_) => AppError::ValidationError(err.to_string()),
        OrchestratorError::PaymentIntent(e) if e.is_retryable() => AppError::UpstreamError(err.to_string()),
        OrchestratorError::PaymentIntent(_) => AppError::ValidationError(err.to_string()),
        OrchestratorError::AuthenticationFailure(_) => AppError::AuthenticationError(err.to_string()),
        OrchestratorError::InvalidState { .. } => AppError::ConflictError(err.to_string()),
        OrchestratorError::Ledger(e) => classify_ledger(e),
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::AuthenticationError(msg) => (StatusCode::UNAUTHORIZED, msg),
            AppError::ValidationError(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::NotFoundError(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::ConflictError(msg) => (StatusCode::CONFLICT, msg),
            AppError::UpstreamError(msg) => (StatusCode::BAD_GATEWAY, msg),
            AppError::InternalServerError(msg) => {
                tracing::error!("Internal Server Error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error".to_string())
            }
            AppError::Anyhow(err) => {
                // Domain errors arrive here through `?`; give them their real status
                if let Some(e) = err.downcast_ref::<OrchestratorError>() {
                    return classify_orchestrator(e).into_response();
                }
                if let Some(e) = err.downcast_ref::<LedgerError>() {
                    return classify_ledger(e).into_response();
                }
                tracing::error!("Internal Server Error: {}", err);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error".to_string())
            }
        };

        let body = Json(json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self::Anyhow(err.into())
    }
}
