use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use luma_order::orchestrator::PaymentError;
use luma_store::GatewayError;
use serde_json::json;

#[derive(Debug)]
pub enum AppError {
    ValidationError(String),
    NotFoundError(String),
    ConflictError(String),
    ServiceUnavailable(String),
    Anyhow(anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::ValidationError(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::NotFoundError(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::ConflictError(msg) => (StatusCode::CONFLICT, msg),
            AppError::ServiceUnavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg),
            AppError::Anyhow(err) => {
                tracing::error!("Internal Server Error: {}", err);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal Server Error".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        Self::Anyhow(err)
    }
}

impl From<GatewayError> for AppError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::NotFound(id) => Self::NotFoundError(format!("Order not found: {id}")),
            GatewayError::Unavailable(msg) => {
                Self::ServiceUnavailable(format!("Order service temporarily unavailable: {msg}"))
            }
            GatewayError::Rejected { status: 404, message } => Self::NotFoundError(message),
            GatewayError::Rejected { status: 400, message } => Self::ValidationError(message),
            GatewayError::Rejected { message, .. } => Self::ConflictError(message),
            GatewayError::Transition(e) => Self::ConflictError(e.to_string()),
            GatewayError::Payment(e) => match e {
                PaymentError::OrderNotFound(id) => {
                    Self::NotFoundError(format!("Order not found: {id}"))
                }
                other => Self::ConflictError(other.to_string()),
            },
            GatewayError::Store(msg) => Self::Anyhow(anyhow::anyhow!(msg)),
        }
    }
}
