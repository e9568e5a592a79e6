use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Validation error: {0}")]
    ValidationError(#[from] validator::ValidationErrors),

    #[error("Bad request: {0}")]
    BadRequest(anyhow::Error),

    #[error("Not found: {0}")]
    NotFound(anyhow::Error),

    #[error("Upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("Payment session creation failed for order {order_id}: {cause}")]
    PaymentSessionFailed { order_id: Uuid, cause: anyhow::Error },

    #[error("Storage error: {0}")]
    StorageError(anyhow::Error),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::InternalError(anyhow::Error::new(err))
    }
}

impl AppError {
    /// Status code carried in the caller-facing error envelope.
    pub fn status_code(&self) -> u16 {
        match self {
            AppError::ValidationError(_) | AppError::BadRequest(_) => 400,
            AppError::NotFound(_) => 404,
            AppError::UpstreamUnavailable(_) => 503,
            // The order is already persisted at this point; callers must be
            // able to tell this apart from a persistence failure.
            AppError::PaymentSessionFailed { .. } => 502,
            AppError::StorageError(_) | AppError::InternalError(_) => 500,
        }
    }

    /// Stable label for error metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::ValidationError(_) => "validation",
            AppError::BadRequest(_) => "bad_request",
            AppError::NotFound(_) => "not_found",
            AppError::UpstreamUnavailable(_) => "upstream_unavailable",
            AppError::PaymentSessionFailed { .. } => "payment_session",
            AppError::StorageError(_) => "storage",
            AppError::InternalError(_) => "internal",
        }
    }

    pub fn envelope(&self) -> ErrorEnvelope {
        ErrorEnvelope {
            status: self.status_code(),
            message: self.to_string(),
        }
    }
}

/// Caller-facing error envelope, sent as the reply payload on any failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    pub status: u16,
    pub message: String,
}
