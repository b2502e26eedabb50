//! Error handling module
//!
//! Application-level error type wrapping the per-operation errors, plus a
//! serializable error body for logs and tooling.

use serde::Serialize;

use crate::config::ConfigError;
use crate::domain::{CreateError, PurchaseError, RemoveError};
use crate::jobs::JobError;

/// Application-wide Result type
pub type AppResult<T> = Result<T, AppError>;

/// Application error types
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    // Operation errors
    #[error(transparent)]
    Create(#[from] CreateError),

    #[error(transparent)]
    Remove(#[from] RemoveError),

    #[error(transparent)]
    Purchase(#[from] PurchaseError),

    // Startup / background errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Job error: {0}")]
    Job(#[from] JobError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Stable machine-readable code
    pub fn error_code(&self) -> &'static str {
        match self {
            AppError::Create(e) => e.error_code(),
            AppError::Remove(e) => e.error_code(),
            AppError::Purchase(e) => e.error_code(),
            AppError::Config(_) => "config_error",
            AppError::Job(_) => "job_error",
            AppError::Internal(_) => "internal_error",
        }
    }

    /// Whether the caller (rather than the system) is at fault
    pub fn is_client_error(&self) -> bool {
        match self {
            AppError::Create(e) => {
                e.is_validation_error() || matches!(e, CreateError::CapacityReached { .. })
            }
            AppError::Remove(_) => true,
            AppError::Purchase(e) => e.is_client_error(),
            AppError::Config(_) | AppError::Job(_) | AppError::Internal(_) => false,
        }
    }
}

/// Error body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub error_code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl From<&AppError> for ErrorResponse {
    fn from(err: &AppError) -> Self {
        let details = match err {
            AppError::Purchase(PurchaseError::DeliveryFailedAfterDebit { reason, .. }) => {
                Some(reason.clone())
            }
            AppError::Create(CreateError::InvalidDuration(msg))
            | AppError::Create(CreateError::InvalidPrice(msg)) => Some(msg.clone()),
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                None
            }
            _ => None,
        };

        ErrorResponse {
            error: err.to_string(),
            error_code: err.error_code().to_string(),
            details,
        }
    }
}
