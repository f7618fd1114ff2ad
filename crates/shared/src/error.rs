//! Application-wide error types.

use thiserror::Error;

/// Application error types.
#[derive(Debug, Error)]
pub enum AppError {
    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Validation error in the request itself.
    #[error("Validation error: {0}")]
    Validation(String),

    /// The stored statement configuration is malformed.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// External service error (data access layer).
    #[error("External service error: {0}")]
    ExternalService(String),

    /// External service did not answer in time.
    #[error("Timed out: {0}")]
    Timeout(String),

    /// The caller abandoned the request.
    #[error("Request cancelled: {0}")]
    Cancelled(String),

    /// Internal server error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Returns the HTTP status code for this error.
    #[must_use]
    pub const fn status_code(&self) -> u16 {
        match self {
            Self::NotFound(_) => 404,
            Self::Validation(_) => 400,
            Self::Configuration(_) => 422,
            Self::ExternalService(_) => 502,
            Self::Timeout(_) => 504,
            Self::Cancelled(_) => 499,
            Self::Internal(_) => 500,
        }
    }

    /// Returns the error code for API responses.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "NOT_FOUND",
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::Configuration(_) => "CONFIGURATION_ERROR",
            Self::ExternalService(_) => "EXTERNAL_SERVICE_ERROR",
            Self::Timeout(_) => "TIMEOUT",
            Self::Cancelled(_) => "REQUEST_CANCELLED",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }
}
