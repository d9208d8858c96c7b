//! Error types for trend computations.

use thiserror::Error;

/// Errors raised by the trend-analysis core.
///
/// Only contract violations are errors. Too little data is reported through
/// [`TrendMethod::None`](crate::trends::selection::TrendMethod::None) instead.
#[derive(Debug, Error)]
pub enum TrendError {
    #[error("{function}: {message}")]
    Validation { function: String, message: String },

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl TrendError {
    /// Build a validation error scoped to the calling function.
    pub fn validation(function: &str, message: impl Into<String>) -> Self {
        TrendError::Validation {
            function: function.to_string(),
            message: message.into(),
        }
    }
}

/// Result type for trend operations
pub type Result<T> = std::result::Result<T, TrendError>;
