//! Forecast error types

use thiserror::Error;

/// Result type alias for model operations
pub type ForecastResult<T> = std::result::Result<T, ForecastError>;

/// Errors raised while fitting or evaluating a model
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ForecastError {
    /// Not enough points for the model to fit
    #[error("insufficient data: need at least {needed}, got {got}")]
    InsufficientData { needed: usize, got: usize },

    /// Input cannot support a fit (constant series, zero time span, NaN)
    #[error("degenerate series: {0}")]
    Degenerate(String),

    /// Linear solve or evaluation produced no usable result
    #[error("numerical failure: {0}")]
    Numerical(String),

    /// Invalid model parameter
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_messages_are_descriptive() {
        let err = ForecastError::InsufficientData { needed: 10, got: 3 };
        assert_eq!(err.to_string(), "insufficient data: need at least 10, got 3");

        let err = ForecastError::Degenerate("constant series".into());
        assert_eq!(err.to_string(), "degenerate series: constant series");
    }
}
