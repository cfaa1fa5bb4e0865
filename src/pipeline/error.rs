//! Pipeline error types

use crate::forecast::ForecastError;
use crate::pipeline::PipelineStage;
use crate::storage::StoreError;
use thiserror::Error;

/// Result type alias for pipeline runs
pub type PipelineResult<T> = std::result::Result<T, PipelineError>;

/// Why a run failed
#[derive(Error, Debug)]
pub enum PipelineError {
    /// History store could not be reached or queried
    #[error("history store unavailable: {0}")]
    StoreUnavailable(#[source] StoreError),

    /// Too few clean points in the training window
    #[error("insufficient data: {count} points in window, need {minimum}")]
    InsufficientData { count: usize, minimum: usize },

    /// Model could not be fitted or evaluated
    #[error("forecast failed while {stage}: {source}")]
    FitError {
        stage: PipelineStage,
        #[source]
        source: ForecastError,
    },

    /// Results store rejected the write
    #[error("write failed: {0}")]
    WriteError(#[source] StoreError),
}

impl PipelineError {
    /// Engine failure raised while the run was in `stage`
    pub fn fit(stage: PipelineStage, source: ForecastError) -> Self {
        PipelineError::FitError { stage, source }
    }

    /// Whether running again later may succeed without any change in input
    pub fn is_retriable(&self) -> bool {
        match self {
            PipelineError::StoreUnavailable(_) | PipelineError::WriteError(_) => true,
            PipelineError::InsufficientData { .. } | PipelineError::FitError { .. } => false,
        }
    }

    /// Stage the run was in when it failed
    pub fn stage(&self) -> PipelineStage {
        match self {
            PipelineError::StoreUnavailable(_) => PipelineStage::Reading,
            PipelineError::InsufficientData { .. } => PipelineStage::Preparing,
            PipelineError::FitError { stage, .. } => *stage,
            PipelineError::WriteError(_) => PipelineStage::Writing,
        }
    }

    /// Stable machine-readable code for logs and status reports
    pub fn code(&self) -> &'static str {
        match self {
            PipelineError::StoreUnavailable(_) => "STORE_UNAVAILABLE",
            PipelineError::InsufficientData { .. } => "INSUFFICIENT_DATA",
            PipelineError::FitError { .. } => "FIT_ERROR",
            PipelineError::WriteError(_) => "WRITE_ERROR",
        }
    }
}
