use thiserror::Error;

use crate::model::ModelError;

/// Failures of a single prediction request.
///
/// Narrative failures are not listed here: they degrade into
/// [`crate::narrative::Narrative::Unavailable`] instead of aborting.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Out-of-range or malformed form field, rejected before the model runs.
    #[error("invalid {field}: {reason}")]
    InvalidInput { field: &'static str, reason: String },

    /// The model rejected a derived record.
    #[error("prediction failed: {0}")]
    Prediction(String),

    /// The depreciation chart could not be drawn.
    #[error("chart rendering failed: {0}")]
    Chart(String),

    /// Missing chart or malformed content block.
    #[error("report assembly failed: {0}")]
    Report(String),
}

impl PipelineError {
    pub fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidInput {
            field,
            reason: reason.into(),
        }
    }

    pub fn is_invalid_input(&self) -> bool {
        matches!(self, Self::InvalidInput { .. })
    }
}

impl From<ModelError> for PipelineError {
    fn from(e: ModelError) -> Self {
        Self::Prediction(e.to_string())
    }
}
