//! Error types for the shared data model.

use thiserror::Error;

/// Result type alias using CommonError.
pub type CommonResult<T> = Result<T, CommonError>;

/// Errors raised while interpreting shared model values.
#[derive(Debug, Error)]
pub enum CommonError {
    #[error("Invalid epoch value: {0}")]
    InvalidEpoch(String),

    #[error("Epoch out of range: {0}")]
    EpochOutOfRange(i64),

    #[error("Invalid descriptor '{id}': {message}")]
    InvalidDescriptor { id: String, message: String },

    #[error("Descriptor '{0}' has no record source")]
    MissingSource(String),
}
