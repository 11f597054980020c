//! Error types for document building.
//!
//! Failures are layered by blast radius:
//! - [`BuildError`] aborts a whole work item
//! - [`RecordError`] discards the document for one record
//! - [`FunctionError`] is raised by a named function and becomes a
//!   [`RecordError::Function`]
//!
//! Missing fields are not errors at all; they are logged and resolve to null.

use std::path::PathBuf;

use ingest_common::CommonError;
use thiserror::Error;

/// Result type for item-level operations.
pub type BuildResult<T> = std::result::Result<T, BuildError>;

/// Result type for per-record operations.
pub type RecordResult<T> = std::result::Result<T, RecordError>;

/// Errors that fail an entire work item.
#[derive(Error, Debug)]
pub enum BuildError {
    #[error("Unknown builder type: {0}")]
    UnknownBuilder(String),

    #[error("Failed to read records from {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse records from {path:?}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("Invalid template for descriptor '{id}': {message}")]
    InvalidTemplate { id: String, message: String },

    #[error(transparent)]
    Descriptor(#[from] CommonError),
}

/// Errors that discard the document for a single record.
#[derive(Error, Debug)]
pub enum RecordError {
    #[error("Unknown named function: {0}")]
    UnknownFunction(String),

    #[error("Malformed function reference: {0}")]
    MalformedFunction(String),

    #[error("Named function '{name}' failed: {source}")]
    Function {
        name: String,
        #[source]
        source: FunctionError,
    },

    #[error("Invalid id template: {0}")]
    InvalidId(String),

    #[error("Invalid bulk data: {0}")]
    BulkData(String),
}

/// Errors raised inside a named function.
#[derive(Error, Debug)]
pub enum FunctionError {
    #[error("missing parameter '{0}'")]
    MissingParameter(String),

    #[error("parameter '{name}' is not {expected}: {value}")]
    InvalidParameter {
        name: String,
        expected: &'static str,
        value: String,
    },

    #[error("{0}")]
    Failed(String),
}
