//! Error types shared by every loader and query in the pipeline
//!
//! Each variant corresponds to one failure class a caller may want to react to
//! differently:
//! - **`DataUnavailable`**: a source could not be fetched, timed out, or is corrupt
//! - **`SchemaError`**: a tabular source lacks a required column or value
//! - **`ShapeMismatch`**: a raster reports degenerate dimensions
//! - **`InvalidArgument`**: a documented precondition was violated by the caller
//! - **`NotFound`**: a lookup against current catalog state missed
//!
//! Context is stored as owned strings so errors are cheap to clone. The session
//! keeps the error of a failed source and hands out copies on every query.

use serde::Serialize;
use std::fmt;

/// Result alias used throughout the crate
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Discriminant of a [`PipelineError`], for callers that only branch on the class
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ErrorKind {
    /// Source unreachable, corrupt, empty or timed out
    DataUnavailable,
    /// Required column or field missing
    SchemaError,
    /// Degenerate raster dimensions
    ShapeMismatch,
    /// Caller violated a documented precondition
    InvalidArgument,
    /// Lookup miss
    NotFound,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::DataUnavailable => "data unavailable",
            ErrorKind::SchemaError => "schema error",
            ErrorKind::ShapeMismatch => "shape mismatch",
            ErrorKind::InvalidArgument => "invalid argument",
            ErrorKind::NotFound => "not found",
        };
        f.write_str(name)
    }
}

/// Errors produced by the ingestion pipeline
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PipelineError {
    /// The source could not be read or does not hold usable data
    #[error("{origin}: data unavailable: {reason}")]
    DataUnavailable {
        /// Human readable description of the source (path, URL, or "in-memory")
        origin: String,
        /// What went wrong
        reason: String,
    },

    /// A required column or field is missing
    #[error("{origin}: schema error: {reason}")]
    SchemaError {
        /// Human readable description of the source
        origin: String,
        /// Which column or field is missing and where
        reason: String,
    },

    /// Raster dimensions are zero or inconsistent with the sample buffer
    #[error("raster shape mismatch: {rows} rows x {cols} cols ({reason})")]
    ShapeMismatch {
        /// Reported row count
        rows: usize,
        /// Reported column count
        cols: usize,
        /// Why the shape is rejected
        reason: String,
    },

    /// A caller-supplied value violates a precondition
    #[error("invalid argument '{parameter}': {reason}")]
    InvalidArgument {
        /// Name of the offending parameter
        parameter: &'static str,
        /// Constraint that was violated, including the received value
        reason: String,
    },

    /// A lookup did not match anything
    #[error("{what} '{key}' not found for location '{location}'")]
    NotFound {
        /// Kind of key that was looked up ("label", "event id")
        what: &'static str,
        /// Location the lookup was scoped to
        location: String,
        /// The key itself
        key: String,
    },
}

impl PipelineError {
    /// Create a `DataUnavailable` error for the given source description
    pub fn unavailable(origin: impl Into<String>, reason: impl fmt::Display) -> Self {
        Self::DataUnavailable {
            origin: origin.into(),
            reason: reason.to_string(),
        }
    }

    /// Create a `SchemaError` for the given source description
    pub fn schema(origin: impl Into<String>, reason: impl fmt::Display) -> Self {
        Self::SchemaError {
            origin: origin.into(),
            reason: reason.to_string(),
        }
    }

    /// Create an `InvalidArgument` error
    pub fn invalid_argument(parameter: &'static str, reason: impl fmt::Display) -> Self {
        Self::InvalidArgument {
            parameter,
            reason: reason.to_string(),
        }
    }

    /// The error class
    pub fn kind(&self) -> ErrorKind {
        match self {
            PipelineError::DataUnavailable { .. } => ErrorKind::DataUnavailable,
            PipelineError::SchemaError { .. } => ErrorKind::SchemaError,
            PipelineError::ShapeMismatch { .. } => ErrorKind::ShapeMismatch,
            PipelineError::InvalidArgument { .. } => ErrorKind::InvalidArgument,
            PipelineError::NotFound { .. } => ErrorKind::NotFound,
        }
    }
}
