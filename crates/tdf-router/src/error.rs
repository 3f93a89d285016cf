//! Error types for conversion pipelines and the router.

use std::str::Utf8Error;

use tdf_renderer::ValidationError;

use crate::result::OutputFormat;

/// Failure of one pipeline tier. Absorbed by the fallback chain.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum PipelineError {
    /// The rendered tree failed schema validation.
    #[error("schema validation failed")]
    Validation(#[from] ValidationError),

    /// The pipeline returned a payload of the other format.
    #[error("{expected} pipeline returned a {actual} payload")]
    WrongFormat {
        expected: OutputFormat,
        actual: OutputFormat,
    },

    /// The pipeline panicked.
    #[error("pipeline panicked: {0}")]
    Panicked(String),

    /// Any other pipeline-specific failure.
    #[error("{0}")]
    Failed(String),
}

/// Failure visible to callers of the router.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ConvertError {
    /// Input bytes are not UTF-8, so not even the plain-text tier can run.
    #[error("input is not valid UTF-8")]
    InvalidUtf8(#[from] Utf8Error),
}
