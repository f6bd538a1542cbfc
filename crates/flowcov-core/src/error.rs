use thiserror::Error;

/// Run-fatal failures. Per-file problems never surface here; they are folded
/// into the owning `FileCoverageRecord` as data.
#[derive(Debug, Error)]
pub enum CoverageError {
    #[error("flow status command failed: {0}")]
    StatusCommand(String),

    #[error("failed to parse flow status JSON: {0}")]
    StatusParse(String),

    #[error("invalid flow status JSON format (missing flowVersion)")]
    InvalidStatus,

    #[error("no include glob has been specified")]
    EmptyIncludePatterns,

    #[error("negated include glob '{0}' is not supported")]
    NegatedIncludePattern(String),

    #[error("invalid glob pattern '{pattern}': {message}")]
    InvalidPattern { pattern: String, message: String },

    #[error("unexpected missing annotation on collected file '{0}'")]
    MissingAnnotation(String),

    #[error("{0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, CoverageError>;
