//! Error types produced while compiling matcher configuration.

use thiserror::Error;

/// Result alias for matcher compilation.
pub type MatcherCompileResult<T> = Result<T, MatcherCompileError>;

/// Errors that can occur while compiling a single matcher entry.
///
/// These are configuration-time errors: a listener whose
/// matcher set fails to compile is never started.
#[derive(Debug, Error)]
pub enum MatcherCompileError {
    #[error("invalid regex pattern: {0}")]
    InvalidRegex(#[from] regex::Error),

    #[error("byte literal value {0} is out of range (must be -1..=255)")]
    ByteOutOfRange(i64),
}
