//! Error types for data parsing in mijia-types.

use thiserror::Error;

/// Errors that can occur when decoding or encoding sensor payloads.
///
/// This error type is platform-agnostic and does not include
/// BLE-specific errors (those belong in mijia-core).
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum ParseError {
    /// The payload is shorter than the fixed layout requires.
    #[error("Insufficient bytes: expected at least {expected}, got {actual}")]
    InsufficientBytes {
        /// Minimum payload size.
        expected: usize,
        /// Actual payload size.
        actual: usize,
    },

    /// The payload does not have the expected shape.
    #[error("Malformed payload: {0}")]
    Malformed(String),

    /// A value supplied for encoding is outside the accepted domain.
    #[error("Invalid value: {0}")]
    InvalidValue(String),
}

impl ParseError {
    /// Create an insufficient bytes error.
    pub fn insufficient(expected: usize, actual: usize) -> Self {
        Self::InsufficientBytes { expected, actual }
    }
}

/// Result type alias using mijia-types' ParseError type.
pub type ParseResult<T> = std::result::Result<T, ParseError>;
