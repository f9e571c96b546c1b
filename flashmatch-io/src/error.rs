//! I/O error types.

use thiserror::Error;

/// Result type for I/O operations.
pub type Result<T> = std::result::Result<T, Error>;

/// I/O error types.
#[derive(Error, Debug)]
pub enum Error {
    /// File I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed row or header in a tabular file.
    #[error("invalid format at line {line}: {message}")]
    InvalidFormat {
        /// 1-based line number.
        line: usize,
        /// What was wrong.
        message: String,
    },

    /// A required column is absent from the header.
    #[error("missing column '{0}'")]
    MissingColumn(&'static str),

    /// JSON encoding or decoding error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Core library error.
    #[error("core error: {0}")]
    CoreError(#[from] flashmatch_core::Error),
}

impl Error {
    pub(crate) fn format(line: usize, message: impl Into<String>) -> Self {
        Error::InvalidFormat {
            line,
            message: message.into(),
        }
    }
}
