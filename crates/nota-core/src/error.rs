//! Error types for nota.

use thiserror::Error;

/// Result type alias using nota's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for nota operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation failed (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A named space, tag or attribute does not exist, even after a
    /// metadata refresh
    #[error("Not found: {0}")]
    NotFound(String),

    /// An unqualified name matches entries in more than one space
    #[error("Ambiguous name: {0}")]
    AmbiguousName(String),

    /// An order-clause tag reference did not use exactly one search depth
    #[error("Invalid order clause: {0}")]
    InvalidOrder(String),

    /// A relationship search depth outside the supported 0..=2 range
    #[error("Unsupported search depth: {0}")]
    UnsupportedDepth(u8),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_not_found() {
        let err = Error::NotFound("tag 'todo' in space 3".to_string());
        assert_eq!(err.to_string(), "Not found: tag 'todo' in space 3");
    }

    #[test]
    fn test_error_display_ambiguous_name() {
        let err = Error::AmbiguousName("inbox".to_string());
        assert_eq!(err.to_string(), "Ambiguous name: inbox");
    }

    #[test]
    fn test_error_display_unsupported_depth() {
        let err = Error::UnsupportedDepth(7);
        assert_eq!(err.to_string(), "Unsupported search depth: 7");
    }

    #[test]
    fn test_error_from_serde_json() {
        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err: Error = json_err.into();
        assert!(matches!(err, Error::Serialization(_)));
    }
}
