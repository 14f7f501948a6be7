//! Core error type.
//!
//! Each crate owns its own `thiserror` enum. [`RelayError`] covers the
//! failures that can happen on foundation types.

use thiserror::Error;

/// Errors raised by foundation types.
#[derive(Debug, Error)]
pub enum RelayError {
    /// JSON serialization/deserialization error.
    #[error("serde error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Convenience type alias for core results.
pub type Result<T> = std::result::Result<T, RelayError>;

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn serde_error_display() {
        let serde_err = serde_json::from_str::<String>("not json").unwrap_err();
        let err = RelayError::Serde(serde_err);
        assert!(err.to_string().starts_with("serde error"));
    }

    #[test]
    fn from_serde_error() {
        let serde_err = serde_json::from_str::<String>("bad").unwrap_err();
        let err: RelayError = serde_err.into();
        assert_matches!(err, RelayError::Serde(_));
    }
}
