//! Error types for the Paideia tutoring memory core
//!
//! This module provides comprehensive error handling using thiserror for
//! structured error definitions and anyhow for error propagation.

use thiserror::Error;

/// Main error type for Paideia operations
#[derive(Error, Debug)]
pub enum PaideiaError {
    /// Consent/identity lookup unreachable or returned garbage
    #[error("Consent resolution error: {0}")]
    ConsentResolution(String),

    /// Moderation service request failed (recovered locally per sub-check)
    #[error("Moderation service error: {0}")]
    Moderation(String),

    /// Vector store read failed. Kept distinct from an empty result set so
    /// callers can tell "no matches" from "store unavailable".
    #[error("Store query error: {0}")]
    StoreQuery(String),

    /// Vector store write failed
    #[error("Store write error: {0}")]
    StoreWrite(String),

    /// Completion service request failed
    #[error("Completion API error: {0}")]
    CompletionApi(String),

    /// Embedding generation failed
    #[error("Embedding error: {0}")]
    Embedding(String),

    /// A record violated a data-model invariant (difficulty range, missing
    /// timestamp, unknown memory type in storage)
    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    /// HTTP request error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

/// Result type alias for Paideia operations
pub type Result<T> = std::result::Result<T, PaideiaError>;

/// Convert anyhow::Error to PaideiaError
impl From<anyhow::Error> for PaideiaError {
    fn from(err: anyhow::Error) -> Self {
        PaideiaError::Other(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = PaideiaError::StoreQuery("connection refused".to_string());
        assert_eq!(err.to_string(), "Store query error: connection refused");
    }

    #[test]
    fn test_query_and_write_errors_are_distinct() {
        let read = PaideiaError::StoreQuery("x".to_string());
        let write = PaideiaError::StoreWrite("x".to_string());
        assert_ne!(read.to_string(), write.to_string());
    }

    #[test]
    fn test_serde_error_conversion() {
        let serde_err = serde_json::from_str::<serde_json::Value>("not json").unwrap_err();
        let err: PaideiaError = serde_err.into();
        assert!(matches!(err, PaideiaError::Serialization(_)));
    }
}
