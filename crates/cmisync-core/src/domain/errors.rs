//! Domain error types
//!
//! Validation failures raised while constructing domain values such as
//! identifiers, tokens and canonical events.

use thiserror::Error;

/// Errors that can occur in domain operations
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Invalid remote object identifier
    #[error("Invalid remote ID: {0}")]
    InvalidRemoteId(String),

    /// Invalid change token or change log token
    #[error("Invalid change token: {0}")]
    InvalidChangeToken(String),

    /// Invalid local identity token
    #[error("Invalid local identity: {0}")]
    InvalidIdentity(String),

    /// Invalid checksum (empty value or algorithm)
    #[error("Invalid checksum: {0}")]
    InvalidChecksum(String),

    /// A canonical event was constructed without any change on either side
    #[error("Event carries no change: {0}")]
    EmptyEvent(String),

    /// Generic validation failure
    #[error("Validation failed: {0}")]
    ValidationFailed(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = DomainError::InvalidRemoteId("empty".to_string());
        assert_eq!(err.to_string(), "Invalid remote ID: empty");

        let err = DomainError::EmptyEvent("folder /a".to_string());
        assert_eq!(err.to_string(), "Event carries no change: folder /a");
    }

    #[test]
    fn test_error_equality() {
        let err1 = DomainError::InvalidChecksum("x".to_string());
        let err2 = DomainError::InvalidChecksum("x".to_string());
        let err3 = DomainError::InvalidChecksum("y".to_string());

        assert_eq!(err1, err2);
        assert_ne!(err1, err3);
    }
}
