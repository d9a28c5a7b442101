/*!
 * Error Types
 * Centralized error handling with thiserror, miette, and serde support
 */

use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors surfaced by external stores (permission store, ownership lookup)
#[derive(Error, Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Diagnostic)]
#[serde(tag = "error_type", content = "details", rename_all = "snake_case")]
pub enum StoreError {
    #[error("Store unavailable: {0}")]
    #[diagnostic(
        code(store::unavailable),
        help("The backing store cannot be reached. Check connectivity and store health.")
    )]
    Unavailable(String),

    #[error("{kind} {id} not found")]
    #[diagnostic(
        code(store::not_found),
        help("The referenced record does not exist upstream. It may have been deleted.")
    )]
    NotFound { kind: String, id: String },
}

impl StoreError {
    pub fn not_found(kind: impl Into<String>, id: impl Into<String>) -> Self {
        StoreError::NotFound {
            kind: kind.into(),
            id: id.into(),
        }
    }
}

/// Unified engine error type
///
/// Store failures are resolved locally by each component (fail-open or
/// fail-closed per its policy); the only errors that normally reach a caller
/// are programming misuses such as an empty actor id.
#[derive(Error, Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Diagnostic)]
#[serde(tag = "error_type", content = "details", rename_all = "snake_case")]
pub enum AuthError {
    #[error("Invalid request: {0}")]
    #[diagnostic(
        code(authgate::invalid_request),
        help("A required field was empty or malformed. This is a caller bug.")
    )]
    InvalidRequest(String),

    #[error("Store error: {0}")]
    #[diagnostic(transparent)]
    Store(#[from] StoreError),
}

/// Result type for engine operations
pub type AuthResult<T> = std::result::Result<T, AuthError>;

/// Validate a caller-supplied identifier at a public entry point
pub(crate) fn require_non_empty(value: &str, field: &str) -> AuthResult<()> {
    if value.trim().is_empty() {
        return Err(AuthError::InvalidRequest(format!("{field} must not be empty")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_error_serialization() {
        let error = StoreError::not_found("resource", "lead-42");
        let json = serde_json::to_string(&error).unwrap();
        let deserialized: StoreError = serde_json::from_str(&json).unwrap();
        assert_eq!(error, deserialized);
    }

    #[test]
    fn test_auth_error_from_store() {
        let error: AuthError = StoreError::Unavailable("connection refused".into()).into();
        assert!(matches!(error, AuthError::Store(_)));
        assert_eq!(
            error.to_string(),
            "Store error: Store unavailable: connection refused"
        );
    }

    #[test]
    fn test_require_non_empty() {
        assert!(require_non_empty("u1", "actor_id").is_ok());
        assert!(require_non_empty("", "actor_id").is_err());
        assert!(require_non_empty("   ", "actor_id").is_err());
    }
}
