// crates/babel-core/src/error.rs

use thiserror::Error;

/// Protocol-wide error types for the Babel Protocol.
#[derive(Debug, Error)]
pub enum BabelError {
    /// Malformed input rejected before any state change (bad vote, missing field).
    #[error("Validation error: {0}")]
    Validation(String),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// The actor is not allowed to perform the operation.
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// A record with the same identity already exists.
    #[error("Already exists: {0}")]
    AlreadyExists(String),

    /// Persistence collaborator failure.
    #[error("Storage error: {0}")]
    Storage(String),

    /// External analysis service failure.
    #[error("Analysis error: {0}")]
    Analysis(String),

    /// A collaborator call exceeded its time bound.
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Invalid state transition.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// The event hub is no longer running.
    #[error("Hub error: {0}")]
    Hub(String),
}

impl BabelError {
    /// Whether this error is the caller's fault and was raised before any
    /// state change, as opposed to a collaborator failure.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            BabelError::Validation(_) | BabelError::NotFound(_) | BabelError::Forbidden(_)
        )
    }
}

impl From<serde_json::Error> for BabelError {
    fn from(e: serde_json::Error) -> Self {
        BabelError::Serialization(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_family_is_caller_error() {
        assert!(BabelError::Validation("x".into()).is_validation());
        assert!(BabelError::Forbidden("x".into()).is_validation());
        assert!(BabelError::NotFound("x".into()).is_validation());
        assert!(!BabelError::Storage("x".into()).is_validation());
        assert!(!BabelError::Timeout("x".into()).is_validation());
    }

    #[test]
    fn serde_errors_convert() {
        let err: BabelError = serde_json::from_str::<u32>("nope").unwrap_err().into();
        assert!(matches!(err, BabelError::Serialization(_)));
    }
}
