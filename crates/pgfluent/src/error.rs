//! Error types for pgfluent

use crate::value::ValueKind;
use thiserror::Error;

/// Result type alias for pgfluent operations
pub type OrmResult<T> = Result<T, OrmError>;

/// Error types for statement building and execution
#[derive(Debug, Error)]
pub enum OrmError {
    /// Builder misuse: the call is not legal in the statement's current state
    #[error("Illegal state: {0}")]
    IllegalState(String),

    /// A lookup expected to match at most one row matched several
    #[error("Not unique: {0}")]
    NotUnique(String),

    /// Row not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// A reproduced value cannot be written by the binder chosen when the statement was composed
    #[error("Type mismatch for parameter ${position}: expected {expected}, got {found}")]
    TypeMismatch {
        position: usize,
        expected: ValueKind,
        found: ValueKind,
    },

    /// Query execution error, propagated unchanged from the driver
    #[error("Query error: {0}")]
    Query(#[from] tokio_postgres::Error),

    /// Row decode/mapping error
    #[error("Decode error on column '{column}': {message}")]
    Decode { column: String, message: String },

    /// Invalid identifier or metadata declaration
    #[error("Validation error: {0}")]
    Validation(String),

    /// Other errors
    #[error("{0}")]
    Other(String),
}

impl OrmError {
    /// Create an illegal-state error
    pub fn illegal_state(message: impl Into<String>) -> Self {
        Self::IllegalState(message.into())
    }

    /// Create a not-unique error
    pub fn not_unique(message: impl Into<String>) -> Self {
        Self::NotUnique(message.into())
    }

    /// Create a decode error for a specific column
    pub fn decode(column: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Decode {
            column: column.into(),
            message: message.into(),
        }
    }

    /// Create a not found error
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    /// Create a validation error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Check if this is an illegal-state error
    pub fn is_illegal_state(&self) -> bool {
        matches!(self, Self::IllegalState(_))
    }

    /// Check if this is a not-unique error
    pub fn is_not_unique(&self) -> bool {
        matches!(self, Self::NotUnique(_))
    }

    /// Check if this is a not found error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Check if this is a type mismatch error
    pub fn is_type_mismatch(&self) -> bool {
        matches!(self, Self::TypeMismatch { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_mismatch_message_names_position_and_kinds() {
        let err = OrmError::TypeMismatch {
            position: 2,
            expected: ValueKind::Int8,
            found: ValueKind::Text,
        };
        assert_eq!(
            err.to_string(),
            "Type mismatch for parameter $2: expected int8, got text"
        );
        assert!(err.is_type_mismatch());
    }

    #[test]
    fn constructors_and_predicates_agree() {
        assert!(OrmError::illegal_state("x").is_illegal_state());
        assert!(OrmError::not_unique("x").is_not_unique());
        assert!(OrmError::not_found("x").is_not_found());
        assert!(!OrmError::validation("x").is_illegal_state());
    }
}
