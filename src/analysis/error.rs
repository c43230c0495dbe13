//! Analysis error types

use crate::codec::{CodecError, ValueType};
use thiserror::Error;

/// Errors raised while defining or evaluating a problem
#[derive(Error, Debug)]
pub enum AnalysisError {
    /// Definition is incomplete or inconsistent
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Constraint names a signal the log does not contain
    #[error("Signal not found: {0}")]
    SignalNotFound(String),

    /// Threshold kind does not fit the signal's value type
    #[error("Threshold for '{signal}' ({value_type}) must be {expected}")]
    ConstraintTypeMismatch {
        signal: String,
        value_type: ValueType,
        expected: &'static str,
    },

    /// Relation operator could not be parsed
    #[error("Unknown relation: {0}")]
    UnknownRelation(String),

    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for analysis operations
pub type AnalysisResult<T> = Result<T, AnalysisError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = AnalysisError::ConstraintTypeMismatch {
            signal: "battery".into(),
            value_type: ValueType::Int32,
            expected: "integer",
        };
        assert_eq!(
            err.to_string(),
            "Threshold for 'battery' (int) must be integer"
        );
        assert_eq!(
            AnalysisError::UnknownRelation("=>".into()).to_string(),
            "Unknown relation: =>"
        );
    }
}
