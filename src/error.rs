// Error taxonomy shared by every pipeline stage

use arrow::error::ArrowError;
use thiserror::Error;

use crate::sql::SyntaxError;

/// Canonical error type for parsing, binding, planning and execution.
///
/// Classification:
/// - [`DbError::Syntax`]: the query text does not match the grammar
/// - `UnknownTable` / `UnknownColumn` / `AmbiguousColumn` / `TypeMismatch` /
///   `InvalidGroupBy`: semantic failures found by the binder
/// - `DuplicateTable` / `SchemaMismatch` / `InvalidName`: catalog contract violations
/// - `ArithmeticOverflow` / `DivisionByZero`: data-dependent execution failures
/// - `Load`: an external batch loader failed while a scan was pulling from it
#[derive(Debug, Error)]
pub enum DbError {
    #[error("syntax error: {0}")]
    Syntax(#[from] SyntaxError),

    #[error("unknown table: {0}")]
    UnknownTable(String),

    #[error("unknown column: {0}")]
    UnknownColumn(String),

    #[error("ambiguous column reference: {0}")]
    AmbiguousColumn(String),

    #[error("type mismatch: {0}")]
    TypeMismatch(String),

    #[error("invalid group by: {0}")]
    InvalidGroupBy(String),

    #[error("schema mismatch: {0}")]
    SchemaMismatch(String),

    #[error("table already exists: {0}")]
    DuplicateTable(String),

    #[error("invalid name: {0}")]
    InvalidName(String),

    #[error("arithmetic overflow: {0}")]
    ArithmeticOverflow(String),

    #[error("division by zero")]
    DivisionByZero,

    /// Failure reported by an external batch loader.
    #[error("batch loader failed: {0}")]
    Load(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// A columnar kernel failed in a way that is not a classified data error.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Standard result alias.
pub type Result<T> = std::result::Result<T, DbError>;

impl From<ArrowError> for DbError {
    fn from(err: ArrowError) -> Self {
        match err {
            ArrowError::DivideByZero => DbError::DivisionByZero,
            ArrowError::ComputeError(msg) if msg.starts_with("Overflow happened") => {
                DbError::ArithmeticOverflow(msg)
            }
            other => DbError::Internal(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arrow_errors_are_classified() {
        assert!(matches!(
            DbError::from(ArrowError::DivideByZero),
            DbError::DivisionByZero
        ));
        assert!(matches!(
            DbError::from(ArrowError::ComputeError(
                "Overflow happened on: 9223372036854775807 + 1".into()
            )),
            DbError::ArithmeticOverflow(_)
        ));
        assert!(matches!(
            DbError::from(ArrowError::ComputeError("boom".into())),
            DbError::Internal(_)
        ));
    }

    #[test]
    fn test_messages_name_the_offender() {
        let err = DbError::UnknownColumn("c".to_string());
        assert_eq!(err.to_string(), "unknown column: c");
    }
}
