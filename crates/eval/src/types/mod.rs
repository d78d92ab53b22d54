//! Runtime value types, paths, schema registry and expression trees.
//!
//! These types are DISTINCT from the interchange construct structs. The
//! evaluator consumes a schema bundle, and everything here is built from
//! the parsed interchange form once, then shared read-only across calls.

pub mod expr;
pub mod path;
pub mod schema;
pub mod values;

pub use expr::{
    parse_expression, ArithmeticOp, ComparatorOp, Expression, Guard, LogicalOp, NumericKind,
    ScalarKind,
};
pub use path::{PathSet, PathString, Snapshot};
pub use schema::{
    BorrowRule, Check, Effect, Field, FieldType, Grant, MutateStatement, OwnershipRule,
    Permissions, Registry, Struct,
};
pub use values::{Leaf, LeafKind};

// ──────────────────────────────────────────────
// Errors
// ──────────────────────────────────────────────

/// Errors that can occur while loading a schema or evaluating against it.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EvalError {
    /// An ownership path does not walk `other` fields to the user struct.
    #[error("invalid ownership path '{path}' on struct '{struct_name}': {reason}")]
    InvalidOwnershipPath {
        struct_name: String,
        path: String,
        reason: String,
    },
    /// A path could not be resolved in the environment or the schema.
    #[error("unknown field: {path}")]
    UnknownField { path: String },
    /// A value does not support the requested capability.
    #[error("type mismatch: expected {expected}, got {got}")]
    TypeMismatch { expected: String, got: String },
    /// Division or modulus by zero, or numeric overflow.
    #[error("arithmetic error: {message}")]
    ArithmeticError { message: String },
    /// Generic evaluation failure.
    #[error("evaluation failure: {message}")]
    EvaluationFailure { message: String },
    /// The schema bundle is malformed or inconsistent.
    #[error("invalid schema: {message}")]
    InvalidSchema { message: String },
    /// Engine configuration could not be read or parsed.
    #[error("configuration error: {message}")]
    Config { message: String },
}

impl EvalError {
    pub(crate) fn schema(message: impl Into<String>) -> Self {
        EvalError::InvalidSchema {
            message: message.into(),
        }
    }

    pub(crate) fn mismatch(expected: impl Into<String>, got: impl Into<String>) -> Self {
        EvalError::TypeMismatch {
            expected: expected.into(),
            got: got.into(),
        }
    }
}

impl From<graft_interchange::InterchangeError> for EvalError {
    fn from(e: graft_interchange::InterchangeError) -> Self {
        EvalError::InvalidSchema {
            message: e.to_string(),
        }
    }
}
