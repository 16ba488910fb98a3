//! Runtime evaluation errors
//!
//! Only conditions that violate FHIRPath semantics raise errors; empty
//! navigations, failed casts, division by zero and out-of-bounds indexing
//! all yield empty collections instead.

use crate::parser::Position;
use thiserror::Error;

/// Error raised by the interpreter
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{message}{}", position.map(|p| format!(" at {p}")).unwrap_or_default())]
pub struct EvaluationError {
    /// Human-readable description
    pub message: String,
    /// Source position, when the failing node is known
    pub position: Option<Position>,
}

impl EvaluationError {
    /// Create an error without position information
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            position: None,
        }
    }

    /// Attach a source position
    pub fn at(mut self, position: Position) -> Self {
        self.position.get_or_insert(position);
        self
    }

    /// The standard singleton-rule violation
    pub fn multiple_items(what: &str) -> Self {
        Self::new(format!(
            "{what} requires a collection with at most one item, found multiple"
        ))
    }

    /// Incompatible quantity units in arithmetic or comparison
    pub fn incompatible_units(left: &str, right: &str) -> Self {
        Self::new(format!("incompatible quantity units '{left}' and '{right}'"))
    }
}

/// Result alias for evaluation
pub type EvalResult<T> = Result<T, EvaluationError>;
