//! Top-level error type for the public API

use crate::evaluator::EvaluationError;
use crate::parser::ParseError;
use crate::registry::RegistryError;
use thiserror::Error;

/// Any failure the engine can surface
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FhirPathError {
    /// Lexing or parsing failed
    #[error(transparent)]
    Parse(#[from] ParseError),

    /// Runtime evaluation failed
    #[error(transparent)]
    Evaluation(#[from] EvaluationError),

    /// Registration of a function or operator failed
    #[error(transparent)]
    Registry(#[from] RegistryError),
}
