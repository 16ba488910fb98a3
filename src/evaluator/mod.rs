//! Expression evaluation
//!
//! The interpreter walks the AST with per-node dispatch; the runtime context
//! threads variables and iteration state through the evaluation.

mod context;
mod engine;
mod error;

pub use context::{Evaluated, EvaluationContext, VariableScope};
pub use engine::{CustomFunction, Interpreter};
pub use error::{EvalResult, EvaluationError};
