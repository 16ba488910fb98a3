//! FHIRPath expression engine
//!
//! A self-contained implementation of the FHIRPath language core over FHIR
//! JSON resources: lexer, Pratt parser, operator/function registry, static
//! analyzer and tree-walking interpreter.
//!
//! ```
//! use serde_json::json;
//!
//! let patient = json!({
//!     "resourceType": "Patient",
//!     "name": [{"use": "official", "family": "Smith", "given": ["Sarah"]}]
//! });
//! let names = fhirpath_engine::evaluate("name.given", &patient).unwrap();
//! assert_eq!(names.first().unwrap().as_string(), Some("Sarah"));
//! ```
//!
//! Purity: evaluation is deterministic except for `today()`, `now()` and
//! `timeOfDay()` (clock-dependent) and `trace()` (emits log records).

pub mod analyzer;
pub mod ast;
pub mod diagnostics;
pub mod engine;
pub mod error;
pub mod evaluator;
pub mod model;
pub mod parser;
pub mod registry;

pub use analyzer::{AnalysisMode, AnalysisResult, AnalyzerOptions};
pub use ast::{Expression, ExpressionNode};
pub use diagnostics::{Diagnostic, DiagnosticCode, Severity};
pub use engine::FhirPathEngine;
pub use error::FhirPathError;
pub use evaluator::{EvaluationContext, EvaluationError, Interpreter};
pub use model::{Collection, FhirPathValue, ModelProvider, Quantity, TypeInfo, TypeKind};
pub use parser::{ParseError, ParseOptions, ParseResult, parse, parse_with_options};

use serde_json::Value as JsonValue;

/// Evaluate a FHIRPath expression against a FHIR JSON input with a default
/// engine.
pub fn evaluate(source: &str, input: &JsonValue) -> Result<Collection, FhirPathError> {
    FhirPathEngine::new().evaluate(source, input)
}

/// Statically analyze a FHIRPath expression with a default engine.
///
/// Analysis without a model provider treats navigation as `Any`; attach a
/// provider via [`FhirPathEngine::with_model_provider`] for full checking.
pub fn analyze(source: &str, options: AnalyzerOptions) -> Result<AnalysisResult, ParseError> {
    FhirPathEngine::new().analyze(source, options)
}
