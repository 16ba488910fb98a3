//! Static analysis: evaluation-free type inference and validation
//!
//! The analyzer walks the AST once, post-order, annotating every node's
//! `type_info` and accumulating diagnostics. It never throws: analysis
//! always returns an annotated tree, even when diagnostics contain errors.

mod type_analyzer;

pub use type_analyzer::Analyzer;

use crate::ast::Expression;
use crate::diagnostics::Diagnostic;
use crate::model::TypeInfo;
use rustc_hash::FxHashMap;

/// How strictly type problems are reported
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AnalysisMode {
    /// Type mismatches are errors
    #[default]
    Strict,
    /// Type mismatches are warnings; inference continues with `Any`
    Lenient,
}

/// Analysis options
#[derive(Default)]
pub struct AnalyzerOptions {
    /// Declared types for user `%`-variables (names without the sigil)
    pub user_variables: FxHashMap<String, TypeInfo>,
    /// The declared type of the evaluation input
    pub input_type: Option<TypeInfo>,
    /// Strict or lenient reporting
    pub mode: AnalysisMode,
    /// Names of engine-registered custom functions (treated as known,
    /// `Any`-returning)
    pub custom_functions: Vec<String>,
}

/// Analysis output: the annotated tree plus diagnostics
#[derive(Debug)]
pub struct AnalysisResult {
    /// The input AST with `type_info` populated
    pub ast: Expression,
    /// Accumulated diagnostics, in source order of discovery
    pub diagnostics: Vec<Diagnostic>,
}

impl AnalysisResult {
    /// True when any diagnostic is an error
    pub fn has_errors(&self) -> bool {
        self.diagnostics.iter().any(Diagnostic::is_error)
    }
}
