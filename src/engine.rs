//! The engine façade
//!
//! A [`FhirPathEngine`] bundles the shared registries with per-engine state:
//! a model provider, custom functions and user variables. Engines are cheap
//! to create (registry handles are shared) and an engine is immutable during
//! evaluation, so parsed expressions and engines may be shared across
//! threads.

use crate::analyzer::{Analyzer, AnalysisResult, AnalyzerOptions};
use crate::ast::Expression;
use crate::error::FhirPathError;
use crate::evaluator::{CustomFunction, EvaluationContext, Interpreter};
use crate::model::{Collection, FhirPathValue, ModelProvider};
use crate::parser::{ParseError, ParseOptions, ParseResult};
use crate::registry::{
    FunctionRegistry, OperatorRegistry, RegistryError, default_function_registry,
    default_operator_registry,
};
use rustc_hash::FxHashMap;
use serde_json::Value as JsonValue;
use std::sync::Arc;

/// A configured FHIRPath engine
#[derive(Clone)]
pub struct FhirPathEngine {
    functions: Arc<FunctionRegistry>,
    operators: Arc<OperatorRegistry>,
    model_provider: Option<Arc<dyn ModelProvider>>,
    custom_functions: FxHashMap<String, CustomFunction>,
    variables: FxHashMap<String, Collection>,
}

impl FhirPathEngine {
    /// Engine over the shared built-in registries
    pub fn new() -> Self {
        Self {
            functions: default_function_registry(),
            operators: default_operator_registry(),
            model_provider: None,
            custom_functions: FxHashMap::default(),
            variables: FxHashMap::default(),
        }
    }

    /// Attach a model provider for analysis
    pub fn with_model_provider(mut self, provider: Arc<dyn ModelProvider>) -> Self {
        self.model_provider = Some(provider);
        self
    }

    /// Register a custom function. Custom names shadow built-ins at
    /// evaluation time; keyword operators cannot be taken.
    pub fn register_function(
        &mut self,
        name: &str,
        function: CustomFunction,
    ) -> Result<(), RegistryError> {
        if self.custom_functions.contains_key(name) {
            return Err(RegistryError::Duplicate(name.to_string()));
        }
        self.custom_functions.insert(name.to_string(), function);
        Ok(())
    }

    /// Bind a user `%`-variable (name without the sigil)
    pub fn set_variable(&mut self, name: &str, value: FhirPathValue) {
        self.variables
            .insert(name.to_string(), Collection::singleton(value));
    }

    /// Bind a user `%`-variable to a whole collection
    pub fn set_variable_collection(&mut self, name: &str, value: Collection) {
        self.variables.insert(name.to_string(), value);
    }

    /// Parse in fast mode
    pub fn parse(&self, source: &str) -> Result<Expression, ParseError> {
        crate::parser::parse(source)
    }

    /// Parse with options (error recovery, trivia preservation)
    pub fn parse_with_options(&self, source: &str, options: ParseOptions) -> ParseResult {
        crate::parser::parse_with_options(source, options)
    }

    /// Parse and evaluate against a FHIR JSON input
    pub fn evaluate(
        &self,
        source: &str,
        input: &JsonValue,
    ) -> Result<Collection, FhirPathError> {
        let expr = self.parse(source)?;
        self.evaluate_expression(&expr, Collection::from_json(input))
    }

    /// Evaluate a parsed expression against an input collection
    pub fn evaluate_expression(
        &self,
        expr: &Expression,
        input: Collection,
    ) -> Result<Collection, FhirPathError> {
        let mut context = EvaluationContext::new(input.share());
        for (name, value) in &self.variables {
            context = context.define_variable(name.clone(), value.share());
        }
        let interpreter = Interpreter::new(&self.functions, &self.operators)
            .with_custom_functions(&self.custom_functions);
        let evaluated = interpreter.evaluate(expr, &input, &context)?;
        Ok(evaluated.value)
    }

    /// Parse and statically analyze
    pub fn analyze(
        &self,
        source: &str,
        mut options: AnalyzerOptions,
    ) -> Result<AnalysisResult, ParseError> {
        let ast = self.parse(source)?;
        options
            .custom_functions
            .extend(self.custom_functions.keys().cloned());
        Ok(self.analyze_expression(ast, options))
    }

    /// Statically analyze a parsed expression
    pub fn analyze_expression(
        &self,
        ast: Expression,
        options: AnalyzerOptions,
    ) -> AnalysisResult {
        let analyzer = Analyzer::new(
            &self.functions,
            &self.operators,
            self.model_provider.clone(),
        );
        analyzer.analyze(ast, options)
    }
}

impl Default for FhirPathEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluator::EvalResult;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn engine_evaluates_against_json() {
        let engine = FhirPathEngine::new();
        let out = engine
            .evaluate("1 + 2", &json!(null))
            .unwrap();
        assert_eq!(out.first().unwrap().as_integer(), Some(3));
    }

    #[test]
    fn user_variables_are_visible() {
        let mut engine = FhirPathEngine::new();
        engine.set_variable("threshold", FhirPathValue::Integer(10));
        let out = engine.evaluate("%threshold > 5", &json!(null)).unwrap();
        assert_eq!(out.first().unwrap().as_boolean(), Some(true));
    }

    #[test]
    fn custom_functions_shadow_builtins() {
        let mut engine = FhirPathEngine::new();
        engine
            .register_function(
                "double",
                Arc::new(|_ctx, input: &Collection, _args: &[Collection]| -> EvalResult<Collection> {
                    Ok(Collection::from_vec(
                        input
                            .iter()
                            .map(|v| match v {
                                FhirPathValue::Integer(i) => FhirPathValue::Integer(i * 2),
                                other => other.clone(),
                            })
                            .collect(),
                    ))
                }),
            )
            .unwrap();
        let out = engine.evaluate("(1 | 2).double()", &json!(null)).unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(out.get(0).unwrap().as_integer(), Some(2));
        assert_eq!(out.get(1).unwrap().as_integer(), Some(4));
    }

    #[test]
    fn duplicate_custom_function_is_rejected() {
        let mut engine = FhirPathEngine::new();
        let noop: CustomFunction =
            Arc::new(|_, input: &Collection, _| Ok(input.share()));
        engine.register_function("noop", noop.clone()).unwrap();
        assert!(engine.register_function("noop", noop).is_err());
    }

    #[test]
    fn engines_share_registries() {
        let a = FhirPathEngine::new();
        let b = FhirPathEngine::new();
        assert!(Arc::ptr_eq(&a.functions, &b.functions));
        assert!(Arc::ptr_eq(&a.operators, &b.operators));
    }
}
