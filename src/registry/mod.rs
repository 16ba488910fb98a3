//! Operator and function catalog
//!
//! Metadata-driven registries consulted by the parser (precedence), the
//! analyzer (signatures) and the interpreter (evaluators). Built once at
//! engine initialization through mutable builders, then shared immutably.

mod operator;
mod signature;

pub mod functions;

pub use operator::{
    Associativity, Operator, OperatorEvalFn, OperatorForm, TriState, boolean_of,
    register_builtin_operators,
};
pub use signature::{
    FunctionSignature, OperatorSignature, ParameterInfo, ParameterKind, SignatureType,
};

use crate::ast::Expression;
use crate::evaluator::{EvalResult, Evaluated, EvaluationContext};
use crate::model::Collection;
use once_cell::sync::Lazy;
use rustc_hash::FxHashMap;
use std::sync::Arc;
use thiserror::Error;

/// Registration failures
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RegistryError {
    /// Name already registered
    #[error("'{0}' is already registered")]
    Duplicate(String),
    /// Name reserved by the language
    #[error("'{0}' is a reserved name")]
    Reserved(String),
}

/// Keyword operators cannot be shadowed by functions
const RESERVED_NAMES: &[&str] = &[
    "and", "or", "xor", "implies", "div", "mod", "in", "true", "false",
];

/// An argument as delivered to a function evaluator
pub enum FunctionArg<'a> {
    /// Pre-evaluated `value` parameter
    Value(Collection),
    /// Unevaluated `expression` parameter
    Expression(&'a Expression),
}

impl<'a> FunctionArg<'a> {
    /// The evaluated collection, for value arguments
    pub fn as_value(&self) -> Option<&Collection> {
        match self {
            FunctionArg::Value(c) => Some(c),
            FunctionArg::Expression(_) => None,
        }
    }

    /// The AST node, for expression arguments
    pub fn as_expression(&self) -> Option<&'a Expression> {
        match self {
            FunctionArg::Expression(e) => Some(e),
            FunctionArg::Value(_) => None,
        }
    }
}

/// Evaluation callback handed to functions with expression parameters.
///
/// Implemented by the interpreter; functions drive iteration through it
/// without seeing interpreter internals.
pub trait ExpressionEvaluator {
    /// Evaluate `expr` against the given focus and context
    fn evaluate_expression(
        &self,
        expr: &Expression,
        focus: &Collection,
        context: &EvaluationContext,
    ) -> EvalResult<Evaluated>;
}

/// Call-site state passed to every function evaluator
pub struct FunctionContext<'a> {
    /// Callback into the interpreter
    pub evaluator: &'a dyn ExpressionEvaluator,
    /// The caller's runtime context
    pub context: &'a EvaluationContext,
    /// The input focus the function operates on
    pub input: &'a Collection,
}

impl FunctionContext<'_> {
    /// Evaluate an expression argument, discarding context extensions
    pub fn eval(
        &self,
        expr: &Expression,
        focus: &Collection,
        context: &EvaluationContext,
    ) -> EvalResult<Collection> {
        self.evaluator
            .evaluate_expression(expr, focus, context)
            .map(|e| e.value)
    }
}

/// Function result: output collection plus an optional context extension
/// (`defineVariable` is the one built-in that extends)
pub struct FunctionOutput {
    /// Output collection
    pub value: Collection,
    /// Extended context, when the function binds variables
    pub context: Option<EvaluationContext>,
}

impl FunctionOutput {
    /// Output with an unchanged context
    pub fn of(value: Collection) -> Self {
        Self {
            value,
            context: None,
        }
    }

    /// Output together with an extended context
    pub fn with_context(value: Collection, context: EvaluationContext) -> Self {
        Self {
            value,
            context: Some(context),
        }
    }
}

/// Built-in function evaluator
pub type FunctionEvalFn = fn(&FunctionContext<'_>, &[FunctionArg<'_>]) -> EvalResult<FunctionOutput>;

/// A registered function: signature metadata plus evaluator
pub struct Function {
    /// Declared shape
    pub signature: FunctionSignature,
    /// Evaluator callback
    pub eval: FunctionEvalFn,
}

/// Function catalog, keyed by name
#[derive(Default)]
pub struct FunctionRegistry {
    functions: FxHashMap<&'static str, Function>,
}

impl FunctionRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// True when the name is free and not reserved
    pub fn can_register(&self, name: &str) -> bool {
        !self.functions.contains_key(name) && !RESERVED_NAMES.contains(&name)
    }

    /// Register a function
    pub fn register(
        &mut self,
        signature: FunctionSignature,
        eval: FunctionEvalFn,
    ) -> Result<(), RegistryError> {
        let name = signature.name;
        if RESERVED_NAMES.contains(&name) {
            return Err(RegistryError::Reserved(name.to_string()));
        }
        if self.functions.contains_key(name) {
            return Err(RegistryError::Duplicate(name.to_string()));
        }
        self.functions.insert(name, Function { signature, eval });
        Ok(())
    }

    /// Look up a function by name
    pub fn lookup(&self, name: &str) -> Option<&Function> {
        self.functions.get(name)
    }

    /// True when the name is registered
    pub fn has(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    /// All registered function names, sorted
    pub fn list_functions(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.functions.keys().copied().collect();
        names.sort_unstable();
        names
    }
}

/// Operator catalog, keyed by symbol and form
#[derive(Default)]
pub struct OperatorRegistry {
    operators: FxHashMap<(&'static str, OperatorForm), Operator>,
}

impl OperatorRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an operator
    pub fn register(&mut self, operator: Operator) -> Result<(), RegistryError> {
        let key = (operator.symbol, operator.form);
        if self.operators.contains_key(&key) {
            return Err(RegistryError::Duplicate(operator.symbol.to_string()));
        }
        self.operators.insert(key, operator);
        Ok(())
    }

    /// Look up an operator by symbol and form
    pub fn lookup_operator<'a>(&'a self, symbol: &'a str, form: OperatorForm) -> Option<&'a Operator> {
        self.operators.get(&(symbol, form))
    }

    /// True when the symbol is registered in any form
    pub fn has(&self, symbol: &str) -> bool {
        self.operators.keys().any(|(s, _)| *s == symbol)
    }

    /// All registered `(symbol, form)` pairs, sorted by symbol
    pub fn list_operators(&self) -> Vec<(&'static str, OperatorForm)> {
        let mut keys: Vec<_> = self.operators.keys().copied().collect();
        keys.sort_unstable_by_key(|(s, _)| *s);
        keys
    }
}

static DEFAULT_FUNCTIONS: Lazy<Arc<FunctionRegistry>> = Lazy::new(|| {
    let mut registry = FunctionRegistry::new();
    functions::register_builtin_functions(&mut registry)
        .expect("built-in function registration is internally consistent");
    Arc::new(registry)
});

static DEFAULT_OPERATORS: Lazy<Arc<OperatorRegistry>> = Lazy::new(|| {
    let mut registry = OperatorRegistry::new();
    register_builtin_operators(&mut registry)
        .expect("built-in operator registration is internally consistent");
    Arc::new(registry)
});

/// The shared registry of built-in functions
pub fn default_function_registry() -> Arc<FunctionRegistry> {
    Arc::clone(&DEFAULT_FUNCTIONS)
}

/// The shared registry of built-in operators
pub fn default_operator_registry() -> Arc<OperatorRegistry> {
    Arc::clone(&DEFAULT_OPERATORS)
}
