//! Built-in function catalog
//!
//! One module per family, in the registry's house style: a `register`
//! function wiring signatures to evaluator callbacks. Shared singleton
//! helpers live here.

mod collection;
mod conversion;
mod datetime;
mod existence;
mod math;
mod string;
mod utility;

pub(crate) use utility::{cast_value, matches_type};

use super::{FunctionArg, FunctionRegistry, RegistryError};
use crate::ast::Expression;
use crate::evaluator::{EvalResult, EvaluationError};
use crate::model::{Collection, FhirPathValue};

/// Register every built-in function
pub fn register_builtin_functions(registry: &mut FunctionRegistry) -> Result<(), RegistryError> {
    collection::register(registry)?;
    existence::register(registry)?;
    string::register(registry)?;
    math::register(registry)?;
    conversion::register(registry)?;
    datetime::register(registry)?;
    utility::register(registry)?;
    Ok(())
}

/// The evaluated collection of a value argument, `None` when the optional
/// argument was omitted
pub(crate) fn value_arg<'a>(args: &'a [FunctionArg<'_>], index: usize) -> Option<&'a Collection> {
    args.get(index).and_then(FunctionArg::as_value)
}

/// The AST of an expression argument, `None` when omitted
pub(crate) fn expr_arg<'a>(args: &'a [FunctionArg<'a>], index: usize) -> Option<&'a Expression> {
    args.get(index).and_then(FunctionArg::as_expression)
}

/// Singleton string; errors on non-string or multiple items, `None` on empty
pub(crate) fn singleton_string(
    collection: &Collection,
    what: &str,
) -> EvalResult<Option<String>> {
    match collection.len() {
        0 => Ok(None),
        1 => match collection.first() {
            Some(FhirPathValue::String(s)) => Ok(Some(s.clone())),
            Some(other) => Err(EvaluationError::new(format!(
                "{what} expects a String, found {}",
                other.type_name()
            ))),
            None => Ok(None),
        },
        _ => Err(EvaluationError::multiple_items(what)),
    }
}

/// Singleton integer; errors on non-integer or multiple items, `None` on
/// empty
pub(crate) fn singleton_integer(collection: &Collection, what: &str) -> EvalResult<Option<i64>> {
    match collection.len() {
        0 => Ok(None),
        1 => match collection.first() {
            Some(FhirPathValue::Integer(i)) => Ok(Some(*i)),
            Some(other) => Err(EvaluationError::new(format!(
                "{what} expects an Integer, found {}",
                other.type_name()
            ))),
            None => Ok(None),
        },
        _ => Err(EvaluationError::multiple_items(what)),
    }
}

/// Singleton of any type; errors on multiple items
pub(crate) fn singleton_value<'a>(
    collection: &'a Collection,
    what: &str,
) -> EvalResult<Option<&'a FhirPathValue>> {
    match collection.len() {
        0 => Ok(None),
        1 => Ok(collection.first()),
        _ => Err(EvaluationError::multiple_items(what)),
    }
}
