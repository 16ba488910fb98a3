//! String manipulation functions
//!
//! All functions here require a singleton String focus, propagate empty and
//! use character (not byte) indices.

use super::super::{
    FunctionArg, FunctionContext, FunctionOutput, FunctionRegistry, FunctionSignature,
    ParameterInfo, RegistryError, SignatureType,
};
use super::{singleton_integer, singleton_string, value_arg};
use crate::evaluator::{EvalResult, EvaluationError};
use crate::model::{Collection, FhirPathValue, TypeInfo, TypeKind};
use regex::Regex;

fn string_signature(name: &'static str, result: TypeKind) -> FunctionSignature {
    FunctionSignature::new(name)
        .input(TypeInfo::singleton(TypeKind::String))
        .returns(SignatureType::fixed(result))
        .propagates_empty()
}

fn with_string_param(signature: FunctionSignature, name: &'static str) -> FunctionSignature {
    signature.parameter(ParameterInfo::value(
        name,
        TypeInfo::singleton(TypeKind::String),
    ))
}

pub(super) fn register(registry: &mut FunctionRegistry) -> Result<(), RegistryError> {
    registry.register(string_signature("length", TypeKind::Integer), |ctx, _| {
        transform(ctx, |s| {
            Some(FhirPathValue::Integer(s.chars().count() as i64))
        })
    })?;
    registry.register(string_signature("upper", TypeKind::String), |ctx, _| {
        transform(ctx, |s| Some(FhirPathValue::String(s.to_uppercase())))
    })?;
    registry.register(string_signature("lower", TypeKind::String), |ctx, _| {
        transform(ctx, |s| Some(FhirPathValue::String(s.to_lowercase())))
    })?;
    registry.register(string_signature("trim", TypeKind::String), |ctx, _| {
        transform(ctx, |s| Some(FhirPathValue::String(s.trim().to_string())))
    })?;
    registry.register(string_signature("toChars", TypeKind::String), |ctx, _| {
        let Some(s) = singleton_string(ctx.input, "toChars")? else {
            return Ok(FunctionOutput::of(Collection::empty()));
        };
        Ok(FunctionOutput::of(Collection::from_vec(
            s.chars()
                .map(|c| FhirPathValue::String(c.to_string()))
                .collect(),
        )))
    })?;
    registry.register(
        with_string_param(string_signature("indexOf", TypeKind::Integer), "substring"),
        eval_index_of,
    )?;
    registry.register(
        string_signature("substring", TypeKind::String)
            .parameter(ParameterInfo::value(
                "start",
                TypeInfo::singleton(TypeKind::Integer),
            ))
            .parameter(ParameterInfo::optional_value(
                "length",
                TypeInfo::singleton(TypeKind::Integer),
            )),
        eval_substring,
    )?;
    registry.register(
        with_string_param(string_signature("startsWith", TypeKind::Boolean), "prefix"),
        |ctx, args| binary_string(ctx, args, "startsWith", |s, p| s.starts_with(p)),
    )?;
    registry.register(
        with_string_param(string_signature("endsWith", TypeKind::Boolean), "suffix"),
        |ctx, args| binary_string(ctx, args, "endsWith", |s, p| s.ends_with(p)),
    )?;
    registry.register(
        with_string_param(string_signature("contains", TypeKind::Boolean), "substring"),
        |ctx, args| binary_string(ctx, args, "contains", |s, p| s.contains(p)),
    )?;
    registry.register(
        with_string_param(string_signature("matches", TypeKind::Boolean), "regex"),
        eval_matches,
    )?;
    registry.register(
        with_string_param(
            with_string_param(string_signature("replace", TypeKind::String), "pattern"),
            "substitution",
        ),
        eval_replace,
    )?;
    registry.register(
        with_string_param(
            with_string_param(
                string_signature("replaceMatches", TypeKind::String),
                "regex",
            ),
            "substitution",
        ),
        eval_replace_matches,
    )?;
    registry.register(
        with_string_param(string_signature("split", TypeKind::String), "separator"),
        eval_split,
    )?;
    registry.register(
        FunctionSignature::new("join")
            .parameter(ParameterInfo::optional_value(
                "separator",
                TypeInfo::singleton(TypeKind::String),
            ))
            .returns(SignatureType::fixed(TypeKind::String))
            .propagates_empty(),
        eval_join,
    )?;
    Ok(())
}

fn transform(
    ctx: &FunctionContext<'_>,
    f: impl Fn(&str) -> Option<FhirPathValue>,
) -> EvalResult<FunctionOutput> {
    let Some(s) = singleton_string(ctx.input, "string function")? else {
        return Ok(FunctionOutput::of(Collection::empty()));
    };
    Ok(FunctionOutput::of(match f(&s) {
        Some(v) => Collection::singleton(v),
        None => Collection::empty(),
    }))
}

/// Input string plus one required string argument; empty argument
/// propagates to empty output
fn binary_string(
    ctx: &FunctionContext<'_>,
    args: &[FunctionArg<'_>],
    name: &str,
    f: impl Fn(&str, &str) -> bool,
) -> EvalResult<FunctionOutput> {
    let Some(s) = singleton_string(ctx.input, name)? else {
        return Ok(FunctionOutput::of(Collection::empty()));
    };
    let Some(arg) = value_arg(args, 0)
        .map(|c| singleton_string(c, name))
        .transpose()?
        .flatten()
    else {
        return Ok(FunctionOutput::of(Collection::empty()));
    };
    Ok(FunctionOutput::of(Collection::singleton(
        FhirPathValue::Boolean(f(&s, &arg)),
    )))
}

fn eval_index_of(
    ctx: &FunctionContext<'_>,
    args: &[FunctionArg<'_>],
) -> EvalResult<FunctionOutput> {
    let Some(s) = singleton_string(ctx.input, "indexOf")? else {
        return Ok(FunctionOutput::of(Collection::empty()));
    };
    let Some(needle) = value_arg(args, 0)
        .map(|c| singleton_string(c, "indexOf"))
        .transpose()?
        .flatten()
    else {
        return Ok(FunctionOutput::of(Collection::empty()));
    };
    let index = match s.find(&needle) {
        Some(byte_pos) => s[..byte_pos].chars().count() as i64,
        None => -1,
    };
    Ok(FunctionOutput::of(Collection::singleton(
        FhirPathValue::Integer(index),
    )))
}

fn eval_substring(
    ctx: &FunctionContext<'_>,
    args: &[FunctionArg<'_>],
) -> EvalResult<FunctionOutput> {
    let Some(s) = singleton_string(ctx.input, "substring")? else {
        return Ok(FunctionOutput::of(Collection::empty()));
    };
    let Some(start) = value_arg(args, 0)
        .map(|c| singleton_integer(c, "substring"))
        .transpose()?
        .flatten()
    else {
        return Ok(FunctionOutput::of(Collection::empty()));
    };
    let chars: Vec<char> = s.chars().collect();
    if start < 0 || start as usize >= chars.len() {
        return Ok(FunctionOutput::of(Collection::empty()));
    }
    let start = start as usize;
    let length = match value_arg(args, 1) {
        Some(c) => match singleton_integer(c, "substring")? {
            Some(l) if l <= 0 => return Ok(FunctionOutput::of(Collection::empty())),
            Some(l) => l as usize,
            None => return Ok(FunctionOutput::of(Collection::empty())),
        },
        None => chars.len() - start,
    };
    let sub: String = chars[start..(start + length).min(chars.len())].iter().collect();
    Ok(FunctionOutput::of(Collection::singleton(
        FhirPathValue::String(sub),
    )))
}

fn compile_regex(pattern: &str) -> EvalResult<Regex> {
    Regex::new(pattern)
        .map_err(|e| EvaluationError::new(format!("invalid regular expression: {e}")))
}

fn eval_matches(ctx: &FunctionContext<'_>, args: &[FunctionArg<'_>]) -> EvalResult<FunctionOutput> {
    let Some(s) = singleton_string(ctx.input, "matches")? else {
        return Ok(FunctionOutput::of(Collection::empty()));
    };
    let Some(pattern) = value_arg(args, 0)
        .map(|c| singleton_string(c, "matches"))
        .transpose()?
        .flatten()
    else {
        return Ok(FunctionOutput::of(Collection::empty()));
    };
    let regex = compile_regex(&pattern)?;
    Ok(FunctionOutput::of(Collection::singleton(
        FhirPathValue::Boolean(regex.is_match(&s)),
    )))
}

fn eval_replace(ctx: &FunctionContext<'_>, args: &[FunctionArg<'_>]) -> EvalResult<FunctionOutput> {
    let Some(s) = singleton_string(ctx.input, "replace")? else {
        return Ok(FunctionOutput::of(Collection::empty()));
    };
    let (Some(pattern), Some(substitution)) = (
        value_arg(args, 0)
            .map(|c| singleton_string(c, "replace"))
            .transpose()?
            .flatten(),
        value_arg(args, 1)
            .map(|c| singleton_string(c, "replace"))
            .transpose()?
            .flatten(),
    ) else {
        return Ok(FunctionOutput::of(Collection::empty()));
    };
    Ok(FunctionOutput::of(Collection::singleton(
        FhirPathValue::String(s.replace(&pattern, &substitution)),
    )))
}

fn eval_replace_matches(
    ctx: &FunctionContext<'_>,
    args: &[FunctionArg<'_>],
) -> EvalResult<FunctionOutput> {
    let Some(s) = singleton_string(ctx.input, "replaceMatches")? else {
        return Ok(FunctionOutput::of(Collection::empty()));
    };
    let (Some(pattern), Some(substitution)) = (
        value_arg(args, 0)
            .map(|c| singleton_string(c, "replaceMatches"))
            .transpose()?
            .flatten(),
        value_arg(args, 1)
            .map(|c| singleton_string(c, "replaceMatches"))
            .transpose()?
            .flatten(),
    ) else {
        return Ok(FunctionOutput::of(Collection::empty()));
    };
    let regex = compile_regex(&pattern)?;
    Ok(FunctionOutput::of(Collection::singleton(
        FhirPathValue::String(regex.replace_all(&s, substitution.as_str()).into_owned()),
    )))
}

fn eval_split(ctx: &FunctionContext<'_>, args: &[FunctionArg<'_>]) -> EvalResult<FunctionOutput> {
    let Some(s) = singleton_string(ctx.input, "split")? else {
        return Ok(FunctionOutput::of(Collection::empty()));
    };
    let Some(separator) = value_arg(args, 0)
        .map(|c| singleton_string(c, "split"))
        .transpose()?
        .flatten()
    else {
        return Ok(FunctionOutput::of(Collection::empty()));
    };
    let parts: Vec<FhirPathValue> = if separator.is_empty() {
        s.chars().map(|c| FhirPathValue::String(c.to_string())).collect()
    } else {
        s.split(separator.as_str())
            .map(|part| FhirPathValue::String(part.to_string()))
            .collect()
    };
    Ok(FunctionOutput::of(Collection::from_vec(parts)))
}

/// Joins a collection of strings; non-string primitives are stringified
fn eval_join(ctx: &FunctionContext<'_>, args: &[FunctionArg<'_>]) -> EvalResult<FunctionOutput> {
    let separator = value_arg(args, 0)
        .map(|c| singleton_string(c, "join"))
        .transpose()?
        .flatten()
        .unwrap_or_default();
    let parts: Vec<String> = ctx
        .input
        .iter()
        .map(|v| match v {
            FhirPathValue::Resource(_) => Err(EvaluationError::new(
                "join() expects a collection of primitive values",
            )),
            other => Ok(other.to_string()),
        })
        .collect::<EvalResult<_>>()?;
    Ok(FunctionOutput::of(Collection::singleton(
        FhirPathValue::String(parts.join(&separator)),
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluator::{Evaluated, EvaluationContext};
    use crate::registry::ExpressionEvaluator;

    struct NullEvaluator;
    impl ExpressionEvaluator for NullEvaluator {
        fn evaluate_expression(
            &self,
            _expr: &crate::ast::Expression,
            focus: &Collection,
            context: &EvaluationContext,
        ) -> EvalResult<Evaluated> {
            Ok(Evaluated::value(focus.share(), context.clone()))
        }
    }

    fn call(
        input: &str,
        f: fn(&FunctionContext<'_>, &[FunctionArg<'_>]) -> EvalResult<FunctionOutput>,
        args: &[FunctionArg<'_>],
    ) -> Collection {
        let input = Collection::singleton(FhirPathValue::String(input.to_string()));
        let context = EvaluationContext::new(input.share());
        let fctx = FunctionContext {
            evaluator: &NullEvaluator,
            context: &context,
            input: &input,
        };
        f(&fctx, args).unwrap().value
    }

    fn str_arg(s: &str) -> FunctionArg<'static> {
        FunctionArg::Value(Collection::singleton(FhirPathValue::String(s.to_string())))
    }

    fn int_arg(i: i64) -> FunctionArg<'static> {
        FunctionArg::Value(Collection::singleton(FhirPathValue::Integer(i)))
    }

    #[test]
    fn substring_with_char_indices() {
        let out = call("héllo", eval_substring, &[int_arg(1), int_arg(3)]);
        assert_eq!(out.first().unwrap().as_string(), Some("éll"));
        assert!(call("abc", eval_substring, &[int_arg(5)]).is_empty());
        assert!(call("abc", eval_substring, &[int_arg(-1)]).is_empty());
    }

    #[test]
    fn index_of_counts_characters() {
        let out = call("héllo", eval_index_of, &[str_arg("llo")]);
        assert_eq!(out.first().unwrap().as_integer(), Some(2));
        let missing = call("abc", eval_index_of, &[str_arg("z")]);
        assert_eq!(missing.first().unwrap().as_integer(), Some(-1));
    }

    #[test]
    fn matches_is_unanchored() {
        let out = call("hello world", eval_matches, &[str_arg("wor")]);
        assert_eq!(out.first().unwrap().as_boolean(), Some(true));
    }

    #[test]
    fn invalid_regex_is_an_error() {
        let input = Collection::singleton(FhirPathValue::String("x".into()));
        let context = EvaluationContext::new(input.share());
        let fctx = FunctionContext {
            evaluator: &NullEvaluator,
            context: &context,
            input: &input,
        };
        assert!(eval_matches(&fctx, &[str_arg("(")]).is_err());
    }

    #[test]
    fn replace_matches_supports_groups() {
        let out = call(
            "2023-05-01",
            eval_replace_matches,
            &[str_arg(r"(\d{4})-(\d{2})-(\d{2})"), str_arg("$3/$2/$1")],
        );
        assert_eq!(out.first().unwrap().as_string(), Some("01/05/2023"));
    }

    #[test]
    fn split_and_empty_separator() {
        let out = call("a,b,c", eval_split, &[str_arg(",")]);
        assert_eq!(out.len(), 3);
        let chars = call("ab", eval_split, &[str_arg("")]);
        assert_eq!(chars.len(), 2);
    }
}
