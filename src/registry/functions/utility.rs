//! Utility functions: tracing, conditionals, variable definition, type
//! operations and FHIR-specific helpers
//!
//! `iif` and `defineVariable` are the control-flow built-ins: the former
//! evaluates only the selected branch, the latter returns its input with an
//! extended context so `%`-bindings flow down the dot chain. `resolve`,
//! `memberOf`, `subsumes` and `subsumedBy` are registered with their real
//! signatures but evaluate to empty: reference resolution and terminology
//! are external services this engine does not embed.

use super::super::{
    FunctionArg, FunctionContext, FunctionOutput, FunctionRegistry, FunctionSignature,
    ParameterInfo, RegistryError, SignatureType, TriState, boolean_of,
};
use super::{expr_arg, singleton_string, singleton_value, value_arg};
use crate::ast::{BinaryOperator, Expression, ExpressionNode};
use crate::evaluator::{EvalResult, EvaluationError};
use crate::model::{Collection, FhirPathValue, TypeInfo, TypeKind, append_json};
use rust_decimal::Decimal;

pub(super) fn register(registry: &mut FunctionRegistry) -> Result<(), RegistryError> {
    registry.register(
        FunctionSignature::new("trace")
            .parameter(ParameterInfo::value(
                "name",
                TypeInfo::singleton(TypeKind::String),
            ))
            .parameter(ParameterInfo::optional_expression("projection"))
            .returns(SignatureType::InputType),
        eval_trace,
    )?;
    registry.register(
        FunctionSignature::new("iif")
            .parameter(ParameterInfo::expression("criterion"))
            .parameter(ParameterInfo::expression("true-result"))
            .parameter(ParameterInfo::optional_expression("otherwise-result")),
        eval_iif,
    )?;
    registry.register(
        FunctionSignature::new("defineVariable")
            .parameter(ParameterInfo::value(
                "name",
                TypeInfo::singleton(TypeKind::String),
            ))
            .parameter(ParameterInfo::optional_expression("value"))
            .returns(SignatureType::InputType),
        eval_define_variable,
    )?;
    registry.register(
        FunctionSignature::new("not").returns(SignatureType::fixed(TypeKind::Boolean)),
        |ctx, _| Ok(FunctionOutput::of(boolean_of(ctx.input)?.not().to_collection())),
    )?;
    registry.register(
        FunctionSignature::new("type").propagates_empty(),
        eval_type,
    )?;
    registry.register(
        FunctionSignature::new("is")
            .parameter(ParameterInfo::expression("type"))
            .returns(SignatureType::fixed(TypeKind::Boolean)),
        eval_is,
    )?;
    registry.register(
        FunctionSignature::new("as")
            .parameter(ParameterInfo::expression("type"))
            .returns(SignatureType::InputType),
        eval_as,
    )?;
    registry.register(
        FunctionSignature::new("ofType")
            .parameter(ParameterInfo::expression("type"))
            .returns(SignatureType::InputType)
            .propagates_empty(),
        eval_of_type,
    )?;
    registry.register(
        FunctionSignature::new("extension")
            .parameter(ParameterInfo::value(
                "url",
                TypeInfo::singleton(TypeKind::String),
            ))
            .propagates_empty(),
        eval_extension,
    )?;
    registry.register(
        FunctionSignature::new("hasValue").returns(SignatureType::fixed(TypeKind::Boolean)),
        eval_has_value,
    )?;
    registry.register(
        FunctionSignature::new("getValue")
            .returns(SignatureType::InputElementType)
            .propagates_empty(),
        eval_get_value,
    )?;
    registry.register(FunctionSignature::new("resolve").propagates_empty(), |_, _| {
        Ok(FunctionOutput::of(Collection::empty()))
    })?;
    registry.register(
        FunctionSignature::new("memberOf")
            .parameter(ParameterInfo::value(
                "valueset",
                TypeInfo::singleton(TypeKind::String),
            ))
            .returns(SignatureType::fixed(TypeKind::Boolean))
            .propagates_empty(),
        |_, _| Ok(FunctionOutput::of(Collection::empty())),
    )?;
    registry.register(
        FunctionSignature::new("subsumes")
            .parameter(ParameterInfo::value("code", TypeInfo::any()))
            .returns(SignatureType::fixed(TypeKind::Boolean))
            .propagates_empty(),
        |_, _| Ok(FunctionOutput::of(Collection::empty())),
    )?;
    registry.register(
        FunctionSignature::new("subsumedBy")
            .parameter(ParameterInfo::value("code", TypeInfo::any()))
            .returns(SignatureType::fixed(TypeKind::Boolean))
            .propagates_empty(),
        |_, _| Ok(FunctionOutput::of(Collection::empty())),
    )?;
    Ok(())
}

fn eval_trace(ctx: &FunctionContext<'_>, args: &[FunctionArg<'_>]) -> EvalResult<FunctionOutput> {
    let name = value_arg(args, 0)
        .map(|c| singleton_string(c, "trace"))
        .transpose()?
        .flatten()
        .unwrap_or_else(|| "trace".to_string());
    let logged = match expr_arg(args, 1) {
        Some(projection) => ctx.eval(projection, ctx.input, ctx.context)?,
        None => ctx.input.share(),
    };
    log::info!(target: "fhirpath::trace", "{name}: {logged}");
    Ok(FunctionOutput::of(ctx.input.share()))
}

/// Only the selected branch is evaluated
fn eval_iif(ctx: &FunctionContext<'_>, args: &[FunctionArg<'_>]) -> EvalResult<FunctionOutput> {
    let criterion = expr_arg(args, 0)
        .ok_or_else(|| EvaluationError::new("iif requires a criterion expression"))?;
    let verdict = boolean_of(&ctx.eval(criterion, ctx.input, ctx.context)?)?;
    let branch = match verdict {
        TriState::True => expr_arg(args, 1),
        _ => expr_arg(args, 2),
    };
    Ok(FunctionOutput::of(match branch {
        Some(expr) => ctx.eval(expr, ctx.input, ctx.context)?,
        None => Collection::empty(),
    }))
}

/// Environment names the engine itself binds
const PROTECTED_VARIABLES: &[&str] = &["context", "resource", "rootResource", "ucum", "sct", "loinc"];

fn eval_define_variable(
    ctx: &FunctionContext<'_>,
    args: &[FunctionArg<'_>],
) -> EvalResult<FunctionOutput> {
    let name = value_arg(args, 0)
        .map(|c| singleton_string(c, "defineVariable"))
        .transpose()?
        .flatten()
        .ok_or_else(|| EvaluationError::new("defineVariable requires a variable name"))?;
    if PROTECTED_VARIABLES.contains(&name.as_str()) {
        return Err(EvaluationError::new(format!(
            "cannot redefine environment variable %{name}"
        )));
    }
    let value = match expr_arg(args, 1) {
        Some(expr) => ctx.eval(expr, ctx.input, ctx.context)?,
        None => ctx.input.share(),
    };
    Ok(FunctionOutput::with_context(
        ctx.input.share(),
        ctx.context.define_variable(name, value),
    ))
}

fn eval_type(ctx: &FunctionContext<'_>, _args: &[FunctionArg<'_>]) -> EvalResult<FunctionOutput> {
    let out = ctx
        .input
        .iter()
        .map(|v| {
            let (namespace, name) = match v {
                FhirPathValue::Resource(_) => ("FHIR", v.type_name()),
                _ => ("System", v.type_name()),
            };
            FhirPathValue::TypeInfoObject {
                namespace: namespace.to_string(),
                name: name.to_string(),
            }
        })
        .collect();
    Ok(FunctionOutput::of(out))
}

/// The type name carried by an `is`/`as`/`ofType` argument
fn type_argument(args: &[FunctionArg<'_>], name: &str) -> EvalResult<String> {
    let expr = expr_arg(args, 0)
        .ok_or_else(|| EvaluationError::new(format!("{name} requires a type name")))?;
    dotted_name(expr)
        .ok_or_else(|| EvaluationError::new(format!("{name} requires a type name argument")))
}

fn dotted_name(expr: &Expression) -> Option<String> {
    match &expr.node {
        ExpressionNode::TypeReference(n) => Some(n.clone()),
        ExpressionNode::Identifier(n) | ExpressionNode::TypeOrIdentifier(n) => Some(n.clone()),
        ExpressionNode::Binary(data) if data.op == BinaryOperator::Navigation => {
            let left = dotted_name(&data.left)?;
            let right = data.right.as_identifier()?;
            Some(format!("{left}.{right}"))
        }
        _ => None,
    }
}

/// Runtime type test against a (possibly qualified) type name.
///
/// FHIR primitive names (`code`, `dateTime`, ...) match the System kind
/// their JSON representation carries.
pub(crate) fn matches_type(value: &FhirPathValue, name: &str) -> bool {
    let bare = name
        .strip_prefix("System.")
        .or_else(|| name.strip_prefix("FHIR."))
        .unwrap_or(name);
    if bare == "Any" {
        return true;
    }
    match value {
        FhirPathValue::Resource(_) => value.type_name() == bare,
        _ => {
            let system = value.type_name();
            system.eq_ignore_ascii_case(bare) || fhir_primitive_alias(bare) == Some(system)
        }
    }
}

fn fhir_primitive_alias(name: &str) -> Option<&'static str> {
    match name {
        "code" | "uri" | "url" | "canonical" | "id" | "oid" | "uuid" | "markdown"
        | "base64Binary" | "xhtml" => Some("String"),
        "positiveInt" | "unsignedInt" => Some("Integer"),
        "instant" => Some("DateTime"),
        _ => None,
    }
}

/// Cast a single value to the target type; numeric widening is the only
/// conversion attempted
pub(crate) fn cast_value(value: &FhirPathValue, name: &str) -> Option<FhirPathValue> {
    if matches_type(value, name) {
        return Some(value.clone());
    }
    let bare = name.strip_prefix("System.").unwrap_or(name);
    match (value, bare) {
        (FhirPathValue::Integer(i), "Decimal") => {
            Some(FhirPathValue::Decimal(Decimal::from(*i)))
        }
        _ => None,
    }
}

fn eval_is(ctx: &FunctionContext<'_>, args: &[FunctionArg<'_>]) -> EvalResult<FunctionOutput> {
    let name = type_argument(args, "is")?;
    if ctx.input.is_empty() {
        return Ok(FunctionOutput::of(Collection::empty()));
    }
    let holds = ctx.input.iter().all(|v| matches_type(v, &name));
    Ok(FunctionOutput::of(Collection::singleton(
        FhirPathValue::Boolean(holds),
    )))
}

fn eval_as(ctx: &FunctionContext<'_>, args: &[FunctionArg<'_>]) -> EvalResult<FunctionOutput> {
    let name = type_argument(args, "as")?;
    let out: Vec<FhirPathValue> = ctx
        .input
        .iter()
        .filter_map(|v| cast_value(v, &name))
        .collect();
    Ok(FunctionOutput::of(Collection::from_vec(out)))
}

fn eval_of_type(ctx: &FunctionContext<'_>, args: &[FunctionArg<'_>]) -> EvalResult<FunctionOutput> {
    let name = type_argument(args, "ofType")?;
    let out: Vec<FhirPathValue> = ctx
        .input
        .iter()
        .filter(|v| matches_type(v, &name))
        .cloned()
        .collect();
    Ok(FunctionOutput::of(Collection::from_vec(out)))
}

fn eval_extension(
    ctx: &FunctionContext<'_>,
    args: &[FunctionArg<'_>],
) -> EvalResult<FunctionOutput> {
    let Some(url) = value_arg(args, 0)
        .map(|c| singleton_string(c, "extension"))
        .transpose()?
        .flatten()
    else {
        return Ok(FunctionOutput::of(Collection::empty()));
    };
    let mut out = Vec::new();
    for item in ctx.input.iter() {
        let Some(extensions) = item.property("extension") else {
            continue;
        };
        let mut candidates = Vec::new();
        append_json(&mut candidates, extensions);
        for candidate in candidates {
            let matches = candidate
                .property("url")
                .and_then(|u| u.as_str())
                .is_some_and(|u| u == url);
            if matches {
                out.push(candidate);
            }
        }
    }
    Ok(FunctionOutput::of(Collection::from_vec(out)))
}

fn is_primitive(value: &FhirPathValue) -> bool {
    !matches!(
        value,
        FhirPathValue::Resource(_) | FhirPathValue::TypeInfoObject { .. }
    )
}

fn eval_has_value(
    ctx: &FunctionContext<'_>,
    _args: &[FunctionArg<'_>],
) -> EvalResult<FunctionOutput> {
    let holds = matches!(singleton_value(ctx.input, "hasValue")?, Some(v) if is_primitive(v));
    Ok(FunctionOutput::of(Collection::singleton(
        FhirPathValue::Boolean(holds),
    )))
}

fn eval_get_value(
    ctx: &FunctionContext<'_>,
    _args: &[FunctionArg<'_>],
) -> EvalResult<FunctionOutput> {
    Ok(FunctionOutput::of(
        match singleton_value(ctx.input, "getValue")? {
            Some(v) if is_primitive(v) => Collection::singleton(v.clone()),
            _ => Collection::empty(),
        },
    ))
}
