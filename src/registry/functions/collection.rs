//! Collection functions: filtering, projection, subsetting, set algebra,
//! structural navigation and aggregation
//!
//! The higher-order functions here own the iteration protocol: each element
//! is evaluated with `$this` bound to that element and `$index` to its
//! position, in a child context that is dropped when the call returns.

use super::super::{
    FunctionArg, FunctionContext, FunctionOutput, FunctionRegistry, FunctionSignature,
    ParameterInfo, RegistryError, SignatureType, TriState, boolean_of,
};
use super::{expr_arg, singleton_integer, value_arg};
use crate::evaluator::{EvalResult, EvaluationError};
use crate::model::{Collection, FhirPathValue, TypeInfo, TypeKind};

pub(super) fn register(registry: &mut FunctionRegistry) -> Result<(), RegistryError> {
    registry.register(
        FunctionSignature::new("where")
            .parameter(ParameterInfo::expression("criteria"))
            .returns(SignatureType::InputType)
            .propagates_empty(),
        eval_where,
    )?;
    registry.register(
        FunctionSignature::new("select")
            .parameter(ParameterInfo::expression("projection"))
            .propagates_empty(),
        eval_select,
    )?;
    registry.register(
        FunctionSignature::new("repeat")
            .parameter(ParameterInfo::expression("projection"))
            .propagates_empty(),
        eval_repeat,
    )?;
    registry.register(
        FunctionSignature::new("first")
            .returns(SignatureType::InputElementType)
            .propagates_empty(),
        |ctx, _| Ok(FunctionOutput::of(head(ctx.input, 0))),
    )?;
    registry.register(
        FunctionSignature::new("last")
            .returns(SignatureType::InputElementType)
            .propagates_empty(),
        |ctx, _| {
            Ok(FunctionOutput::of(match ctx.input.last() {
                Some(v) => Collection::singleton(v.clone()),
                None => Collection::empty(),
            }))
        },
    )?;
    registry.register(
        FunctionSignature::new("tail")
            .returns(SignatureType::InputType)
            .propagates_empty(),
        |ctx, _| {
            Ok(FunctionOutput::of(Collection::from_vec(
                ctx.input.iter().skip(1).cloned().collect(),
            )))
        },
    )?;
    registry.register(
        FunctionSignature::new("skip")
            .parameter(ParameterInfo::value(
                "num",
                TypeInfo::singleton(TypeKind::Integer),
            ))
            .returns(SignatureType::InputType)
            .propagates_empty(),
        eval_skip,
    )?;
    registry.register(
        FunctionSignature::new("take")
            .parameter(ParameterInfo::value(
                "num",
                TypeInfo::singleton(TypeKind::Integer),
            ))
            .returns(SignatureType::InputType)
            .propagates_empty(),
        eval_take,
    )?;
    registry.register(
        FunctionSignature::new("distinct")
            .returns(SignatureType::InputType)
            .propagates_empty(),
        |ctx, _| Ok(FunctionOutput::of(ctx.input.distinct())),
    )?;
    registry.register(
        FunctionSignature::new("single")
            .returns(SignatureType::InputElementType)
            .propagates_empty(),
        eval_single,
    )?;
    registry.register(
        FunctionSignature::new("empty").returns(SignatureType::fixed(TypeKind::Boolean)),
        |ctx, _| {
            Ok(FunctionOutput::of(Collection::singleton(
                FhirPathValue::Boolean(ctx.input.is_empty()),
            )))
        },
    )?;
    registry.register(
        FunctionSignature::new("exists")
            .parameter(ParameterInfo::optional_expression("criteria"))
            .returns(SignatureType::fixed(TypeKind::Boolean)),
        eval_exists,
    )?;
    registry.register(
        FunctionSignature::new("all")
            .parameter(ParameterInfo::expression("criteria"))
            .returns(SignatureType::fixed(TypeKind::Boolean)),
        eval_all,
    )?;
    registry.register(
        FunctionSignature::new("count").returns(SignatureType::fixed(TypeKind::Integer)),
        |ctx, _| {
            Ok(FunctionOutput::of(Collection::singleton(
                FhirPathValue::Integer(ctx.input.len() as i64),
            )))
        },
    )?;
    registry.register(
        FunctionSignature::new("combine")
            .parameter(ParameterInfo::value("other", TypeInfo::any()))
            .returns(SignatureType::InputType),
        eval_combine,
    )?;
    registry.register(
        FunctionSignature::new("union")
            .parameter(ParameterInfo::value("other", TypeInfo::any()))
            .returns(SignatureType::InputType),
        eval_union,
    )?;
    registry.register(
        FunctionSignature::new("intersect")
            .parameter(ParameterInfo::value("other", TypeInfo::any()))
            .returns(SignatureType::InputType),
        eval_intersect,
    )?;
    registry.register(
        FunctionSignature::new("exclude")
            .parameter(ParameterInfo::value("other", TypeInfo::any()))
            .returns(SignatureType::InputType),
        eval_exclude,
    )?;
    registry.register(
        FunctionSignature::new("subsetOf")
            .parameter(ParameterInfo::value("other", TypeInfo::any()))
            .returns(SignatureType::fixed(TypeKind::Boolean)),
        eval_subset_of,
    )?;
    registry.register(
        FunctionSignature::new("supersetOf")
            .parameter(ParameterInfo::value("other", TypeInfo::any()))
            .returns(SignatureType::fixed(TypeKind::Boolean)),
        eval_superset_of,
    )?;
    registry.register(
        FunctionSignature::new("children").propagates_empty(),
        |ctx, _| {
            let mut out = Vec::new();
            for item in ctx.input.iter() {
                out.extend(item.children());
            }
            Ok(FunctionOutput::of(Collection::from_vec(out)))
        },
    )?;
    registry.register(
        FunctionSignature::new("descendants").propagates_empty(),
        eval_descendants,
    )?;
    registry.register(
        FunctionSignature::new("aggregate")
            .parameter(ParameterInfo::expression("aggregator"))
            .parameter(ParameterInfo::optional_value("init", TypeInfo::any())),
        eval_aggregate,
    )?;
    Ok(())
}

fn head(input: &Collection, index: usize) -> Collection {
    match input.get(index) {
        Some(v) => Collection::singleton(v.clone()),
        None => Collection::empty(),
    }
}

fn criteria_arg<'a>(
    args: &'a [FunctionArg<'a>],
    name: &str,
) -> EvalResult<&'a crate::ast::Expression> {
    expr_arg(args, 0)
        .ok_or_else(|| EvaluationError::new(format!("{name} requires an expression argument")))
}

fn eval_where(ctx: &FunctionContext<'_>, args: &[FunctionArg<'_>]) -> EvalResult<FunctionOutput> {
    let criteria = criteria_arg(args, "where")?;
    let mut out = Vec::new();
    for (i, item) in ctx.input.iter().enumerate() {
        let focus = Collection::singleton(item.clone());
        let child = ctx.context.with_iteration(focus.share(), i as i64);
        let verdict = boolean_of(&ctx.eval(criteria, &focus, &child)?)?;
        if verdict == TriState::True {
            out.push(item.clone());
        }
    }
    Ok(FunctionOutput::of(Collection::from_vec(out)))
}

fn eval_select(ctx: &FunctionContext<'_>, args: &[FunctionArg<'_>]) -> EvalResult<FunctionOutput> {
    let projection = criteria_arg(args, "select")?;
    let mut out = Vec::new();
    for (i, item) in ctx.input.iter().enumerate() {
        let focus = Collection::singleton(item.clone());
        let child = ctx.context.with_iteration(focus.share(), i as i64);
        out.extend(ctx.eval(projection, &focus, &child)?.iter().cloned());
    }
    Ok(FunctionOutput::of(Collection::from_vec(out)))
}

/// Transitive closure of the projection, breadth-first, de-duplicated
fn eval_repeat(ctx: &FunctionContext<'_>, args: &[FunctionArg<'_>]) -> EvalResult<FunctionOutput> {
    let projection = criteria_arg(args, "repeat")?;
    let mut result: Vec<FhirPathValue> = Vec::new();
    let mut frontier: Vec<FhirPathValue> = ctx.input.to_vec();

    while !frontier.is_empty() {
        let mut next = Vec::new();
        for (i, item) in frontier.iter().enumerate() {
            let focus = Collection::singleton(item.clone());
            let child = ctx.context.with_iteration(focus.share(), i as i64);
            for produced in ctx.eval(projection, &focus, &child)?.iter() {
                if !result.iter().any(|seen| seen == produced) {
                    result.push(produced.clone());
                    next.push(produced.clone());
                }
            }
        }
        frontier = next;
    }
    Ok(FunctionOutput::of(Collection::from_vec(result)))
}

fn eval_skip(ctx: &FunctionContext<'_>, args: &[FunctionArg<'_>]) -> EvalResult<FunctionOutput> {
    let num = value_arg(args, 0)
        .map(|c| singleton_integer(c, "skip"))
        .transpose()?
        .flatten()
        .unwrap_or(0);
    let skip = num.max(0) as usize;
    Ok(FunctionOutput::of(Collection::from_vec(
        ctx.input.iter().skip(skip).cloned().collect(),
    )))
}

fn eval_take(ctx: &FunctionContext<'_>, args: &[FunctionArg<'_>]) -> EvalResult<FunctionOutput> {
    let num = value_arg(args, 0)
        .map(|c| singleton_integer(c, "take"))
        .transpose()?
        .flatten()
        .unwrap_or(0);
    if num <= 0 {
        return Ok(FunctionOutput::of(Collection::empty()));
    }
    Ok(FunctionOutput::of(Collection::from_vec(
        ctx.input.iter().take(num as usize).cloned().collect(),
    )))
}

fn eval_single(ctx: &FunctionContext<'_>, _args: &[FunctionArg<'_>]) -> EvalResult<FunctionOutput> {
    match ctx.input.len() {
        0 => Ok(FunctionOutput::of(Collection::empty())),
        1 => Ok(FunctionOutput::of(ctx.input.share())),
        _ => Err(EvaluationError::multiple_items("single()")),
    }
}

fn eval_exists(ctx: &FunctionContext<'_>, args: &[FunctionArg<'_>]) -> EvalResult<FunctionOutput> {
    let found = match expr_arg(args, 0) {
        None => !ctx.input.is_empty(),
        Some(criteria) => {
            let mut any = false;
            for (i, item) in ctx.input.iter().enumerate() {
                let focus = Collection::singleton(item.clone());
                let child = ctx.context.with_iteration(focus.share(), i as i64);
                if boolean_of(&ctx.eval(criteria, &focus, &child)?)? == TriState::True {
                    any = true;
                    break;
                }
            }
            any
        }
    };
    Ok(FunctionOutput::of(Collection::singleton(
        FhirPathValue::Boolean(found),
    )))
}

fn eval_all(ctx: &FunctionContext<'_>, args: &[FunctionArg<'_>]) -> EvalResult<FunctionOutput> {
    let criteria = criteria_arg(args, "all")?;
    let mut holds = true;
    for (i, item) in ctx.input.iter().enumerate() {
        let focus = Collection::singleton(item.clone());
        let child = ctx.context.with_iteration(focus.share(), i as i64);
        if boolean_of(&ctx.eval(criteria, &focus, &child)?)? != TriState::True {
            holds = false;
            break;
        }
    }
    Ok(FunctionOutput::of(Collection::singleton(
        FhirPathValue::Boolean(holds),
    )))
}

fn other_arg<'a>(args: &'a [FunctionArg<'_>], name: &str) -> EvalResult<&'a Collection> {
    value_arg(args, 0)
        .ok_or_else(|| EvaluationError::new(format!("{name} requires a collection argument")))
}

fn eval_combine(ctx: &FunctionContext<'_>, args: &[FunctionArg<'_>]) -> EvalResult<FunctionOutput> {
    let other = other_arg(args, "combine")?;
    Ok(FunctionOutput::of(ctx.input.concat(other)))
}

fn eval_union(ctx: &FunctionContext<'_>, args: &[FunctionArg<'_>]) -> EvalResult<FunctionOutput> {
    let other = other_arg(args, "union")?;
    Ok(FunctionOutput::of(ctx.input.union(other)))
}

fn eval_intersect(
    ctx: &FunctionContext<'_>,
    args: &[FunctionArg<'_>],
) -> EvalResult<FunctionOutput> {
    let other = other_arg(args, "intersect")?;
    let mut out: Vec<FhirPathValue> = Vec::new();
    for item in ctx.input.iter() {
        if other.contains_value(item) && !out.iter().any(|seen| seen == item) {
            out.push(item.clone());
        }
    }
    Ok(FunctionOutput::of(Collection::from_vec(out)))
}

fn eval_exclude(ctx: &FunctionContext<'_>, args: &[FunctionArg<'_>]) -> EvalResult<FunctionOutput> {
    let other = other_arg(args, "exclude")?;
    Ok(FunctionOutput::of(Collection::from_vec(
        ctx.input
            .iter()
            .filter(|item| !other.contains_value(item))
            .cloned()
            .collect(),
    )))
}

fn eval_subset_of(
    ctx: &FunctionContext<'_>,
    args: &[FunctionArg<'_>],
) -> EvalResult<FunctionOutput> {
    let other = other_arg(args, "subsetOf")?;
    let holds = ctx.input.iter().all(|item| other.contains_value(item));
    Ok(FunctionOutput::of(Collection::singleton(
        FhirPathValue::Boolean(holds),
    )))
}

fn eval_superset_of(
    ctx: &FunctionContext<'_>,
    args: &[FunctionArg<'_>],
) -> EvalResult<FunctionOutput> {
    let other = other_arg(args, "supersetOf")?;
    let holds = other.iter().all(|item| ctx.input.contains_value(item));
    Ok(FunctionOutput::of(Collection::singleton(
        FhirPathValue::Boolean(holds),
    )))
}

fn eval_descendants(
    ctx: &FunctionContext<'_>,
    _args: &[FunctionArg<'_>],
) -> EvalResult<FunctionOutput> {
    let mut out = Vec::new();
    let mut frontier: Vec<FhirPathValue> = ctx.input.to_vec();
    while let Some(item) = frontier.pop() {
        for child in item.children() {
            frontier.push(child.clone());
            out.push(child);
        }
    }
    Ok(FunctionOutput::of(Collection::from_vec(out)))
}

/// Fold over the focus with `$total` as the accumulator and `$this`/`$index`
/// bound per element
fn eval_aggregate(
    ctx: &FunctionContext<'_>,
    args: &[FunctionArg<'_>],
) -> EvalResult<FunctionOutput> {
    let aggregator = criteria_arg(args, "aggregate")?;
    let mut total = match value_arg(args, 1) {
        Some(init) => init.share(),
        None => Collection::empty(),
    };
    for (i, item) in ctx.input.iter().enumerate() {
        let focus = Collection::singleton(item.clone());
        let child = ctx
            .context
            .with_iteration(focus.share(), i as i64)
            .with_total(total.share());
        total = ctx.eval(aggregator, &focus, &child)?;
    }
    Ok(FunctionOutput::of(total))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluator::{Evaluated, EvaluationContext};
    use crate::registry::ExpressionEvaluator;

    /// Evaluator stub that only resolves `$this`
    struct ThisEvaluator;

    impl ExpressionEvaluator for ThisEvaluator {
        fn evaluate_expression(
            &self,
            _expr: &crate::ast::Expression,
            focus: &Collection,
            context: &EvaluationContext,
        ) -> EvalResult<Evaluated> {
            Ok(Evaluated::value(context.this_or(focus), context.clone()))
        }
    }

    fn ints(values: &[i64]) -> Collection {
        Collection::from_vec(values.iter().map(|v| FhirPathValue::Integer(*v)).collect())
    }

    #[test]
    fn exists_without_criteria_tests_emptiness() {
        let input = ints(&[1]);
        let context = EvaluationContext::new(input.share());
        let fctx = FunctionContext {
            evaluator: &ThisEvaluator,
            context: &context,
            input: &input,
        };
        let out = eval_exists(&fctx, &[]).unwrap();
        assert_eq!(out.value.first().unwrap().as_boolean(), Some(true));
    }

    #[test]
    fn single_errors_on_multiple() {
        let input = ints(&[1, 2]);
        let context = EvaluationContext::new(input.share());
        let fctx = FunctionContext {
            evaluator: &ThisEvaluator,
            context: &context,
            input: &input,
        };
        assert!(eval_single(&fctx, &[]).is_err());
    }

    #[test]
    fn set_algebra() {
        let input = ints(&[1, 2, 2, 3]);
        let context = EvaluationContext::new(input.share());
        let fctx = FunctionContext {
            evaluator: &ThisEvaluator,
            context: &context,
            input: &input,
        };
        let other = [FunctionArg::Value(ints(&[2, 4]))];
        assert_eq!(eval_intersect(&fctx, &other).unwrap().value, ints(&[2]));
        assert_eq!(eval_exclude(&fctx, &other).unwrap().value, ints(&[1, 3]));
        let superset = [FunctionArg::Value(ints(&[2]))];
        assert_eq!(
            eval_superset_of(&fctx, &superset)
                .unwrap()
                .value
                .first()
                .unwrap()
                .as_boolean(),
            Some(true)
        );
    }
}
