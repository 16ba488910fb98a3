//! Math functions over Integer, Decimal and Quantity singletons
//!
//! Transcendental functions go through `f64`; results that leave the real
//! domain (`sqrt(-1)`, `ln(0)`) are empty per FHIRPath semantics.

use super::super::{
    FunctionArg, FunctionContext, FunctionOutput, FunctionRegistry, FunctionSignature,
    ParameterInfo, RegistryError, SignatureType,
};
use super::{singleton_integer, singleton_value, value_arg};
use crate::evaluator::{EvalResult, EvaluationError};
use crate::model::{Collection, FhirPathValue, Quantity, TypeInfo, TypeKind};
use rust_decimal::Decimal;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};

fn math_signature(name: &'static str) -> FunctionSignature {
    FunctionSignature::new(name)
        .returns(SignatureType::InputType)
        .propagates_empty()
}

pub(super) fn register(registry: &mut FunctionRegistry) -> Result<(), RegistryError> {
    registry.register(math_signature("abs"), eval_abs)?;
    registry.register(
        math_signature("ceiling").returns(SignatureType::fixed(TypeKind::Integer)),
        |ctx, _| integer_map(ctx, "ceiling", |d| d.ceil()),
    )?;
    registry.register(
        math_signature("floor").returns(SignatureType::fixed(TypeKind::Integer)),
        |ctx, _| integer_map(ctx, "floor", |d| d.floor()),
    )?;
    registry.register(
        math_signature("truncate").returns(SignatureType::fixed(TypeKind::Integer)),
        |ctx, _| integer_map(ctx, "truncate", |d| d.trunc()),
    )?;
    registry.register(
        math_signature("round")
            .parameter(ParameterInfo::optional_value(
                "precision",
                TypeInfo::singleton(TypeKind::Integer),
            ))
            .returns(SignatureType::fixed(TypeKind::Decimal)),
        eval_round,
    )?;
    registry.register(
        math_signature("sqrt").returns(SignatureType::fixed(TypeKind::Decimal)),
        |ctx, _| float_map(ctx, "sqrt", f64::sqrt),
    )?;
    registry.register(
        math_signature("ln").returns(SignatureType::fixed(TypeKind::Decimal)),
        |ctx, _| float_map(ctx, "ln", f64::ln),
    )?;
    registry.register(
        math_signature("exp").returns(SignatureType::fixed(TypeKind::Decimal)),
        |ctx, _| float_map(ctx, "exp", f64::exp),
    )?;
    registry.register(
        math_signature("log")
            .parameter(ParameterInfo::value(
                "base",
                TypeInfo::singleton(TypeKind::Decimal),
            ))
            .returns(SignatureType::fixed(TypeKind::Decimal)),
        eval_log,
    )?;
    registry.register(
        math_signature("power").parameter(ParameterInfo::value(
            "exponent",
            TypeInfo::singleton(TypeKind::Decimal),
        )),
        eval_power,
    )?;
    Ok(())
}

fn numeric_input(ctx: &FunctionContext<'_>, what: &str) -> EvalResult<Option<Decimal>> {
    match singleton_value(ctx.input, what)? {
        None => Ok(None),
        Some(v) => match v.as_numeric() {
            Some(d) => Ok(Some(d)),
            None => Err(EvaluationError::new(format!(
                "{what} expects a numeric value, found {}",
                v.type_name()
            ))),
        },
    }
}

fn eval_abs(ctx: &FunctionContext<'_>, _args: &[FunctionArg<'_>]) -> EvalResult<FunctionOutput> {
    let value = match singleton_value(ctx.input, "abs")? {
        None => return Ok(FunctionOutput::of(Collection::empty())),
        Some(FhirPathValue::Integer(i)) => FhirPathValue::Integer(
            i.checked_abs()
                .ok_or_else(|| EvaluationError::new("arithmetic overflow in abs()"))?,
        ),
        Some(FhirPathValue::Decimal(d)) => FhirPathValue::Decimal(d.abs()),
        Some(FhirPathValue::Quantity(q)) => FhirPathValue::Quantity(Quantity {
            value: q.value.abs(),
            unit: q.unit.clone(),
        }),
        Some(other) => {
            return Err(EvaluationError::new(format!(
                "abs() expects a numeric value, found {}",
                other.type_name()
            )));
        }
    };
    Ok(FunctionOutput::of(Collection::singleton(value)))
}

fn integer_map(
    ctx: &FunctionContext<'_>,
    what: &str,
    f: impl Fn(Decimal) -> Decimal,
) -> EvalResult<FunctionOutput> {
    let Some(d) = numeric_input(ctx, what)? else {
        return Ok(FunctionOutput::of(Collection::empty()));
    };
    let mapped = f(d);
    Ok(FunctionOutput::of(
        mapped
            .to_i64()
            .map(FhirPathValue::Integer)
            .map(Collection::singleton)
            .unwrap_or_else(Collection::empty),
    ))
}

fn eval_round(ctx: &FunctionContext<'_>, args: &[FunctionArg<'_>]) -> EvalResult<FunctionOutput> {
    let Some(d) = numeric_input(ctx, "round")? else {
        return Ok(FunctionOutput::of(Collection::empty()));
    };
    let precision = value_arg(args, 0)
        .map(|c| singleton_integer(c, "round"))
        .transpose()?
        .flatten()
        .unwrap_or(0);
    if precision < 0 {
        return Err(EvaluationError::new("round() precision must be >= 0"));
    }
    let rounded = d.round_dp_with_strategy(
        precision as u32,
        rust_decimal::RoundingStrategy::MidpointAwayFromZero,
    );
    Ok(FunctionOutput::of(Collection::singleton(
        FhirPathValue::Decimal(rounded),
    )))
}

/// Map through `f64`; NaN/infinite results are empty
fn float_map(
    ctx: &FunctionContext<'_>,
    what: &str,
    f: impl Fn(f64) -> f64,
) -> EvalResult<FunctionOutput> {
    let Some(d) = numeric_input(ctx, what)? else {
        return Ok(FunctionOutput::of(Collection::empty()));
    };
    let Some(x) = d.to_f64() else {
        return Ok(FunctionOutput::of(Collection::empty()));
    };
    let y = f(x);
    Ok(FunctionOutput::of(decimal_from_float(y)))
}

fn decimal_from_float(y: f64) -> Collection {
    if !y.is_finite() {
        return Collection::empty();
    }
    Decimal::from_f64(y)
        .map(FhirPathValue::Decimal)
        .map(Collection::singleton)
        .unwrap_or_else(Collection::empty)
}

fn eval_log(ctx: &FunctionContext<'_>, args: &[FunctionArg<'_>]) -> EvalResult<FunctionOutput> {
    let Some(d) = numeric_input(ctx, "log")? else {
        return Ok(FunctionOutput::of(Collection::empty()));
    };
    let base = match value_arg(args, 0).and_then(|c| c.first()).and_then(|v| v.as_numeric()) {
        Some(b) => b,
        None => return Ok(FunctionOutput::of(Collection::empty())),
    };
    let (Some(x), Some(b)) = (d.to_f64(), base.to_f64()) else {
        return Ok(FunctionOutput::of(Collection::empty()));
    };
    Ok(FunctionOutput::of(decimal_from_float(x.log(b))))
}

fn eval_power(ctx: &FunctionContext<'_>, args: &[FunctionArg<'_>]) -> EvalResult<FunctionOutput> {
    let Some(base_value) = singleton_value(ctx.input, "power")? else {
        return Ok(FunctionOutput::of(Collection::empty()));
    };
    let Some(exponent) = value_arg(args, 0).and_then(|c| c.first()) else {
        return Ok(FunctionOutput::of(Collection::empty()));
    };

    // Integer ^ non-negative Integer stays an Integer
    if let (FhirPathValue::Integer(b), FhirPathValue::Integer(e)) = (base_value, exponent) {
        if *e >= 0 {
            if let Ok(exp) = u32::try_from(*e) {
                if let Some(result) = b.checked_pow(exp) {
                    return Ok(FunctionOutput::of(Collection::singleton(
                        FhirPathValue::Integer(result),
                    )));
                }
            }
            return Err(EvaluationError::new("arithmetic overflow in power()"));
        }
    }

    let (Some(b), Some(e)) = (
        base_value.as_numeric().and_then(|d| d.to_f64()),
        exponent.as_numeric().and_then(|d| d.to_f64()),
    ) else {
        return Err(EvaluationError::new("power() expects numeric operands"));
    };
    Ok(FunctionOutput::of(decimal_from_float(b.powf(e))))
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
        input: FhirPathValue,
        f: fn(&FunctionContext<'_>, &[FunctionArg<'_>]) -> EvalResult<FunctionOutput>,
        args: &[FunctionArg<'_>],
    ) -> Collection {
        let input = Collection::singleton(input);
        let context = EvaluationContext::new(input.share());
        let fctx = FunctionContext {
            evaluator: &NullEvaluator,
            context: &context,
            input: &input,
        };
        f(&fctx, args).unwrap().value
    }

    fn dec(s: &str) -> FhirPathValue {
        FhirPathValue::Decimal(s.parse().unwrap())
    }

    #[test]
    fn abs_of_negative_integer() {
        let out = call(FhirPathValue::Integer(-5), eval_abs, &[]);
        assert_eq!(out.first().unwrap().as_integer(), Some(5));
    }

    #[test]
    fn sqrt_of_negative_is_empty() {
        let out = call(FhirPathValue::Integer(-1), |ctx, _| {
            float_map(ctx, "sqrt", f64::sqrt)
        }, &[]);
        assert!(out.is_empty());
    }

    #[test]
    fn round_half_away_from_zero() {
        let precision = [FunctionArg::Value(Collection::singleton(
            FhirPathValue::Integer(0),
        ))];
        let out = call(dec("2.5"), eval_round, &precision);
        assert_eq!(out.first().unwrap().to_string(), "3");
    }

    #[test]
    fn integer_power_stays_integer() {
        let exp = [FunctionArg::Value(Collection::singleton(
            FhirPathValue::Integer(10),
        ))];
        let out = call(FhirPathValue::Integer(2), eval_power, &exp);
        assert_eq!(out.first().unwrap().as_integer(), Some(1024));
    }
}
