//! Type conversion functions (`toX`) and their `convertsToX` counterparts
//!
//! Conversions follow FHIRPath rules: a singleton that cannot be converted
//! yields empty, never an error; multiple items are an error. Each
//! `convertsToX` answers whether the matching `toX` would produce a value.

use super::super::{
    FunctionArg, FunctionContext, FunctionOutput, FunctionRegistry, FunctionSignature,
    ParameterInfo, RegistryError, SignatureType,
};
use super::{singleton_string, singleton_value, value_arg};
use crate::evaluator::EvalResult;
use crate::model::{
    Collection, FhirPathValue, Quantity, TypeInfo, TypeKind, parse_date, parse_datetime,
    parse_time,
};
use chrono::{TimeZone, Utc};
use rust_decimal::Decimal;
use std::str::FromStr;

/// Register a `toX` function and its `convertsToX` companion; the thunks
/// are capture-free closures over the named converter, so they coerce to
/// plain evaluator fn pointers.
macro_rules! conversion_pair {
    ($registry:expr, $to_name:literal, $converts_name:literal, $result:expr, $converter:ident) => {{
        $registry.register(
            FunctionSignature::new($to_name)
                .returns(SignatureType::fixed($result))
                .propagates_empty(),
            |ctx: &FunctionContext<'_>, _args: &[FunctionArg<'_>]| {
                let Some(value) = singleton_value(ctx.input, $to_name)? else {
                    return Ok(FunctionOutput::of(Collection::empty()));
                };
                Ok(FunctionOutput::of(
                    $converter(value)
                        .map(Collection::singleton)
                        .unwrap_or_else(Collection::empty),
                ))
            },
        )?;
        $registry.register(
            FunctionSignature::new($converts_name)
                .returns(SignatureType::fixed(TypeKind::Boolean))
                .propagates_empty(),
            |ctx: &FunctionContext<'_>, _args: &[FunctionArg<'_>]| {
                let Some(value) = singleton_value(ctx.input, $converts_name)? else {
                    return Ok(FunctionOutput::of(Collection::empty()));
                };
                Ok(FunctionOutput::of(Collection::singleton(
                    FhirPathValue::Boolean($converter(value).is_some()),
                )))
            },
        )?;
    }};
}

pub(super) fn register(registry: &mut FunctionRegistry) -> Result<(), RegistryError> {
    conversion_pair!(registry, "toBoolean", "convertsToBoolean", TypeKind::Boolean, to_boolean);
    conversion_pair!(registry, "toInteger", "convertsToInteger", TypeKind::Integer, to_integer);
    conversion_pair!(registry, "toDecimal", "convertsToDecimal", TypeKind::Decimal, to_decimal);
    conversion_pair!(registry, "toString", "convertsToString", TypeKind::String, to_string);
    conversion_pair!(registry, "toDate", "convertsToDate", TypeKind::Date, to_date);
    conversion_pair!(registry, "toDateTime", "convertsToDateTime", TypeKind::DateTime, to_datetime);
    conversion_pair!(registry, "toTime", "convertsToTime", TypeKind::Time, to_time);

    // toQuantity takes an optional target unit
    registry.register(
        FunctionSignature::new("toQuantity")
            .parameter(ParameterInfo::optional_value(
                "unit",
                TypeInfo::singleton(TypeKind::String),
            ))
            .returns(SignatureType::fixed(TypeKind::Quantity))
            .propagates_empty(),
        eval_to_quantity,
    )?;
    registry.register(
        FunctionSignature::new("convertsToQuantity")
            .parameter(ParameterInfo::optional_value(
                "unit",
                TypeInfo::singleton(TypeKind::String),
            ))
            .returns(SignatureType::fixed(TypeKind::Boolean))
            .propagates_empty(),
        |ctx, args| {
            let out = eval_to_quantity(ctx, args)?;
            Ok(FunctionOutput::of(Collection::singleton(
                FhirPathValue::Boolean(!out.value.is_empty()),
            )))
        },
    )?;
    Ok(())
}

fn to_boolean(value: &FhirPathValue) -> Option<FhirPathValue> {
    let result = match value {
        FhirPathValue::Boolean(b) => *b,
        FhirPathValue::Integer(1) => true,
        FhirPathValue::Integer(0) => false,
        FhirPathValue::Decimal(d) if *d == Decimal::ONE => true,
        FhirPathValue::Decimal(d) if d.is_zero() => false,
        FhirPathValue::String(s) => match s.to_lowercase().as_str() {
            "true" | "t" | "yes" | "y" | "1" | "1.0" => true,
            "false" | "f" | "no" | "n" | "0" | "0.0" => false,
            _ => return None,
        },
        _ => return None,
    };
    Some(FhirPathValue::Boolean(result))
}

fn to_integer(value: &FhirPathValue) -> Option<FhirPathValue> {
    let result = match value {
        FhirPathValue::Integer(i) => *i,
        FhirPathValue::Boolean(b) => i64::from(*b),
        FhirPathValue::String(s) => s.trim().parse().ok()?,
        _ => return None,
    };
    Some(FhirPathValue::Integer(result))
}

fn to_decimal(value: &FhirPathValue) -> Option<FhirPathValue> {
    let result = match value {
        FhirPathValue::Integer(i) => Decimal::from(*i),
        FhirPathValue::Decimal(d) => *d,
        FhirPathValue::Boolean(b) => Decimal::from(i64::from(*b)),
        FhirPathValue::String(s) => Decimal::from_str(s.trim()).ok()?,
        _ => return None,
    };
    Some(FhirPathValue::Decimal(result))
}

fn to_string(value: &FhirPathValue) -> Option<FhirPathValue> {
    match value {
        FhirPathValue::Resource(_) => None,
        other => Some(FhirPathValue::String(other.to_string())),
    }
}

fn to_date(value: &FhirPathValue) -> Option<FhirPathValue> {
    match value {
        FhirPathValue::Date(d) => Some(FhirPathValue::Date(*d)),
        FhirPathValue::DateTime(dt) => Some(FhirPathValue::Date(dt.date_naive())),
        FhirPathValue::String(s) => parse_date(s).map(FhirPathValue::Date),
        _ => None,
    }
}

fn to_datetime(value: &FhirPathValue) -> Option<FhirPathValue> {
    match value {
        FhirPathValue::DateTime(dt) => Some(FhirPathValue::DateTime(*dt)),
        FhirPathValue::Date(d) => {
            let naive = d.and_hms_opt(0, 0, 0)?;
            Some(FhirPathValue::DateTime(
                Utc.from_utc_datetime(&naive).fixed_offset(),
            ))
        }
        FhirPathValue::String(s) => parse_datetime(s).map(FhirPathValue::DateTime),
        _ => None,
    }
}

fn to_time(value: &FhirPathValue) -> Option<FhirPathValue> {
    match value {
        FhirPathValue::Time(t) => Some(FhirPathValue::Time(*t)),
        FhirPathValue::String(s) => parse_time(s).map(FhirPathValue::Time),
        _ => None,
    }
}

fn to_quantity(value: &FhirPathValue) -> Option<Quantity> {
    match value {
        FhirPathValue::Quantity(q) => Some(q.clone()),
        FhirPathValue::Integer(i) => Some(Quantity::dimensionless(Decimal::from(*i))),
        FhirPathValue::Decimal(d) => Some(Quantity::dimensionless(*d)),
        FhirPathValue::Boolean(b) => {
            Some(Quantity::dimensionless(Decimal::from(i64::from(*b))))
        }
        FhirPathValue::String(s) => parse_quantity_literal(s),
        _ => None,
    }
}

/// `"5 'mg'"`, `"4 days"` or a bare number
fn parse_quantity_literal(text: &str) -> Option<Quantity> {
    let trimmed = text.trim();
    match trimmed.split_once(char::is_whitespace) {
        None => Decimal::from_str(trimmed).ok().map(Quantity::dimensionless),
        Some((number, unit)) => {
            let value = Decimal::from_str(number.trim()).ok()?;
            let unit = unit.trim();
            let unit = unit
                .strip_prefix('\'')
                .and_then(|u| u.strip_suffix('\''))
                .unwrap_or(unit);
            Some(Quantity::new(value, Some(unit.to_string())))
        }
    }
}

fn eval_to_quantity(
    ctx: &FunctionContext<'_>,
    args: &[FunctionArg<'_>],
) -> EvalResult<FunctionOutput> {
    let Some(value) = singleton_value(ctx.input, "toQuantity")? else {
        return Ok(FunctionOutput::of(Collection::empty()));
    };
    let Some(quantity) = to_quantity(value) else {
        return Ok(FunctionOutput::of(Collection::empty()));
    };
    // A target unit filters: conversion between units needs a UCUM service
    if let Some(unit) = value_arg(args, 0)
        .map(|c| singleton_string(c, "toQuantity"))
        .transpose()?
        .flatten()
    {
        let target = Quantity::new(Decimal::ZERO, Some(unit));
        if !quantity.same_unit(&target) {
            return Ok(FunctionOutput::of(Collection::empty()));
        }
    }
    Ok(FunctionOutput::of(Collection::singleton(
        FhirPathValue::Quantity(quantity),
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn boolean_conversions() {
        assert_eq!(
            to_boolean(&FhirPathValue::String("TRUE".into())),
            Some(FhirPathValue::Boolean(true))
        );
        assert_eq!(
            to_boolean(&FhirPathValue::Integer(0)),
            Some(FhirPathValue::Boolean(false))
        );
        assert_eq!(to_boolean(&FhirPathValue::Integer(7)), None);
    }

    #[test]
    fn integer_conversions_reject_decimals() {
        assert_eq!(
            to_integer(&FhirPathValue::String("42".into())),
            Some(FhirPathValue::Integer(42))
        );
        assert_eq!(to_integer(&FhirPathValue::Decimal("1.5".parse().unwrap())), None);
    }

    #[test]
    fn string_conversion_covers_primitives() {
        assert_eq!(
            to_string(&FhirPathValue::Boolean(true)),
            Some(FhirPathValue::String("true".into()))
        );
        assert!(to_string(&FhirPathValue::Resource(std::sync::Arc::new(
            serde_json::json!({})
        )))
        .is_none());
    }

    #[test]
    fn temporal_conversions() {
        assert!(matches!(
            to_date(&FhirPathValue::String("2023-05-01".into())),
            Some(FhirPathValue::Date(_))
        ));
        assert!(matches!(
            to_datetime(&FhirPathValue::String("2023-05-01T10:00:00Z".into())),
            Some(FhirPathValue::DateTime(_))
        ));
        assert_eq!(to_time(&FhirPathValue::Integer(1)), None);
    }

    #[test]
    fn quantity_from_string_literal() {
        let q = parse_quantity_literal("5 'mg'").unwrap();
        assert_eq!(q.unit.as_deref(), Some("mg"));
        let cal = parse_quantity_literal("4 days").unwrap();
        assert_eq!(cal.unit.as_deref(), Some("day"));
        assert!(parse_quantity_literal("bogus").is_none());
    }
}
