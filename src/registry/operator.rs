//! Built-in operators: metadata and evaluators
//!
//! Evaluators receive whole operand collections and implement the FHIRPath
//! singleton rules themselves: empty operands propagate to empty output and
//! multi-item operands where a single value is required raise errors.
//! Division by zero and friends yield empty, not errors.

use super::signature::{OperatorSignature, SignatureType};
use super::{OperatorRegistry, RegistryError};
use crate::evaluator::{EvalResult, EvaluationError};
use crate::model::{
    CalendarUnit, Collection, FhirPathValue, Quantity, TypeInfo, TypeKind, values_equal,
    values_equivalent,
};
use chrono::{Days, Months, TimeDelta};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use std::cmp::Ordering;

/// Operator form, part of the registry key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperatorForm {
    /// Prefix unary (`-x`)
    Prefix,
    /// Infix binary (`a + b`)
    Infix,
    /// Postfix (`x[i]`)
    Postfix,
}

/// Operator associativity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Associativity {
    /// Left-to-right
    Left,
    /// Right-to-left (`implies`)
    Right,
}

/// Evaluator callback: operand collections in, result collection out.
/// Prefix operators receive their operand on the left and an empty right.
pub type OperatorEvalFn = fn(&Collection, &Collection) -> EvalResult<Collection>;

/// A registered operator
pub struct Operator {
    /// Surface symbol (`+`, `and`, ...)
    pub symbol: &'static str,
    /// Prefix/infix/postfix
    pub form: OperatorForm,
    /// FHIRPath precedence level, 1 (tightest, `.`) to 13 (`implies`)
    pub precedence: u8,
    /// Associativity
    pub associativity: Associativity,
    /// Declared overloads for the analyzer
    pub signatures: Vec<OperatorSignature>,
    /// Evaluator
    pub eval: OperatorEvalFn,
}

/// Three-valued boolean: `Empty` is "unknown"
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriState {
    /// Known true
    True,
    /// Known false
    False,
    /// Unknown / no value
    Empty,
}

impl TriState {
    /// Logical and
    pub fn and(self, other: TriState) -> TriState {
        match (self, other) {
            (TriState::False, _) | (_, TriState::False) => TriState::False,
            (TriState::True, TriState::True) => TriState::True,
            _ => TriState::Empty,
        }
    }

    /// Logical or
    pub fn or(self, other: TriState) -> TriState {
        match (self, other) {
            (TriState::True, _) | (_, TriState::True) => TriState::True,
            (TriState::False, TriState::False) => TriState::False,
            _ => TriState::Empty,
        }
    }

    /// Logical xor
    pub fn xor(self, other: TriState) -> TriState {
        match (self, other) {
            (TriState::True, TriState::True) | (TriState::False, TriState::False) => {
                TriState::False
            }
            (TriState::True, TriState::False) | (TriState::False, TriState::True) => {
                TriState::True
            }
            _ => TriState::Empty,
        }
    }

    /// Logical implication
    pub fn implies(self, other: TriState) -> TriState {
        match (self, other) {
            (TriState::False, _) => TriState::True,
            (TriState::True, o) => o,
            (TriState::Empty, TriState::True) => TriState::True,
            (TriState::Empty, _) => TriState::Empty,
        }
    }

    /// Logical negation
    pub fn not(self) -> TriState {
        match self {
            TriState::True => TriState::False,
            TriState::False => TriState::True,
            TriState::Empty => TriState::Empty,
        }
    }

    /// Render as a collection: `Empty` is the empty collection
    pub fn to_collection(self) -> Collection {
        match self {
            TriState::True => Collection::singleton(FhirPathValue::Boolean(true)),
            TriState::False => Collection::singleton(FhirPathValue::Boolean(false)),
            TriState::Empty => Collection::empty(),
        }
    }
}

impl From<bool> for TriState {
    fn from(b: bool) -> Self {
        if b { TriState::True } else { TriState::False }
    }
}

/// Coerce a collection to a three-valued boolean.
///
/// Empty stays empty; a single boolean is itself; a single non-boolean
/// coerces to true (existence coercion); multiple items are an error.
pub fn boolean_of(collection: &Collection) -> EvalResult<TriState> {
    match collection.len() {
        0 => Ok(TriState::Empty),
        1 => Ok(match collection.first() {
            Some(FhirPathValue::Boolean(b)) => TriState::from(*b),
            _ => TriState::True,
        }),
        _ => Err(EvaluationError::multiple_items("boolean evaluation")),
    }
}

/// Require at most one element; empty is `None`
fn singleton<'a>(collection: &'a Collection, what: &str) -> EvalResult<Option<&'a FhirPathValue>> {
    match collection.len() {
        0 => Ok(None),
        1 => Ok(collection.first()),
        _ => Err(EvaluationError::multiple_items(what)),
    }
}

// ---------------------------------------------------------------------------
// Arithmetic

fn numeric_pair(a: &FhirPathValue, b: &FhirPathValue) -> Option<(Decimal, Decimal, bool)> {
    let both_integer = matches!(
        (a, b),
        (FhirPathValue::Integer(_), FhirPathValue::Integer(_))
    );
    Some((a.as_numeric()?, b.as_numeric()?, both_integer))
}

fn decimal_result(value: Decimal, as_integer: bool) -> FhirPathValue {
    if as_integer {
        match value.to_i64() {
            Some(i) => FhirPathValue::Integer(i),
            None => FhirPathValue::Decimal(value),
        }
    } else {
        FhirPathValue::Decimal(value)
    }
}

fn type_error(op: &str, a: &FhirPathValue, b: &FhirPathValue) -> EvaluationError {
    EvaluationError::new(format!(
        "operator '{op}' is not defined for {} and {}",
        a.type_name(),
        b.type_name()
    ))
}

fn eval_add(left: &Collection, right: &Collection) -> EvalResult<Collection> {
    let (Some(a), Some(b)) = (singleton(left, "operator '+'")?, singleton(right, "operator '+'")?)
    else {
        return Ok(Collection::empty());
    };
    let value = match (a, b) {
        (FhirPathValue::String(x), FhirPathValue::String(y)) => {
            FhirPathValue::String(format!("{x}{y}"))
        }
        (FhirPathValue::Quantity(x), FhirPathValue::Quantity(y)) => match x.checked_add(y) {
            Some(q) => FhirPathValue::Quantity(q),
            None => {
                return Err(EvaluationError::incompatible_units(
                    x.unit.as_deref().unwrap_or("1"),
                    y.unit.as_deref().unwrap_or("1"),
                ));
            }
        },
        (FhirPathValue::Date(_), FhirPathValue::Quantity(q))
        | (FhirPathValue::DateTime(_), FhirPathValue::Quantity(q))
        | (FhirPathValue::Time(_), FhirPathValue::Quantity(q)) => {
            return temporal_shift(a, q, 1).map(|v| {
                v.map(Collection::singleton).unwrap_or_else(Collection::empty)
            });
        }
        _ => match numeric_pair(a, b) {
            Some((x, y, as_integer)) => {
                let sum = x
                    .checked_add(y)
                    .ok_or_else(|| EvaluationError::new("arithmetic overflow in '+'"))?;
                decimal_result(sum, as_integer)
            }
            None => return Err(type_error("+", a, b)),
        },
    };
    Ok(Collection::singleton(value))
}

fn eval_subtract(left: &Collection, right: &Collection) -> EvalResult<Collection> {
    let (Some(a), Some(b)) = (singleton(left, "operator '-'")?, singleton(right, "operator '-'")?)
    else {
        return Ok(Collection::empty());
    };
    let value = match (a, b) {
        (FhirPathValue::Quantity(x), FhirPathValue::Quantity(y)) => match x.checked_sub(y) {
            Some(q) => FhirPathValue::Quantity(q),
            None => {
                return Err(EvaluationError::incompatible_units(
                    x.unit.as_deref().unwrap_or("1"),
                    y.unit.as_deref().unwrap_or("1"),
                ));
            }
        },
        (FhirPathValue::Date(_), FhirPathValue::Quantity(q))
        | (FhirPathValue::DateTime(_), FhirPathValue::Quantity(q))
        | (FhirPathValue::Time(_), FhirPathValue::Quantity(q)) => {
            return temporal_shift(a, q, -1).map(|v| {
                v.map(Collection::singleton).unwrap_or_else(Collection::empty)
            });
        }
        _ => match numeric_pair(a, b) {
            Some((x, y, as_integer)) => {
                let diff = x
                    .checked_sub(y)
                    .ok_or_else(|| EvaluationError::new("arithmetic overflow in '-'"))?;
                decimal_result(diff, as_integer)
            }
            None => return Err(type_error("-", a, b)),
        },
    };
    Ok(Collection::singleton(value))
}

fn eval_multiply(left: &Collection, right: &Collection) -> EvalResult<Collection> {
    let (Some(a), Some(b)) = (singleton(left, "operator '*'")?, singleton(right, "operator '*'")?)
    else {
        return Ok(Collection::empty());
    };
    let value = match (a, b) {
        (FhirPathValue::Quantity(q), other) | (other, FhirPathValue::Quantity(q)) => {
            match other.as_numeric() {
                Some(factor) => FhirPathValue::Quantity(q.scale(factor)),
                None => return Err(type_error("*", a, b)),
            }
        }
        _ => match numeric_pair(a, b) {
            Some((x, y, as_integer)) => {
                let product = x
                    .checked_mul(y)
                    .ok_or_else(|| EvaluationError::new("arithmetic overflow in '*'"))?;
                decimal_result(product, as_integer)
            }
            None => return Err(type_error("*", a, b)),
        },
    };
    Ok(Collection::singleton(value))
}

fn eval_divide(left: &Collection, right: &Collection) -> EvalResult<Collection> {
    let (Some(a), Some(b)) = (singleton(left, "operator '/'")?, singleton(right, "operator '/'")?)
    else {
        return Ok(Collection::empty());
    };
    match (a, b) {
        (FhirPathValue::Quantity(x), FhirPathValue::Quantity(y)) => Ok(x
            .checked_ratio(y)
            .map(FhirPathValue::Quantity)
            .map(Collection::singleton)
            .unwrap_or_else(Collection::empty)),
        (FhirPathValue::Quantity(q), other) => match other.as_numeric() {
            Some(divisor) => Ok(q
                .checked_div_scalar(divisor)
                .map(FhirPathValue::Quantity)
                .map(Collection::singleton)
                .unwrap_or_else(Collection::empty)),
            None => Err(type_error("/", a, b)),
        },
        _ => match numeric_pair(a, b) {
            // Division always produces a decimal; division by zero is empty
            Some((_, y, _)) if y.is_zero() => Ok(Collection::empty()),
            Some((x, y, _)) => Ok(Collection::singleton(FhirPathValue::Decimal(x / y))),
            None => Err(type_error("/", a, b)),
        },
    }
}

fn eval_integer_divide(left: &Collection, right: &Collection) -> EvalResult<Collection> {
    let (Some(a), Some(b)) = (
        singleton(left, "operator 'div'")?,
        singleton(right, "operator 'div'")?,
    ) else {
        return Ok(Collection::empty());
    };
    match numeric_pair(a, b) {
        Some((_, y, _)) if y.is_zero() => Ok(Collection::empty()),
        Some((x, y, _)) => {
            let quotient = (x / y).trunc();
            Ok(Collection::singleton(FhirPathValue::Integer(
                quotient
                    .to_i64()
                    .ok_or_else(|| EvaluationError::new("arithmetic overflow in 'div'"))?,
            )))
        }
        None => Err(type_error("div", a, b)),
    }
}

fn eval_modulo(left: &Collection, right: &Collection) -> EvalResult<Collection> {
    let (Some(a), Some(b)) = (
        singleton(left, "operator 'mod'")?,
        singleton(right, "operator 'mod'")?,
    ) else {
        return Ok(Collection::empty());
    };
    match numeric_pair(a, b) {
        Some((_, y, _)) if y.is_zero() => Ok(Collection::empty()),
        Some((x, y, as_integer)) => {
            let remainder = x - (x / y).trunc() * y;
            Ok(Collection::singleton(decimal_result(remainder, as_integer)))
        }
        None => Err(type_error("mod", a, b)),
    }
}

/// `&` treats empty operands as the empty string
fn eval_concatenate(left: &Collection, right: &Collection) -> EvalResult<Collection> {
    let a = concat_operand(left)?;
    let b = concat_operand(right)?;
    Ok(Collection::singleton(FhirPathValue::String(format!(
        "{a}{b}"
    ))))
}

fn concat_operand(collection: &Collection) -> EvalResult<String> {
    match singleton(collection, "operator '&'")? {
        None => Ok(String::new()),
        Some(FhirPathValue::String(s)) => Ok(s.clone()),
        Some(other) => Ok(other.to_string()),
    }
}

/// Shift a temporal value by a calendar quantity; `None` when the shift
/// leaves the calendar (overflow)
fn temporal_shift(
    value: &FhirPathValue,
    quantity: &Quantity,
    sign: i64,
) -> EvalResult<Option<FhirPathValue>> {
    let Some(unit) = quantity.calendar_unit() else {
        return Err(EvaluationError::new(format!(
            "quantity unit '{}' is not a calendar duration",
            quantity.unit.as_deref().unwrap_or("1")
        )));
    };
    let amount = quantity.value.trunc().to_i64().ok_or_else(|| {
        EvaluationError::new("calendar arithmetic requires an integral quantity")
    })? * sign;

    match value {
        FhirPathValue::Date(date) => {
            let shifted = match unit {
                CalendarUnit::Year => shift_months(*date, amount * 12),
                CalendarUnit::Month => shift_months(*date, amount),
                CalendarUnit::Week => shift_days(*date, amount * 7),
                CalendarUnit::Day => shift_days(*date, amount),
                _ => {
                    return Err(EvaluationError::new(format!(
                        "cannot add '{}' to a Date",
                        unit.as_str()
                    )));
                }
            };
            Ok(shifted.map(FhirPathValue::Date))
        }
        FhirPathValue::DateTime(dt) => {
            let shifted = match unit {
                CalendarUnit::Year => shift_months_datetime(dt, amount * 12),
                CalendarUnit::Month => shift_months_datetime(dt, amount),
                CalendarUnit::Week => dt.checked_add_signed(TimeDelta::weeks(amount)),
                CalendarUnit::Day => dt.checked_add_signed(TimeDelta::days(amount)),
                CalendarUnit::Hour => dt.checked_add_signed(TimeDelta::hours(amount)),
                CalendarUnit::Minute => dt.checked_add_signed(TimeDelta::minutes(amount)),
                CalendarUnit::Second => dt.checked_add_signed(TimeDelta::seconds(amount)),
                CalendarUnit::Millisecond => dt.checked_add_signed(TimeDelta::milliseconds(amount)),
            };
            Ok(shifted.map(FhirPathValue::DateTime))
        }
        FhirPathValue::Time(t) => {
            let delta = match unit {
                CalendarUnit::Hour => TimeDelta::hours(amount),
                CalendarUnit::Minute => TimeDelta::minutes(amount),
                CalendarUnit::Second => TimeDelta::seconds(amount),
                CalendarUnit::Millisecond => TimeDelta::milliseconds(amount),
                _ => {
                    return Err(EvaluationError::new(format!(
                        "cannot add '{}' to a Time",
                        unit.as_str()
                    )));
                }
            };
            // Time-of-day arithmetic wraps around midnight
            Ok(Some(FhirPathValue::Time(*t + delta)))
        }
        _ => Err(EvaluationError::new(
            "calendar arithmetic requires a temporal value",
        )),
    }
}

fn shift_months(date: chrono::NaiveDate, amount: i64) -> Option<chrono::NaiveDate> {
    if amount >= 0 {
        date.checked_add_months(Months::new(u32::try_from(amount).ok()?))
    } else {
        date.checked_sub_months(Months::new(u32::try_from(-amount).ok()?))
    }
}

fn shift_days(date: chrono::NaiveDate, amount: i64) -> Option<chrono::NaiveDate> {
    if amount >= 0 {
        date.checked_add_days(Days::new(u64::try_from(amount).ok()?))
    } else {
        date.checked_sub_days(Days::new(u64::try_from(-amount).ok()?))
    }
}

fn shift_months_datetime(
    dt: &chrono::DateTime<chrono::FixedOffset>,
    amount: i64,
) -> Option<chrono::DateTime<chrono::FixedOffset>> {
    if amount >= 0 {
        dt.checked_add_months(Months::new(u32::try_from(amount).ok()?))
    } else {
        dt.checked_sub_months(Months::new(u32::try_from(-amount).ok()?))
    }
}

// ---------------------------------------------------------------------------
// Comparison and equality

/// Ordering between two single values; errors on incomparable types or
/// incompatible quantity units
pub(crate) fn compare_values(a: &FhirPathValue, b: &FhirPathValue) -> EvalResult<Ordering> {
    use FhirPathValue::*;
    match (a, b) {
        (Integer(_) | Decimal(_), Integer(_) | Decimal(_)) => {
            Ok(a.as_numeric().unwrap().cmp(&b.as_numeric().unwrap()))
        }
        (String(x), String(y)) => Ok(x.cmp(y)),
        (Date(x), Date(y)) => Ok(x.cmp(y)),
        (DateTime(x), DateTime(y)) => Ok(x.cmp(y)),
        (Time(x), Time(y)) => Ok(x.cmp(y)),
        (String(s), Date(d)) => match crate::model::parse_date(s) {
            Some(parsed) => Ok(parsed.cmp(d)),
            None => Err(type_error("comparison", a, b)),
        },
        (Date(d), String(s)) => match crate::model::parse_date(s) {
            Some(parsed) => Ok(d.cmp(&parsed)),
            None => Err(type_error("comparison", a, b)),
        },
        (String(s), DateTime(dt)) => match crate::model::parse_datetime(s) {
            Some(parsed) => Ok(parsed.cmp(dt)),
            None => Err(type_error("comparison", a, b)),
        },
        (DateTime(dt), String(s)) => match crate::model::parse_datetime(s) {
            Some(parsed) => Ok(dt.cmp(&parsed)),
            None => Err(type_error("comparison", a, b)),
        },
        (Quantity(x), Quantity(y)) => {
            if x.same_unit(y) {
                Ok(x.value.cmp(&y.value))
            } else {
                Err(EvaluationError::incompatible_units(
                    x.unit.as_deref().unwrap_or("1"),
                    y.unit.as_deref().unwrap_or("1"),
                ))
            }
        }
        _ => Err(type_error("comparison", a, b)),
    }
}

fn comparison(
    left: &Collection,
    right: &Collection,
    accept: fn(Ordering) -> bool,
) -> EvalResult<Collection> {
    let (Some(a), Some(b)) = (singleton(left, "comparison")?, singleton(right, "comparison")?)
    else {
        return Ok(Collection::empty());
    };
    let ordering = compare_values(a, b)?;
    Ok(TriState::from(accept(ordering)).to_collection())
}

fn eval_less(l: &Collection, r: &Collection) -> EvalResult<Collection> {
    comparison(l, r, Ordering::is_lt)
}
fn eval_less_equal(l: &Collection, r: &Collection) -> EvalResult<Collection> {
    comparison(l, r, Ordering::is_le)
}
fn eval_greater(l: &Collection, r: &Collection) -> EvalResult<Collection> {
    comparison(l, r, Ordering::is_gt)
}
fn eval_greater_equal(l: &Collection, r: &Collection) -> EvalResult<Collection> {
    comparison(l, r, Ordering::is_ge)
}

/// Collection equality: empty operand propagates, otherwise ordered
/// element-wise comparison
fn equality(left: &Collection, right: &Collection) -> Option<bool> {
    if left.is_empty() || right.is_empty() {
        return None;
    }
    Some(
        left.len() == right.len()
            && left
                .iter()
                .zip(right.iter())
                .all(|(a, b)| values_equal(a, b)),
    )
}

fn eval_equal(left: &Collection, right: &Collection) -> EvalResult<Collection> {
    Ok(match equality(left, right) {
        Some(b) => TriState::from(b).to_collection(),
        None => Collection::empty(),
    })
}

fn eval_not_equal(left: &Collection, right: &Collection) -> EvalResult<Collection> {
    Ok(match equality(left, right) {
        Some(b) => TriState::from(!b).to_collection(),
        None => Collection::empty(),
    })
}

/// Collection equivalence: `{} ~ {}` is true and comparison is
/// order-independent
fn equivalence(left: &Collection, right: &Collection) -> bool {
    if left.len() != right.len() {
        return false;
    }
    let mut matched = vec![false; right.len()];
    'outer: for a in left.iter() {
        for (i, b) in right.iter().enumerate() {
            if !matched[i] && values_equivalent(a, b) {
                matched[i] = true;
                continue 'outer;
            }
        }
        return false;
    }
    true
}

fn eval_equivalent(left: &Collection, right: &Collection) -> EvalResult<Collection> {
    Ok(TriState::from(equivalence(left, right)).to_collection())
}

fn eval_not_equivalent(left: &Collection, right: &Collection) -> EvalResult<Collection> {
    Ok(TriState::from(!equivalence(left, right)).to_collection())
}

// ---------------------------------------------------------------------------
// Boolean logic

fn eval_and(left: &Collection, right: &Collection) -> EvalResult<Collection> {
    Ok(boolean_of(left)?.and(boolean_of(right)?).to_collection())
}

fn eval_or(left: &Collection, right: &Collection) -> EvalResult<Collection> {
    Ok(boolean_of(left)?.or(boolean_of(right)?).to_collection())
}

fn eval_xor(left: &Collection, right: &Collection) -> EvalResult<Collection> {
    Ok(boolean_of(left)?.xor(boolean_of(right)?).to_collection())
}

fn eval_implies(left: &Collection, right: &Collection) -> EvalResult<Collection> {
    Ok(boolean_of(left)?
        .implies(boolean_of(right)?)
        .to_collection())
}

// ---------------------------------------------------------------------------
// Membership and union

fn eval_in(left: &Collection, right: &Collection) -> EvalResult<Collection> {
    let Some(item) = singleton(left, "operator 'in'")? else {
        return Ok(Collection::empty());
    };
    Ok(TriState::from(right.contains_value(item)).to_collection())
}

fn eval_contains(left: &Collection, right: &Collection) -> EvalResult<Collection> {
    eval_in(right, left)
}

fn eval_union(left: &Collection, right: &Collection) -> EvalResult<Collection> {
    Ok(left.union(right))
}

// ---------------------------------------------------------------------------
// Prefix operators

fn eval_unary_plus(operand: &Collection, _: &Collection) -> EvalResult<Collection> {
    match singleton(operand, "unary '+'")? {
        None => Ok(Collection::empty()),
        Some(v @ (FhirPathValue::Integer(_) | FhirPathValue::Decimal(_)
        | FhirPathValue::Quantity(_))) => Ok(Collection::singleton(v.clone())),
        Some(other) => Err(EvaluationError::new(format!(
            "unary '+' is not defined for {}",
            other.type_name()
        ))),
    }
}

fn eval_unary_minus(operand: &Collection, _: &Collection) -> EvalResult<Collection> {
    match singleton(operand, "unary '-'")? {
        None => Ok(Collection::empty()),
        Some(FhirPathValue::Integer(i)) => Ok(Collection::singleton(FhirPathValue::Integer(
            i.checked_neg()
                .ok_or_else(|| EvaluationError::new("arithmetic overflow in unary '-'"))?,
        ))),
        Some(FhirPathValue::Decimal(d)) => {
            Ok(Collection::singleton(FhirPathValue::Decimal(-*d)))
        }
        Some(FhirPathValue::Quantity(q)) => Ok(Collection::singleton(FhirPathValue::Quantity(
            Quantity {
                value: -q.value,
                unit: q.unit.clone(),
            },
        ))),
        Some(other) => Err(EvaluationError::new(format!(
            "unary '-' is not defined for {}",
            other.type_name()
        ))),
    }
}

fn eval_not(operand: &Collection, _: &Collection) -> EvalResult<Collection> {
    Ok(boolean_of(operand)?.not().to_collection())
}

// ---------------------------------------------------------------------------
// Structural operators

/// `.` carries expression structure; the interpreter resolves it before any
/// value-level evaluator could run. The registry entry exists for precedence
/// and signature metadata.
fn eval_navigation(_left: &Collection, _right: &Collection) -> EvalResult<Collection> {
    Err(EvaluationError::new(
        "navigation is resolved structurally by the interpreter",
    ))
}

/// `x[i]`: 0-based, out-of-bounds and empty index yield empty
fn eval_indexer(left: &Collection, right: &Collection) -> EvalResult<Collection> {
    let index = match singleton(right, "indexer")? {
        None => return Ok(Collection::empty()),
        Some(FhirPathValue::Integer(i)) => *i,
        Some(other) => {
            return Err(EvaluationError::new(format!(
                "indexer expects an Integer, found {}",
                other.type_name()
            )));
        }
    };
    Ok(usize::try_from(index)
        .ok()
        .and_then(|i| left.get(i))
        .map(|v| Collection::singleton(v.clone()))
        .unwrap_or_else(Collection::empty))
}

// ---------------------------------------------------------------------------
// Registration

fn sig(left: TypeKind, right: TypeKind, result: TypeKind) -> OperatorSignature {
    OperatorSignature::infix(
        TypeInfo::singleton(left),
        TypeInfo::singleton(right),
        SignatureType::fixed(result),
    )
}

/// The overload matrix for `+`/`-`/`*`: numeric pairs and quantities
fn numeric_signatures(result_for_mixed: TypeKind) -> Vec<OperatorSignature> {
    vec![
        sig(TypeKind::Integer, TypeKind::Integer, TypeKind::Integer),
        sig(TypeKind::Decimal, TypeKind::Decimal, TypeKind::Decimal),
        sig(TypeKind::Integer, TypeKind::Decimal, result_for_mixed),
        sig(TypeKind::Decimal, TypeKind::Integer, result_for_mixed),
        sig(TypeKind::Quantity, TypeKind::Quantity, TypeKind::Quantity),
    ]
}

fn comparable_signatures() -> Vec<OperatorSignature> {
    vec![
        sig(TypeKind::Integer, TypeKind::Integer, TypeKind::Boolean),
        sig(TypeKind::Decimal, TypeKind::Decimal, TypeKind::Boolean),
        sig(TypeKind::Integer, TypeKind::Decimal, TypeKind::Boolean),
        sig(TypeKind::Decimal, TypeKind::Integer, TypeKind::Boolean),
        sig(TypeKind::String, TypeKind::String, TypeKind::Boolean),
        sig(TypeKind::Date, TypeKind::Date, TypeKind::Boolean),
        sig(TypeKind::DateTime, TypeKind::DateTime, TypeKind::Boolean),
        sig(TypeKind::Time, TypeKind::Time, TypeKind::Boolean),
        sig(TypeKind::Quantity, TypeKind::Quantity, TypeKind::Boolean),
    ]
}

fn any_boolean_signature() -> Vec<OperatorSignature> {
    vec![OperatorSignature::infix(
        TypeInfo::any(),
        TypeInfo::any(),
        SignatureType::fixed(TypeKind::Boolean),
    )]
}

fn logical_signatures() -> Vec<OperatorSignature> {
    vec![sig(TypeKind::Boolean, TypeKind::Boolean, TypeKind::Boolean)]
}

struct OperatorSpec {
    symbol: &'static str,
    form: OperatorForm,
    precedence: u8,
    associativity: Associativity,
    signatures: Vec<OperatorSignature>,
    eval: OperatorEvalFn,
}

/// Register every built-in operator at its FHIRPath precedence level
pub fn register_builtin_operators(registry: &mut OperatorRegistry) -> Result<(), RegistryError> {
    use Associativity::{Left, Right};
    use OperatorForm::{Infix, Prefix};

    let mut date_shift = numeric_signatures(TypeKind::Decimal);
    date_shift.push(sig(TypeKind::Date, TypeKind::Quantity, TypeKind::Date));
    date_shift.push(sig(TypeKind::DateTime, TypeKind::Quantity, TypeKind::DateTime));
    date_shift.push(sig(TypeKind::Time, TypeKind::Quantity, TypeKind::Time));
    let mut add_signatures = date_shift.clone();
    add_signatures.push(sig(TypeKind::String, TypeKind::String, TypeKind::String));

    let specs = vec![
        OperatorSpec {
            symbol: ".",
            form: Infix,
            precedence: 1,
            associativity: Left,
            signatures: vec![OperatorSignature::infix(
                TypeInfo::any(),
                TypeInfo::any(),
                SignatureType::RightType,
            )],
            eval: eval_navigation,
        },
        OperatorSpec {
            symbol: "[]",
            form: OperatorForm::Postfix,
            precedence: 2,
            associativity: Left,
            signatures: vec![OperatorSignature::infix(
                TypeInfo::any(),
                TypeInfo::singleton(TypeKind::Integer),
                SignatureType::LeftType,
            )],
            eval: eval_indexer,
        },
        OperatorSpec {
            symbol: "*",
            form: Infix,
            precedence: 4,
            associativity: Left,
            signatures: numeric_signatures(TypeKind::Decimal),
            eval: eval_multiply,
        },
        OperatorSpec {
            symbol: "/",
            form: Infix,
            precedence: 4,
            associativity: Left,
            signatures: vec![
                sig(TypeKind::Integer, TypeKind::Integer, TypeKind::Decimal),
                sig(TypeKind::Decimal, TypeKind::Decimal, TypeKind::Decimal),
                sig(TypeKind::Integer, TypeKind::Decimal, TypeKind::Decimal),
                sig(TypeKind::Decimal, TypeKind::Integer, TypeKind::Decimal),
                sig(TypeKind::Quantity, TypeKind::Quantity, TypeKind::Quantity),
            ],
            eval: eval_divide,
        },
        OperatorSpec {
            symbol: "div",
            form: Infix,
            precedence: 4,
            associativity: Left,
            signatures: vec![
                sig(TypeKind::Integer, TypeKind::Integer, TypeKind::Integer),
                sig(TypeKind::Decimal, TypeKind::Decimal, TypeKind::Integer),
                sig(TypeKind::Integer, TypeKind::Decimal, TypeKind::Integer),
                sig(TypeKind::Decimal, TypeKind::Integer, TypeKind::Integer),
            ],
            eval: eval_integer_divide,
        },
        OperatorSpec {
            symbol: "mod",
            form: Infix,
            precedence: 4,
            associativity: Left,
            signatures: numeric_signatures(TypeKind::Decimal),
            eval: eval_modulo,
        },
        OperatorSpec {
            symbol: "+",
            form: Infix,
            precedence: 5,
            associativity: Left,
            signatures: add_signatures,
            eval: eval_add,
        },
        OperatorSpec {
            symbol: "-",
            form: Infix,
            precedence: 5,
            associativity: Left,
            signatures: date_shift,
            eval: eval_subtract,
        },
        OperatorSpec {
            symbol: "&",
            form: Infix,
            precedence: 5,
            associativity: Left,
            signatures: vec![sig(TypeKind::String, TypeKind::String, TypeKind::String)],
            eval: eval_concatenate,
        },
        OperatorSpec {
            symbol: "|",
            form: Infix,
            precedence: 7,
            associativity: Left,
            signatures: vec![OperatorSignature::infix(
                TypeInfo::any(),
                TypeInfo::any(),
                SignatureType::LeftType,
            )],
            eval: eval_union,
        },
        OperatorSpec {
            symbol: "<",
            form: Infix,
            precedence: 8,
            associativity: Left,
            signatures: comparable_signatures(),
            eval: eval_less,
        },
        OperatorSpec {
            symbol: "<=",
            form: Infix,
            precedence: 8,
            associativity: Left,
            signatures: comparable_signatures(),
            eval: eval_less_equal,
        },
        OperatorSpec {
            symbol: ">",
            form: Infix,
            precedence: 8,
            associativity: Left,
            signatures: comparable_signatures(),
            eval: eval_greater,
        },
        OperatorSpec {
            symbol: ">=",
            form: Infix,
            precedence: 8,
            associativity: Left,
            signatures: comparable_signatures(),
            eval: eval_greater_equal,
        },
        OperatorSpec {
            symbol: "=",
            form: Infix,
            precedence: 9,
            associativity: Left,
            signatures: any_boolean_signature(),
            eval: eval_equal,
        },
        OperatorSpec {
            symbol: "!=",
            form: Infix,
            precedence: 9,
            associativity: Left,
            signatures: any_boolean_signature(),
            eval: eval_not_equal,
        },
        OperatorSpec {
            symbol: "~",
            form: Infix,
            precedence: 9,
            associativity: Left,
            signatures: any_boolean_signature(),
            eval: eval_equivalent,
        },
        OperatorSpec {
            symbol: "!~",
            form: Infix,
            precedence: 9,
            associativity: Left,
            signatures: any_boolean_signature(),
            eval: eval_not_equivalent,
        },
        OperatorSpec {
            symbol: "in",
            form: Infix,
            precedence: 10,
            associativity: Left,
            signatures: any_boolean_signature(),
            eval: eval_in,
        },
        OperatorSpec {
            symbol: "contains",
            form: Infix,
            precedence: 10,
            associativity: Left,
            signatures: any_boolean_signature(),
            eval: eval_contains,
        },
        OperatorSpec {
            symbol: "and",
            form: Infix,
            precedence: 11,
            associativity: Left,
            signatures: logical_signatures(),
            eval: eval_and,
        },
        OperatorSpec {
            symbol: "or",
            form: Infix,
            precedence: 12,
            associativity: Left,
            signatures: logical_signatures(),
            eval: eval_or,
        },
        OperatorSpec {
            symbol: "xor",
            form: Infix,
            precedence: 12,
            associativity: Left,
            signatures: logical_signatures(),
            eval: eval_xor,
        },
        OperatorSpec {
            symbol: "implies",
            form: Infix,
            precedence: 13,
            associativity: Right,
            signatures: logical_signatures(),
            eval: eval_implies,
        },
        OperatorSpec {
            symbol: "+",
            form: Prefix,
            precedence: 3,
            associativity: Right,
            signatures: vec![
                OperatorSignature::prefix(
                    TypeInfo::singleton(TypeKind::Integer),
                    SignatureType::LeftType,
                ),
                OperatorSignature::prefix(
                    TypeInfo::singleton(TypeKind::Decimal),
                    SignatureType::LeftType,
                ),
                OperatorSignature::prefix(
                    TypeInfo::singleton(TypeKind::Quantity),
                    SignatureType::LeftType,
                ),
            ],
            eval: eval_unary_plus,
        },
        OperatorSpec {
            symbol: "-",
            form: Prefix,
            precedence: 3,
            associativity: Right,
            signatures: vec![
                OperatorSignature::prefix(
                    TypeInfo::singleton(TypeKind::Integer),
                    SignatureType::LeftType,
                ),
                OperatorSignature::prefix(
                    TypeInfo::singleton(TypeKind::Decimal),
                    SignatureType::LeftType,
                ),
                OperatorSignature::prefix(
                    TypeInfo::singleton(TypeKind::Quantity),
                    SignatureType::LeftType,
                ),
            ],
            eval: eval_unary_minus,
        },
        OperatorSpec {
            symbol: "not",
            form: Prefix,
            precedence: 3,
            associativity: Right,
            signatures: vec![OperatorSignature::prefix(
                TypeInfo::singleton(TypeKind::Boolean),
                SignatureType::fixed(TypeKind::Boolean),
            )],
            eval: eval_not,
        },
    ];

    for spec in specs {
        registry.register(Operator {
            symbol: spec.symbol,
            form: spec.form,
            precedence: spec.precedence,
            associativity: spec.associativity,
            signatures: spec.signatures,
            eval: spec.eval,
        })?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    fn ints(values: &[i64]) -> Collection {
        Collection::from_vec(values.iter().map(|v| FhirPathValue::Integer(*v)).collect())
    }

    fn tri(collection: &Collection) -> TriState {
        boolean_of(collection).unwrap()
    }

    #[test]
    fn addition_preserves_integer_type() {
        let out = eval_add(&ints(&[1]), &ints(&[2])).unwrap();
        assert_eq!(out.first().unwrap().as_integer(), Some(3));
    }

    #[test]
    fn empty_operand_propagates() {
        assert!(eval_add(&Collection::empty(), &ints(&[2])).unwrap().is_empty());
        assert!(eval_less(&ints(&[2]), &Collection::empty()).unwrap().is_empty());
    }

    #[test]
    fn multiple_items_raise() {
        assert!(eval_add(&ints(&[1, 2]), &ints(&[3])).is_err());
    }

    #[test]
    fn division_by_zero_is_empty() {
        assert!(eval_divide(&ints(&[1]), &ints(&[0])).unwrap().is_empty());
        assert!(eval_integer_divide(&ints(&[1]), &ints(&[0])).unwrap().is_empty());
        assert!(eval_modulo(&ints(&[1]), &ints(&[0])).unwrap().is_empty());
    }

    #[test]
    fn division_always_yields_decimal() {
        let out = eval_divide(&ints(&[7]), &ints(&[2])).unwrap();
        assert!(matches!(out.first(), Some(FhirPathValue::Decimal(_))));
    }

    #[test]
    fn integer_division_truncates() {
        let out = eval_integer_divide(&ints(&[7]), &ints(&[2])).unwrap();
        assert_eq!(out.first().unwrap().as_integer(), Some(3));
        let neg = eval_integer_divide(&ints(&[-7]), &ints(&[2])).unwrap();
        assert_eq!(neg.first().unwrap().as_integer(), Some(-3));
    }

    #[test]
    fn concatenation_treats_empty_as_empty_string() {
        let out = eval_concatenate(
            &Collection::empty(),
            &Collection::singleton(FhirPathValue::String("x".into())),
        )
        .unwrap();
        assert_eq!(out.first().unwrap().as_string(), Some("x"));
    }

    #[test]
    fn quantity_unit_mismatch_is_an_error() {
        let mg = Collection::singleton(FhirPathValue::Quantity(Quantity::new(
            1.into(),
            Some("mg".into()),
        )));
        let kg = Collection::singleton(FhirPathValue::Quantity(Quantity::new(
            1.into(),
            Some("kg".into()),
        )));
        assert!(eval_add(&mg, &kg).is_err());
        assert!(eval_less(&mg, &kg).is_err());
    }

    #[rstest]
    #[case(TriState::True, TriState::True, TriState::True)]
    #[case(TriState::True, TriState::Empty, TriState::Empty)]
    #[case(TriState::False, TriState::Empty, TriState::False)]
    #[case(TriState::Empty, TriState::Empty, TriState::Empty)]
    fn and_truth_table(#[case] a: TriState, #[case] b: TriState, #[case] expected: TriState) {
        assert_eq!(a.and(b), expected);
    }

    #[rstest]
    #[case(TriState::True, TriState::Empty, TriState::True)]
    #[case(TriState::False, TriState::Empty, TriState::Empty)]
    #[case(TriState::False, TriState::False, TriState::False)]
    fn or_truth_table(#[case] a: TriState, #[case] b: TriState, #[case] expected: TriState) {
        assert_eq!(a.or(b), expected);
    }

    #[rstest]
    #[case(TriState::False, TriState::Empty, TriState::True)]
    #[case(TriState::True, TriState::Empty, TriState::Empty)]
    #[case(TriState::Empty, TriState::True, TriState::True)]
    #[case(TriState::Empty, TriState::False, TriState::Empty)]
    fn implies_truth_table(#[case] a: TriState, #[case] b: TriState, #[case] expected: TriState) {
        assert_eq!(a.implies(b), expected);
    }

    #[test]
    fn existence_coercion_to_boolean() {
        let c = Collection::singleton(FhirPathValue::String("x".into()));
        assert_eq!(tri(&c), TriState::True);
        assert_eq!(tri(&Collection::empty()), TriState::Empty);
        assert!(boolean_of(&ints(&[1, 2])).is_err());
    }

    #[test]
    fn equality_on_collections_is_ordered() {
        assert_eq!(tri(&eval_equal(&ints(&[1, 2]), &ints(&[1, 2])).unwrap()), TriState::True);
        assert_eq!(tri(&eval_equal(&ints(&[1, 2]), &ints(&[2, 1])).unwrap()), TriState::False);
        assert!(eval_equal(&ints(&[1]), &Collection::empty()).unwrap().is_empty());
    }

    #[test]
    fn equivalence_is_unordered_and_empty_safe() {
        assert_eq!(
            tri(&eval_equivalent(&ints(&[1, 2]), &ints(&[2, 1])).unwrap()),
            TriState::True
        );
        assert_eq!(
            tri(&eval_equivalent(&Collection::empty(), &Collection::empty()).unwrap()),
            TriState::True
        );
    }

    #[test]
    fn membership() {
        assert_eq!(tri(&eval_in(&ints(&[2]), &ints(&[1, 2, 3])).unwrap()), TriState::True);
        assert!(eval_in(&Collection::empty(), &ints(&[1])).unwrap().is_empty());
        assert_eq!(
            tri(&eval_contains(&ints(&[1, 2, 3]), &ints(&[3])).unwrap()),
            TriState::True
        );
    }

    #[test]
    fn union_deduplicates() {
        let out = eval_union(&ints(&[1, 2]), &ints(&[2, 3])).unwrap();
        assert_eq!(out.len(), 3);
    }

    #[test]
    fn date_plus_calendar_quantity() {
        let date = Collection::singleton(FhirPathValue::Date(
            chrono::NaiveDate::from_ymd_opt(2023, 1, 31).unwrap(),
        ));
        let month = Collection::singleton(FhirPathValue::Quantity(Quantity::new(
            1.into(),
            Some("month".into()),
        )));
        let out = eval_add(&date, &month).unwrap();
        assert_eq!(
            out.first().unwrap().to_string(),
            "2023-02-28"
        );
    }
}
