//! Current date/time functions
//!
//! `today()`, `now()` and `timeOfDay()` are the impure built-ins: two
//! evaluations of the same expression may differ across a clock tick. They
//! take no input: whatever focus reaches them is ignored.

use super::super::{
    FunctionArg, FunctionContext, FunctionOutput, FunctionRegistry, FunctionSignature,
    RegistryError, SignatureType,
};
use crate::evaluator::EvalResult;
use crate::model::{Collection, FhirPathValue, TypeKind};
use chrono::Local;

pub(super) fn register(registry: &mut FunctionRegistry) -> Result<(), RegistryError> {
    registry.register(
        FunctionSignature::new("today").returns(SignatureType::fixed(TypeKind::Date)),
        eval_today,
    )?;
    registry.register(
        FunctionSignature::new("now").returns(SignatureType::fixed(TypeKind::DateTime)),
        eval_now,
    )?;
    registry.register(
        FunctionSignature::new("timeOfDay").returns(SignatureType::fixed(TypeKind::Time)),
        eval_time_of_day,
    )?;
    Ok(())
}

fn eval_today(_ctx: &FunctionContext<'_>, _args: &[FunctionArg<'_>]) -> EvalResult<FunctionOutput> {
    Ok(FunctionOutput::of(Collection::singleton(
        FhirPathValue::Date(Local::now().date_naive()),
    )))
}

fn eval_now(_ctx: &FunctionContext<'_>, _args: &[FunctionArg<'_>]) -> EvalResult<FunctionOutput> {
    Ok(FunctionOutput::of(Collection::singleton(
        FhirPathValue::DateTime(Local::now().fixed_offset()),
    )))
}

fn eval_time_of_day(
    _ctx: &FunctionContext<'_>,
    _args: &[FunctionArg<'_>],
) -> EvalResult<FunctionOutput> {
    Ok(FunctionOutput::of(Collection::singleton(
        FhirPathValue::Time(Local::now().time()),
    )))
}
