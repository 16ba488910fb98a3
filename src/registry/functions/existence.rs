//! Boolean existence aggregates over collections of Booleans

use super::super::{
    FunctionArg, FunctionContext, FunctionOutput, FunctionRegistry, FunctionSignature,
    RegistryError, SignatureType,
};
use crate::evaluator::{EvalResult, EvaluationError};
use crate::model::{Collection, FhirPathValue, TypeKind};

pub(super) fn register(registry: &mut FunctionRegistry) -> Result<(), RegistryError> {
    registry.register(
        FunctionSignature::new("allTrue").returns(SignatureType::fixed(TypeKind::Boolean)),
        |ctx, _| aggregate(ctx, "allTrue", |bools| bools.iter().all(|b| *b)),
    )?;
    registry.register(
        FunctionSignature::new("anyTrue").returns(SignatureType::fixed(TypeKind::Boolean)),
        |ctx, _| aggregate(ctx, "anyTrue", |bools| bools.iter().any(|b| *b)),
    )?;
    registry.register(
        FunctionSignature::new("allFalse").returns(SignatureType::fixed(TypeKind::Boolean)),
        |ctx, _| aggregate(ctx, "allFalse", |bools| bools.iter().all(|b| !*b)),
    )?;
    registry.register(
        FunctionSignature::new("anyFalse").returns(SignatureType::fixed(TypeKind::Boolean)),
        |ctx, _| aggregate(ctx, "anyFalse", |bools| bools.iter().any(|b| !*b)),
    )?;
    Ok(())
}

fn aggregate(
    ctx: &FunctionContext<'_>,
    what: &str,
    f: impl Fn(&[bool]) -> bool,
) -> EvalResult<FunctionOutput> {
    let bools: Vec<bool> = ctx
        .input
        .iter()
        .map(|v| {
            v.as_boolean().ok_or_else(|| {
                EvaluationError::new(format!(
                    "{what} expects a collection of Booleans, found {}",
                    v.type_name()
                ))
            })
        })
        .collect::<EvalResult<_>>()?;
    Ok(FunctionOutput::of(Collection::singleton(
        FhirPathValue::Boolean(f(&bools)),
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

    fn bools(values: &[bool]) -> Collection {
        Collection::from_vec(values.iter().map(|b| FhirPathValue::Boolean(*b)).collect())
    }

    fn run(input: Collection, what: &str, f: impl Fn(&[bool]) -> bool) -> Option<bool> {
        let context = EvaluationContext::new(input.share());
        let fctx = FunctionContext {
            evaluator: &NullEvaluator,
            context: &context,
            input: &input,
        };
        aggregate(&fctx, what, f)
            .unwrap()
            .value
            .first()
            .and_then(FhirPathValue::as_boolean)
    }

    #[test]
    fn vacuous_truth_on_empty_input() {
        assert_eq!(run(Collection::empty(), "allTrue", |b| b.iter().all(|x| *x)), Some(true));
        assert_eq!(run(Collection::empty(), "anyTrue", |b| b.iter().any(|x| *x)), Some(false));
    }

    #[test]
    fn mixed_booleans() {
        assert_eq!(
            run(bools(&[true, false]), "allTrue", |b| b.iter().all(|x| *x)),
            Some(false)
        );
        assert_eq!(
            run(bools(&[true, false]), "anyFalse", |b| b.iter().any(|x| !*x)),
            Some(true)
        );
    }

    #[test]
    fn non_boolean_input_is_an_error() {
        let input = Collection::singleton(FhirPathValue::Integer(1));
        let context = EvaluationContext::new(input.share());
        let fctx = FunctionContext {
            evaluator: &NullEvaluator,
            context: &context,
            input: &input,
        };
        assert!(aggregate(&fctx, "allTrue", |b| b.iter().all(|x| *x)).is_err());
    }
}
