//! Tree-walking interpreter
//!
//! Evaluation follows the stream-processing model: every node maps
//! `(focus, context)` to `(output, context)`. Dispatch is an exhaustive
//! match over the node kind. Graceful degradation throughout: property
//! misses, failed casts and out-of-bounds indexing yield empty collections;
//! only genuine semantic violations raise [`EvaluationError`].

use super::context::{Evaluated, EvaluationContext};
use super::error::{EvalResult, EvaluationError};
use crate::ast::{
    BinaryData, BinaryOperator, Expression, ExpressionNode, FunctionData, LiteralValue,
};
use crate::model::{
    Collection, FhirPathValue, Quantity, parse_date, parse_datetime, parse_time,
};
use crate::registry::functions::{cast_value, matches_type};
use crate::registry::{
    ExpressionEvaluator, FunctionArg, FunctionContext, FunctionRegistry, OperatorForm,
    OperatorRegistry, ParameterKind, TriState, boolean_of,
};
use rust_decimal::Decimal;
use rustc_hash::FxHashMap;
use std::str::FromStr;
use std::sync::Arc;

/// A user-supplied function: `(context, input, evaluated args) -> output`
pub type CustomFunction =
    Arc<dyn Fn(&EvaluationContext, &Collection, &[Collection]) -> EvalResult<Collection> + Send + Sync>;

/// The interpreter: registries plus optional custom functions.
///
/// Cheap to construct per evaluation; all state is borrowed and shared.
pub struct Interpreter<'a> {
    functions: &'a FunctionRegistry,
    operators: &'a OperatorRegistry,
    custom_functions: Option<&'a FxHashMap<String, CustomFunction>>,
}

impl<'a> Interpreter<'a> {
    /// Create an interpreter over the given registries
    pub fn new(functions: &'a FunctionRegistry, operators: &'a OperatorRegistry) -> Self {
        Self {
            functions,
            operators,
            custom_functions: None,
        }
    }

    /// Attach a custom-function map; custom names take precedence over the
    /// registry
    pub fn with_custom_functions(
        mut self,
        custom_functions: &'a FxHashMap<String, CustomFunction>,
    ) -> Self {
        self.custom_functions = Some(custom_functions);
        self
    }

    /// Evaluate an expression against a focus and context
    pub fn evaluate(
        &self,
        expr: &Expression,
        focus: &Collection,
        context: &EvaluationContext,
    ) -> EvalResult<Evaluated> {
        match &expr.node {
            ExpressionNode::Literal(literal) => Ok(Evaluated::value(
                literal_collection(literal).map_err(|e| e.at(expr.range.start))?,
                context.clone(),
            )),
            ExpressionNode::Identifier(name) | ExpressionNode::TypeOrIdentifier(name) => {
                Ok(Evaluated::value(navigate(name, focus), context.clone()))
            }
            ExpressionNode::Variable(name) => Ok(Evaluated::value(
                self.variable(name, focus, context),
                context.clone(),
            )),
            ExpressionNode::Binary(data) => self.eval_binary(expr, data, focus, context),
            ExpressionNode::Unary { op, operand } => {
                let inner = self.evaluate(operand, focus, context)?;
                let operator = self
                    .operators
                    .lookup_operator(op.symbol(), OperatorForm::Prefix)
                    .ok_or_else(|| {
                        EvaluationError::new(format!("unknown prefix operator '{op}'"))
                            .at(expr.range.start)
                    })?;
                let value = (operator.eval)(&inner.value, &Collection::empty())
                    .map_err(|e| e.at(expr.range.start))?;
                Ok(Evaluated::value(value, inner.context))
            }
            ExpressionNode::Index(data) => {
                // Base and index both see the original focus and context
                let base = self.evaluate(&data.base, focus, context)?;
                let index = self.evaluate(&data.index, focus, context)?;
                let operator = self
                    .operators
                    .lookup_operator("[]", OperatorForm::Postfix)
                    .ok_or_else(|| {
                        EvaluationError::new("unknown operator '[]'").at(expr.range.start)
                    })?;
                let value = (operator.eval)(&base.value, &index.value)
                    .map_err(|e| e.at(expr.range.start))?;
                Ok(Evaluated::value(value, base.context))
            }
            ExpressionNode::Function(data) => self.eval_function(expr, data, focus, context),
            ExpressionNode::Collection(elements) => {
                let mut out = Vec::new();
                let mut current = context.clone();
                for element in elements {
                    let step = self.evaluate(element, focus, &current)?;
                    out.extend(step.value.iter().cloned());
                    current = step.context;
                }
                Ok(Evaluated::value(Collection::from_vec(out), current))
            }
            ExpressionNode::MembershipTest(data) => {
                let inner = self.evaluate(&data.expression, focus, context)?;
                let value = if inner.value.is_empty() {
                    Collection::empty()
                } else {
                    let holds = inner
                        .value
                        .iter()
                        .all(|v| matches_type(v, &data.type_name));
                    Collection::singleton(FhirPathValue::Boolean(holds))
                };
                Ok(Evaluated::value(value, inner.context))
            }
            ExpressionNode::TypeCast(data) => {
                let inner = self.evaluate(&data.expression, focus, context)?;
                let out: Vec<FhirPathValue> = inner
                    .value
                    .iter()
                    .filter_map(|v| cast_value(v, &data.type_name))
                    .collect();
                Ok(Evaluated::value(Collection::from_vec(out), inner.context))
            }
            // Type references only appear in argument position
            ExpressionNode::TypeReference(_) => {
                Ok(Evaluated::value(Collection::empty(), context.clone()))
            }
            ExpressionNode::Error(data) => Err(EvaluationError::new(format!(
                "cannot evaluate expression with parse errors: {}",
                data.message
            ))
            .at(expr.range.start)),
        }
    }

    fn variable(
        &self,
        name: &str,
        focus: &Collection,
        context: &EvaluationContext,
    ) -> Collection {
        match name {
            "$this" => context.this_or(focus),
            "$index" => context
                .index()
                .map(|i| Collection::singleton(FhirPathValue::Integer(i)))
                .unwrap_or_else(Collection::empty),
            "$total" => context
                .total()
                .map(Collection::share)
                .unwrap_or_else(Collection::empty),
            _ => {
                let bare = name.strip_prefix('%').unwrap_or(name);
                context
                    .variable(bare)
                    .map(Collection::share)
                    .unwrap_or_else(Collection::empty)
            }
        }
    }

    fn eval_binary(
        &self,
        expr: &Expression,
        data: &BinaryData,
        focus: &Collection,
        context: &EvaluationContext,
    ) -> EvalResult<Evaluated> {
        match data.op {
            // The dot threads output and context left to right
            BinaryOperator::Navigation => {
                let left = self.evaluate(&data.left, focus, context)?;
                self.evaluate(&data.right, &left.value, &left.context)
            }
            // Both sides of a union see the original input and context;
            // bindings made on the left never leak into the right
            BinaryOperator::Union => {
                let left = self.evaluate(&data.left, focus, context)?;
                let right = self.evaluate(&data.right, focus, context)?;
                Ok(Evaluated::value(
                    left.value.union(&right.value),
                    context.clone(),
                ))
            }
            op => {
                let left = self.evaluate(&data.left, focus, context)?;
                // Short-circuit when the left operand alone decides
                if let Some(decided) = short_circuit(op, &left.value)? {
                    return Ok(Evaluated::value(decided, left.context));
                }
                let right = self.evaluate(&data.right, focus, &left.context)?;
                let operator = self
                    .operators
                    .lookup_operator(op.symbol(), OperatorForm::Infix)
                    .ok_or_else(|| {
                        EvaluationError::new(format!("unknown operator '{op}'"))
                            .at(expr.range.start)
                    })?;
                let value = (operator.eval)(&left.value, &right.value)
                    .map_err(|e| e.at(expr.range.start))?;
                Ok(Evaluated::value(value, right.context))
            }
        }
    }

    fn eval_function(
        &self,
        expr: &Expression,
        data: &FunctionData,
        focus: &Collection,
        context: &EvaluationContext,
    ) -> EvalResult<Evaluated> {
        let name = data.name().ok_or_else(|| {
            EvaluationError::new("function callee must be a name").at(expr.range.start)
        })?;

        // Method-call syntax: the receiver's output becomes the input
        let (input, context) = match data.receiver() {
            Some(receiver) => {
                let evaluated = self.evaluate(receiver, focus, context)?;
                (evaluated.value, evaluated.context)
            }
            None => (focus.share(), context.clone()),
        };

        // Custom functions shadow the registry and take evaluated arguments
        if let Some(custom) = self.custom_functions.and_then(|m| m.get(name)) {
            let mut args = Vec::with_capacity(data.arguments.len());
            for arg in &data.arguments {
                args.push(self.evaluate(arg, focus, &context)?.value);
            }
            let value =
                custom(&context, &input, &args).map_err(|e| e.at(expr.range.start))?;
            return Ok(Evaluated::value(value, context));
        }

        let function = self.functions.lookup(name).ok_or_else(|| {
            EvaluationError::new(format!("unknown function '{name}'")).at(expr.range.start)
        })?;

        if !function.signature.accepts_arity(data.arguments.len()) {
            return Err(EvaluationError::new(format!(
                "function '{name}' expects {}..{} arguments, found {}",
                function.signature.min_arity(),
                function.signature.max_arity(),
                data.arguments.len()
            ))
            .at(expr.range.start));
        }

        if function.signature.propagates_empty && input.is_empty() {
            return Ok(Evaluated::value(Collection::empty(), context));
        }

        // Value parameters are pre-evaluated against the call-site focus;
        // expression parameters pass through as AST
        let mut args: Vec<FunctionArg<'_>> = Vec::with_capacity(data.arguments.len());
        for (i, arg) in data.arguments.iter().enumerate() {
            let kind = function
                .signature
                .parameters
                .get(i)
                .map(|p| p.kind)
                .unwrap_or(ParameterKind::Value);
            match kind {
                ParameterKind::Value => {
                    args.push(FunctionArg::Value(self.evaluate(arg, focus, &context)?.value));
                }
                ParameterKind::Expression => args.push(FunctionArg::Expression(arg)),
            }
        }

        let fctx = FunctionContext {
            evaluator: self,
            context: &context,
            input: &input,
        };
        let output = (function.eval)(&fctx, &args).map_err(|e| e.at(expr.range.start))?;
        let context = output.context.unwrap_or(context);
        Ok(Evaluated::value(output.value, context))
    }
}

impl ExpressionEvaluator for Interpreter<'_> {
    fn evaluate_expression(
        &self,
        expr: &Expression,
        focus: &Collection,
        context: &EvaluationContext,
    ) -> EvalResult<Evaluated> {
        self.evaluate(expr, focus, context)
    }
}

/// Logical operators may skip the right side when the left decides the
/// outcome under three-valued logic
fn short_circuit(op: BinaryOperator, left: &Collection) -> EvalResult<Option<Collection>> {
    let decided = match op {
        BinaryOperator::And => {
            (boolean_of(left)? == TriState::False).then(|| TriState::False.to_collection())
        }
        BinaryOperator::Or => {
            (boolean_of(left)? == TriState::True).then(|| TriState::True.to_collection())
        }
        BinaryOperator::Implies => {
            (boolean_of(left)? == TriState::False).then(|| TriState::True.to_collection())
        }
        _ => None,
    };
    Ok(decided)
}

fn literal_collection(literal: &LiteralValue) -> EvalResult<Collection> {
    let value = match literal {
        LiteralValue::Null => return Ok(Collection::empty()),
        LiteralValue::Boolean(b) => FhirPathValue::Boolean(*b),
        LiteralValue::Integer(i) => FhirPathValue::Integer(*i),
        LiteralValue::Decimal(text) => FhirPathValue::Decimal(
            Decimal::from_str(text)
                .map_err(|_| EvaluationError::new(format!("invalid decimal literal '{text}'")))?,
        ),
        LiteralValue::String(s) => FhirPathValue::String(s.clone()),
        LiteralValue::Date(text) => FhirPathValue::Date(
            parse_date(text)
                .ok_or_else(|| EvaluationError::new(format!("invalid date literal '@{text}'")))?,
        ),
        LiteralValue::DateTime(text) => FhirPathValue::DateTime(parse_datetime(text).ok_or_else(
            || EvaluationError::new(format!("invalid datetime literal '@{text}'")),
        )?),
        LiteralValue::Time(text) => FhirPathValue::Time(
            parse_time(text)
                .ok_or_else(|| EvaluationError::new(format!("invalid time literal '@T{text}'")))?,
        ),
        LiteralValue::Quantity { value, unit } => {
            let value = Decimal::from_str(value).map_err(|_| {
                EvaluationError::new(format!("invalid quantity literal '{value}'"))
            })?;
            FhirPathValue::Quantity(Quantity::new(value, Some(unit.clone())))
        }
    };
    Ok(Collection::singleton(value))
}

/// Property navigation / resource-type filter for an identifier step
fn navigate(name: &str, focus: &Collection) -> Collection {
    // An uppercase identifier acts as a type filter when the focus holds a
    // resource of that type
    if name.chars().next().is_some_and(char::is_uppercase) {
        let is_filter = focus.iter().any(|v| {
            v.as_resource()
                .and_then(|json| json.get("resourceType"))
                .and_then(|rt| rt.as_str())
                .is_some_and(|rt| rt == name)
        });
        if is_filter {
            return Collection::from_vec(
                focus
                    .iter()
                    .filter(|v| {
                        v.as_resource()
                            .and_then(|json| json.get("resourceType"))
                            .and_then(|rt| rt.as_str())
                            .is_some_and(|rt| rt == name)
                    })
                    .cloned()
                    .collect(),
            );
        }
    }

    let mut out = Vec::new();
    for item in focus.iter() {
        match item {
            // type() results expose namespace/name as pseudo-properties
            FhirPathValue::TypeInfoObject { namespace, .. } if name == "namespace" => {
                out.push(FhirPathValue::String(namespace.clone()));
            }
            FhirPathValue::TypeInfoObject { name: type_name, .. } if name == "name" => {
                out.push(FhirPathValue::String(type_name.clone()));
            }
            _ => {
                if let Some(json) = item.property(name) {
                    crate::model::append_json(&mut out, json);
                }
            }
        }
    }
    Collection::from_vec(out)
}
