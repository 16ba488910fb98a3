//! Operator and function signature metadata
//!
//! Signatures drive the analyzer's applicability checks and carry the
//! argument-evaluation discipline for the interpreter: `value` parameters
//! are pre-evaluated by the caller, `expression` parameters are handed to
//! the function as unevaluated AST.

use crate::model::{TypeInfo, TypeKind};

/// How an argument reaches the function
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParameterKind {
    /// Evaluated by the caller, passed as a collection
    Value,
    /// Passed as AST; the function controls when and against what focus it
    /// is evaluated
    Expression,
}

/// A declared parameter
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterInfo {
    /// Parameter name, for diagnostics
    pub name: &'static str,
    /// Evaluation discipline
    pub kind: ParameterKind,
    /// Declared type of value parameters (`Any` for expression parameters)
    pub param_type: TypeInfo,
    /// True when the argument may be omitted
    pub optional: bool,
}

impl ParameterInfo {
    /// Required value parameter
    pub fn value(name: &'static str, param_type: TypeInfo) -> Self {
        Self {
            name,
            kind: ParameterKind::Value,
            param_type,
            optional: false,
        }
    }

    /// Optional value parameter
    pub fn optional_value(name: &'static str, param_type: TypeInfo) -> Self {
        Self {
            name,
            kind: ParameterKind::Value,
            param_type,
            optional: true,
        }
    }

    /// Required expression parameter
    pub fn expression(name: &'static str) -> Self {
        Self {
            name,
            kind: ParameterKind::Expression,
            param_type: TypeInfo::any(),
            optional: false,
        }
    }

    /// Optional expression parameter
    pub fn optional_expression(name: &'static str) -> Self {
        Self {
            name,
            kind: ParameterKind::Expression,
            param_type: TypeInfo::any(),
            optional: true,
        }
    }
}

/// A result (or operand) type: fixed, or resolved dynamically from the
/// call's input/operand/parameter types
#[derive(Debug, Clone, PartialEq)]
pub enum SignatureType {
    /// A concrete type
    Fixed(TypeInfo),
    /// The function input's (receiver's) type
    InputType,
    /// The element type of the input: same base, singleton cardinality
    InputElementType,
    /// The left operand's type
    LeftType,
    /// The right operand's type
    RightType,
    /// The first parameter's inferred type
    ParameterType,
}

impl SignatureType {
    /// Shorthand for a fixed singleton of a primitive kind
    pub fn fixed(kind: TypeKind) -> Self {
        SignatureType::Fixed(TypeInfo::singleton(kind))
    }

    /// Shorthand for a fixed collection of a primitive kind
    pub fn fixed_collection(kind: TypeKind) -> Self {
        SignatureType::Fixed(TypeInfo::collection(kind))
    }

    /// Resolve against the dynamic types at a use site
    pub fn resolve(
        &self,
        input: Option<&TypeInfo>,
        left: Option<&TypeInfo>,
        right: Option<&TypeInfo>,
        parameter: Option<&TypeInfo>,
    ) -> TypeInfo {
        match self {
            SignatureType::Fixed(t) => t.clone(),
            SignatureType::InputType => input.cloned().unwrap_or_else(TypeInfo::any),
            SignatureType::InputElementType => {
                input.map(TypeInfo::element).unwrap_or_else(TypeInfo::any)
            }
            SignatureType::LeftType => left.cloned().unwrap_or_else(TypeInfo::any),
            SignatureType::RightType => right.cloned().unwrap_or_else(TypeInfo::any),
            SignatureType::ParameterType => parameter.cloned().unwrap_or_else(TypeInfo::any),
        }
    }
}

/// A function's declared shape
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionSignature {
    /// Function name
    pub name: &'static str,
    /// Declared parameters, required before optional
    pub parameters: Vec<ParameterInfo>,
    /// Result type
    pub result: SignatureType,
    /// Declared input (receiver) type, when constrained
    pub input: Option<TypeInfo>,
    /// Shortcut to empty output on empty input, without evaluating
    /// arguments
    pub propagates_empty: bool,
}

impl FunctionSignature {
    /// Start a signature; the default result is `Any` and the input is
    /// unconstrained
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            parameters: Vec::new(),
            result: SignatureType::Fixed(TypeInfo::any()),
            input: None,
            propagates_empty: false,
        }
    }

    /// Append a parameter
    pub fn parameter(mut self, parameter: ParameterInfo) -> Self {
        self.parameters.push(parameter);
        self
    }

    /// Set the result type
    pub fn returns(mut self, result: SignatureType) -> Self {
        self.result = result;
        self
    }

    /// Constrain the input (receiver) type
    pub fn input(mut self, input: TypeInfo) -> Self {
        self.input = Some(input);
        self
    }

    /// Mark as empty-propagating
    pub fn propagates_empty(mut self) -> Self {
        self.propagates_empty = true;
        self
    }

    /// Minimum number of arguments
    pub fn min_arity(&self) -> usize {
        self.parameters.iter().filter(|p| !p.optional).count()
    }

    /// Maximum number of arguments
    pub fn max_arity(&self) -> usize {
        self.parameters.len()
    }

    /// True when `count` arguments satisfy the arity
    pub fn accepts_arity(&self, count: usize) -> bool {
        count >= self.min_arity() && count <= self.max_arity()
    }
}

/// One overload of an operator: operand types and result
#[derive(Debug, Clone, PartialEq)]
pub struct OperatorSignature {
    /// Left operand type (the only operand for prefix operators)
    pub left: TypeInfo,
    /// Right operand type; absent for prefix operators
    pub right: Option<TypeInfo>,
    /// Result type
    pub result: SignatureType,
}

impl OperatorSignature {
    /// Infix overload
    pub fn infix(left: TypeInfo, right: TypeInfo, result: SignatureType) -> Self {
        Self {
            left,
            right: Some(right),
            result,
        }
    }

    /// Prefix overload
    pub fn prefix(operand: TypeInfo, result: SignatureType) -> Self {
        Self {
            left: operand,
            right: None,
            result,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arity_counts_optional_parameters() {
        let sig = FunctionSignature::new("substring")
            .parameter(ParameterInfo::value(
                "start",
                TypeInfo::singleton(TypeKind::Integer),
            ))
            .parameter(ParameterInfo::optional_value(
                "length",
                TypeInfo::singleton(TypeKind::Integer),
            ));
        assert_eq!(sig.min_arity(), 1);
        assert_eq!(sig.max_arity(), 2);
        assert!(sig.accepts_arity(1));
        assert!(sig.accepts_arity(2));
        assert!(!sig.accepts_arity(0));
        assert!(!sig.accepts_arity(3));
    }

    #[test]
    fn dynamic_result_resolution() {
        let input = TypeInfo::collection(TypeKind::String);
        let resolved = SignatureType::InputType.resolve(Some(&input), None, None, None);
        assert_eq!(resolved, input);
        let element = SignatureType::InputElementType.resolve(Some(&input), None, None, None);
        assert!(element.singleton);
    }
}
