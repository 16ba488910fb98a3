//! Expression AST node definitions
//!
//! Every node carries its source `Range` and, after analysis, an inferred
//! `TypeInfo`. Large variants are boxed to keep the enum small; argument
//! lists use `SmallVec` for the common case of few arguments.

use crate::ast::operator::{BinaryOperator, UnaryOperator};
use crate::diagnostics::Severity;
use crate::model::TypeInfo;
use crate::parser::Range;
use smallvec::SmallVec;

/// A FHIRPath expression: node payload plus source range and the type
/// annotation filled in by the analyzer.
#[derive(Debug, Clone, PartialEq)]
pub struct Expression {
    /// The node payload
    pub node: ExpressionNode,
    /// Source range covered by this node; children never extend beyond it
    pub range: Range,
    /// Inferred type, populated by the analyzer
    pub type_info: Option<TypeInfo>,
}

impl Expression {
    /// Create an expression with no type annotation
    pub fn new(node: ExpressionNode, range: Range) -> Self {
        Self {
            node,
            range,
            type_info: None,
        }
    }

    /// The identifier name, for `Identifier` and `TypeOrIdentifier` nodes
    pub fn as_identifier(&self) -> Option<&str> {
        match &self.node {
            ExpressionNode::Identifier(name) | ExpressionNode::TypeOrIdentifier(name) => {
                Some(name)
            }
            _ => None,
        }
    }

    /// True for `Error` nodes produced by recovery-mode parsing
    pub fn is_error(&self) -> bool {
        matches!(self.node, ExpressionNode::Error(_))
    }

    /// Walk this expression and all descendants, pre-order
    pub fn walk<'a>(&'a self, visit: &mut dyn FnMut(&'a Expression)) {
        visit(self);
        match &self.node {
            ExpressionNode::Literal(_)
            | ExpressionNode::Identifier(_)
            | ExpressionNode::TypeOrIdentifier(_)
            | ExpressionNode::Variable(_)
            | ExpressionNode::TypeReference(_)
            | ExpressionNode::Error(_) => {}
            ExpressionNode::Binary(data) => {
                data.left.walk(visit);
                data.right.walk(visit);
            }
            ExpressionNode::Unary { operand, .. } => operand.walk(visit),
            ExpressionNode::Index(data) => {
                data.base.walk(visit);
                data.index.walk(visit);
            }
            ExpressionNode::Function(data) => {
                data.callee.walk(visit);
                for arg in &data.arguments {
                    arg.walk(visit);
                }
            }
            ExpressionNode::Collection(elements) => {
                for element in elements {
                    element.walk(visit);
                }
            }
            ExpressionNode::MembershipTest(data) | ExpressionNode::TypeCast(data) => {
                data.expression.walk(visit);
            }
        }
    }
}

/// AST node variants
#[derive(Debug, Clone, PartialEq)]
pub enum ExpressionNode {
    /// Literal value
    Literal(LiteralValue),

    /// Lowercase identifier: property navigation or function name
    Identifier(String),

    /// Uppercase identifier: resource type filter or plain property,
    /// disambiguated during analysis/evaluation
    TypeOrIdentifier(String),

    /// `$this`, `$index`, `$total` or `%name` (the sigil is kept in the name)
    Variable(String),

    /// Binary operation, including `.` navigation and `|` union
    Binary(Box<BinaryData>),

    /// Unary prefix operation
    Unary {
        /// The operator
        op: UnaryOperator,
        /// The operand
        operand: Box<Expression>,
    },

    /// Postfix index access `base[index]`
    Index(Box<IndexData>),

    /// Function call; the callee is an identifier, or a `.`-binary for
    /// method-call syntax
    Function(Box<FunctionData>),

    /// Collection literal `{ e1, e2, .. }`
    Collection(Vec<Expression>),

    /// `expr is TypeName`
    MembershipTest(Box<TypeOpData>),

    /// `expr as TypeName`
    TypeCast(Box<TypeOpData>),

    /// Bare type name in argument position (`ofType(Patient)`)
    TypeReference(String),

    /// Placeholder emitted by error-recovery parsing
    Error(ErrorData),
}

/// Binary operation payload
#[derive(Debug, Clone, PartialEq)]
pub struct BinaryData {
    /// The operator
    pub op: BinaryOperator,
    /// Left operand
    pub left: Expression,
    /// Right operand
    pub right: Expression,
}

/// Index access payload
#[derive(Debug, Clone, PartialEq)]
pub struct IndexData {
    /// Collection being indexed
    pub base: Expression,
    /// 0-based index expression
    pub index: Expression,
}

/// Function call payload
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionData {
    /// Identifier, or `Binary(.)` whose right side names the method
    pub callee: Expression,
    /// Call arguments
    pub arguments: SmallVec<[Expression; 4]>,
}

impl FunctionData {
    /// The called function's name, looking through method-call syntax
    pub fn name(&self) -> Option<&str> {
        match &self.callee.node {
            ExpressionNode::Identifier(name) | ExpressionNode::TypeOrIdentifier(name) => {
                Some(name)
            }
            ExpressionNode::Binary(data) if data.op == BinaryOperator::Navigation => {
                data.right.as_identifier()
            }
            _ => None,
        }
    }

    /// The receiver expression for method-call syntax, if any
    pub fn receiver(&self) -> Option<&Expression> {
        match &self.callee.node {
            ExpressionNode::Binary(data) if data.op == BinaryOperator::Navigation => {
                Some(&data.left)
            }
            _ => None,
        }
    }
}

/// Type test / type cast payload
#[derive(Debug, Clone, PartialEq)]
pub struct TypeOpData {
    /// The tested or casted expression
    pub expression: Expression,
    /// Target type name, possibly qualified (`FHIR.Patient`)
    pub type_name: String,
}

/// Error node payload
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorData {
    /// What went wrong
    pub message: String,
    /// Diagnostic severity
    pub severity: Severity,
    /// Stable diagnostic code, when known
    pub code: Option<String>,
}

/// Literal values
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum LiteralValue {
    /// `true` / `false`
    Boolean(bool),
    /// Whole number
    Integer(i64),
    /// Decimal, kept as source text to preserve precision
    Decimal(String),
    /// Single-quoted string, escapes decoded
    String(String),
    /// `@`-date, source form without the `@`
    Date(String),
    /// `@`-datetime, source form without the `@`
    DateTime(String),
    /// `@T`-time, source form without the `@T`
    Time(String),
    /// Quantity: number plus unit
    Quantity {
        /// Numeric value as written
        value: String,
        /// Unit: calendar keyword or UCUM-style string
        unit: String,
    },
    /// `{}` empty/null literal
    Null,
}

impl Expression {
    /// Literal constructor
    pub fn literal(value: LiteralValue, range: Range) -> Self {
        Self::new(ExpressionNode::Literal(value), range)
    }

    /// Identifier constructor; uppercase-initial names become
    /// `TypeOrIdentifier`
    pub fn identifier(name: impl Into<String>, range: Range) -> Self {
        let name = name.into();
        let node = if name.chars().next().is_some_and(|c| c.is_uppercase()) {
            ExpressionNode::TypeOrIdentifier(name)
        } else {
            ExpressionNode::Identifier(name)
        };
        Self::new(node, range)
    }

    /// Variable constructor (`name` keeps its `$`/`%` sigil)
    pub fn variable(name: impl Into<String>, range: Range) -> Self {
        Self::new(ExpressionNode::Variable(name.into()), range)
    }

    /// Binary operation constructor; the range covers both operands
    pub fn binary(op: BinaryOperator, left: Expression, right: Expression) -> Self {
        let range = left.range.cover(&right.range);
        Self::new(
            ExpressionNode::Binary(Box::new(BinaryData { op, left, right })),
            range,
        )
    }

    /// Unary operation constructor
    pub fn unary(op: UnaryOperator, operand: Expression, range: Range) -> Self {
        Self::new(
            ExpressionNode::Unary {
                op,
                operand: Box::new(operand),
            },
            range,
        )
    }

    /// Index access constructor
    pub fn index(base: Expression, index: Expression, range: Range) -> Self {
        Self::new(
            ExpressionNode::Index(Box::new(IndexData { base, index })),
            range,
        )
    }

    /// Function call constructor
    pub fn function(
        callee: Expression,
        arguments: impl Into<SmallVec<[Expression; 4]>>,
        range: Range,
    ) -> Self {
        Self::new(
            ExpressionNode::Function(Box::new(FunctionData {
                callee,
                arguments: arguments.into(),
            })),
            range,
        )
    }

    /// Collection literal constructor
    pub fn collection(elements: Vec<Expression>, range: Range) -> Self {
        Self::new(ExpressionNode::Collection(elements), range)
    }

    /// `is` test constructor
    pub fn membership_test(
        expression: Expression,
        type_name: impl Into<String>,
        range: Range,
    ) -> Self {
        Self::new(
            ExpressionNode::MembershipTest(Box::new(TypeOpData {
                expression,
                type_name: type_name.into(),
            })),
            range,
        )
    }

    /// `as` cast constructor
    pub fn type_cast(expression: Expression, type_name: impl Into<String>, range: Range) -> Self {
        Self::new(
            ExpressionNode::TypeCast(Box::new(TypeOpData {
                expression,
                type_name: type_name.into(),
            })),
            range,
        )
    }

    /// Error node constructor (recovery mode only)
    pub fn error(message: impl Into<String>, range: Range) -> Self {
        Self::new(
            ExpressionNode::Error(ErrorData {
                message: message.into(),
                severity: Severity::Error,
                code: Some("parse-error".to_string()),
            }),
            range,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::{Position, Range};

    fn r(a: usize, b: usize) -> Range {
        Range::new(
            Position::new(1, a as u32 + 1, a),
            Position::new(1, b as u32 + 1, b),
        )
    }

    #[test]
    fn identifier_case_classification() {
        assert!(matches!(
            Expression::identifier("name", r(0, 4)).node,
            ExpressionNode::Identifier(_)
        ));
        assert!(matches!(
            Expression::identifier("Patient", r(0, 7)).node,
            ExpressionNode::TypeOrIdentifier(_)
        ));
    }

    #[test]
    fn binary_range_covers_operands() {
        let left = Expression::identifier("a", r(0, 1));
        let right = Expression::identifier("b", r(4, 5));
        let bin = Expression::binary(BinaryOperator::Add, left, right);
        assert_eq!(bin.range, r(0, 5));
    }

    #[test]
    fn function_name_through_method_call() {
        let recv = Expression::identifier("name", r(0, 4));
        let method = Expression::identifier("given", r(5, 10));
        let callee = Expression::binary(BinaryOperator::Navigation, recv, method);
        let call = Expression::function(callee, Vec::<Expression>::new(), r(0, 12));
        if let ExpressionNode::Function(data) = &call.node {
            assert_eq!(data.name(), Some("given"));
            assert!(data.receiver().is_some());
        } else {
            panic!("expected Function");
        }
    }

    #[test]
    fn walk_visits_all_nodes() {
        let expr = Expression::binary(
            BinaryOperator::And,
            Expression::identifier("a", r(0, 1)),
            Expression::identifier("b", r(6, 7)),
        );
        let mut count = 0;
        expr.walk(&mut |_| count += 1);
        assert_eq!(count, 3);
    }
}
