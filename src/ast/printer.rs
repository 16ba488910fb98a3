//! Canonical surface-form printing for AST nodes
//!
//! The printed form is valid FHIRPath that round-trips through the parser;
//! it is used by `trace()`, diagnostics and tests. Parentheses are emitted
//! around every binary operand that is itself a binary operation, which keeps
//! the printer independent of precedence bookkeeping.

use super::expression::{Expression, ExpressionNode, LiteralValue};
use super::operator::BinaryOperator;
use std::fmt;

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.node)
    }
}

impl fmt::Display for ExpressionNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExpressionNode::Literal(value) => write!(f, "{value}"),
            ExpressionNode::Identifier(name) | ExpressionNode::TypeOrIdentifier(name) => {
                if needs_delimiting(name) {
                    write!(f, "`{name}`")
                } else {
                    f.write_str(name)
                }
            }
            ExpressionNode::Variable(name) => f.write_str(name),
            ExpressionNode::Binary(data) => {
                if data.op == BinaryOperator::Navigation {
                    write!(f, "{}.{}", Operand(&data.left), Operand(&data.right))
                } else {
                    write!(
                        f,
                        "{} {} {}",
                        Operand(&data.left),
                        data.op,
                        Operand(&data.right)
                    )
                }
            }
            ExpressionNode::Unary { op, operand } => {
                if *op == super::operator::UnaryOperator::Not {
                    write!(f, "({}).not()", operand)
                } else {
                    write!(f, "{}{}", op, Operand(operand))
                }
            }
            ExpressionNode::Index(data) => write!(f, "{}[{}]", Operand(&data.base), data.index),
            ExpressionNode::Function(data) => {
                write!(f, "{}(", data.callee)?;
                for (i, arg) in data.arguments.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{arg}")?;
                }
                f.write_str(")")
            }
            ExpressionNode::Collection(elements) => {
                if elements.is_empty() {
                    return f.write_str("{}");
                }
                f.write_str("{ ")?;
                for (i, element) in elements.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{element}")?;
                }
                f.write_str(" }")
            }
            ExpressionNode::MembershipTest(data) => {
                write!(f, "{} is {}", Operand(&data.expression), data.type_name)
            }
            ExpressionNode::TypeCast(data) => {
                write!(f, "{} as {}", Operand(&data.expression), data.type_name)
            }
            ExpressionNode::TypeReference(name) => f.write_str(name),
            ExpressionNode::Error(data) => write!(f, "/* error: {} */", data.message),
        }
    }
}

/// Operand wrapper that parenthesizes nested binary/unary expressions
struct Operand<'a>(&'a Expression);

impl fmt::Display for Operand<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0.node {
            ExpressionNode::Binary(data) if data.op != BinaryOperator::Navigation => {
                write!(f, "({})", self.0)
            }
            ExpressionNode::MembershipTest(_) | ExpressionNode::TypeCast(_) => {
                write!(f, "({})", self.0)
            }
            _ => write!(f, "{}", self.0),
        }
    }
}

fn needs_delimiting(name: &str) -> bool {
    match name.chars().next() {
        Some(c) if c.is_alphabetic() || c == '_' => {
            !name.chars().all(|c| c.is_alphanumeric() || c == '_')
        }
        _ => true,
    }
}

impl fmt::Display for LiteralValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LiteralValue::Boolean(b) => write!(f, "{b}"),
            LiteralValue::Integer(i) => write!(f, "{i}"),
            LiteralValue::Decimal(d) => f.write_str(d),
            LiteralValue::String(s) => write!(f, "'{}'", escape_string(s)),
            LiteralValue::Date(d) => write!(f, "@{d}"),
            LiteralValue::DateTime(dt) => write!(f, "@{dt}"),
            LiteralValue::Time(t) => write!(f, "@T{t}"),
            LiteralValue::Quantity { value, unit } => write!(f, "{value} '{unit}'"),
            LiteralValue::Null => f.write_str("{}"),
        }
    }
}

fn escape_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '\'' => out.push_str("\\'"),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\u{000c}' => out.push_str("\\f"),
            _ => out.push(ch),
        }
    }
    out
}
