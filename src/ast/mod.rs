//! Abstract syntax tree for FHIRPath expressions
//!
//! Nodes carry source ranges and (after analysis) inferred type information.

mod expression;
mod operator;
mod printer;

pub use expression::*;
pub use operator::*;
