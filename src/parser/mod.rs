//! FHIRPath lexing and parsing
//!
//! `tokenize`/`tokenize_with_trivia` turn source text into a position-tracked
//! token stream; `parse` (fast) and `parse_with_options` (error recovery,
//! trivia) turn it into an AST.

mod error;
mod lexer;
mod pratt;
mod span;
mod token;

pub use error::{LexerError, ParseError};
pub use lexer::{tokenize, tokenize_with_trivia};
pub use pratt::{ParseOptions, ParseResult, Precedence, parse_with_options};
pub use span::{Position, Range};
pub use token::{Channel, Token, TokenKind};

pub(crate) use lexer::literal_text;

use crate::ast::Expression;

/// Parse a FHIRPath expression in fast mode: the first lex or parse error
/// aborts with a [`ParseError`].
pub fn parse(source: &str) -> Result<Expression, ParseError> {
    pratt::parse_expression(source)
}
