//! Lexer and parser error types

use super::span::Position;
use thiserror::Error;

/// Error raised by the lexer for malformed input.
///
/// Lexing never recovers; the first unexpected character or malformed
/// literal aborts tokenization.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{message} at {position}")]
pub struct LexerError {
    /// Human-readable description
    pub message: String,
    /// Position of the offending character
    pub position: Position,
    /// The offending character, when one was read
    pub ch: Option<char>,
}

impl LexerError {
    pub(crate) fn new(message: impl Into<String>, position: Position) -> Self {
        Self {
            message: message.into(),
            position,
            ch: None,
        }
    }

    pub(crate) fn with_char(message: impl Into<String>, position: Position, ch: char) -> Self {
        Self {
            message: message.into(),
            position,
            ch: Some(ch),
        }
    }
}

/// Error raised by fast-mode parsing.
///
/// In error-recovery mode structural problems are reported as diagnostics on
/// the parse result instead.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseError {
    /// Tokenization failed
    #[error(transparent)]
    Lexer(#[from] LexerError),

    /// A token violated the grammar
    #[error("{message} at {position}")]
    Syntax {
        /// Human-readable description
        message: String,
        /// Position of the offending token
        position: Position,
    },
}

impl ParseError {
    pub(crate) fn syntax(message: impl Into<String>, position: Position) -> Self {
        Self::Syntax {
            message: message.into(),
            position,
        }
    }

    /// Position the error was reported at
    pub fn position(&self) -> Position {
        match self {
            ParseError::Lexer(e) => e.position,
            ParseError::Syntax { position, .. } => *position,
        }
    }
}

/// Result alias used across the parser
pub type ParseResult<T> = Result<T, ParseError>;
