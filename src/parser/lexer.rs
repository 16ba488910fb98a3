//! Hand-rolled tokenizer for FHIRPath expressions
//!
//! Byte-level scanning with an ASCII flag table on the hot path; non-ASCII
//! characters fall back to Unicode identifier classification. The lexer
//! tracks line/column/offset for every token and can optionally emit
//! whitespace and comments on the hidden channel so the token stream
//! reproduces the source text exactly.

use super::error::LexerError;
use super::span::Position;
use super::token::{Token, TokenKind, keyword};
use unicode_xid::UnicodeXID;

const FLAG_DIGIT: u8 = 1 << 0;
const FLAG_ID_START: u8 = 1 << 1;
const FLAG_ID_CONTINUE: u8 = 1 << 2;
const FLAG_WHITESPACE: u8 = 1 << 3;

/// 128-entry classification table for the ASCII fast path
static ASCII_FLAGS: [u8; 128] = build_ascii_flags();

const fn build_ascii_flags() -> [u8; 128] {
    let mut table = [0u8; 128];
    let mut i = 0usize;
    while i < 128 {
        let b = i as u8;
        let mut flags = 0u8;
        if b.is_ascii_digit() {
            flags |= FLAG_DIGIT | FLAG_ID_CONTINUE;
        }
        if b.is_ascii_alphabetic() || b == b'_' {
            flags |= FLAG_ID_START | FLAG_ID_CONTINUE;
        }
        if matches!(b, b' ' | b'\t' | b'\r' | b'\n') {
            flags |= FLAG_WHITESPACE;
        }
        table[i] = flags;
        i += 1;
    }
    table
}

#[inline(always)]
fn is_digit(b: u8) -> bool {
    b < 128 && ASCII_FLAGS[b as usize] & FLAG_DIGIT != 0
}

#[inline(always)]
fn is_whitespace(b: u8) -> bool {
    b < 128 && ASCII_FLAGS[b as usize] & FLAG_WHITESPACE != 0
}

/// Tokenize a source string, discarding trivia.
pub fn tokenize(source: &str) -> Result<Vec<Token<'_>>, LexerError> {
    Lexer::new(source).run()
}

/// Tokenize a source string, emitting whitespace and comments on the hidden
/// channel. Joining every lexeme (both channels) reproduces the source.
pub fn tokenize_with_trivia(source: &str) -> Result<Vec<Token<'_>>, LexerError> {
    Lexer::new(source).preserve_trivia(true).run()
}

/// The FHIRPath lexer
pub struct Lexer<'input> {
    source: &'input str,
    bytes: &'input [u8],
    pos: usize,
    line: u32,
    column: u32,
    trivia: bool,
}

impl<'input> Lexer<'input> {
    /// Create a lexer over the given source
    pub fn new(source: &'input str) -> Self {
        Self {
            source,
            bytes: source.as_bytes(),
            pos: 0,
            line: 1,
            column: 1,
            trivia: false,
        }
    }

    /// Request hidden-channel trivia tokens
    pub fn preserve_trivia(mut self, preserve: bool) -> Self {
        self.trivia = preserve;
        self
    }

    /// Run the lexer to completion. The returned stream always terminates
    /// with a single `Eof` token.
    pub fn run(mut self) -> Result<Vec<Token<'input>>, LexerError> {
        let mut tokens = Vec::new();
        loop {
            let token = self.next_token()?;
            match token {
                Some(tok) => tokens.push(tok),
                None => break,
            }
        }
        tokens.push(Token::new(TokenKind::Eof, "", self.position()));
        Ok(tokens)
    }

    #[inline]
    fn position(&self) -> Position {
        Position::new(self.line, self.column, self.pos)
    }

    #[inline]
    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    #[inline]
    fn peek_at(&self, ahead: usize) -> Option<u8> {
        self.bytes.get(self.pos + ahead).copied()
    }

    /// Advance line/column bookkeeping over a consumed lexeme
    fn bump_position(&mut self, lexeme: &str) {
        for ch in lexeme.chars() {
            if ch == '\n' {
                self.line += 1;
                self.column = 1;
            } else {
                self.column += 1;
            }
        }
    }

    fn slice(&self, start: usize) -> &'input str {
        &self.source[start..self.pos]
    }

    /// Produce a token from the scanned byte range, updating positions
    fn emit(&mut self, kind: TokenKind, start: usize, at: Position) -> Token<'input> {
        let lexeme = self.slice(start);
        self.bump_position(lexeme);
        Token::new(kind, lexeme, at)
    }

    fn emit_trivia(&mut self, kind: TokenKind, start: usize, at: Position) -> Token<'input> {
        let lexeme = self.slice(start);
        self.bump_position(lexeme);
        Token::trivia(kind, lexeme, at)
    }

    fn next_token(&mut self) -> Result<Option<Token<'input>>, LexerError> {
        loop {
            let at = self.position();
            let start = self.pos;
            let Some(b) = self.peek() else {
                return Ok(None);
            };

            // Trivia first: either emitted on the hidden channel or skipped.
            if is_whitespace(b) {
                while self.peek().is_some_and(is_whitespace) {
                    self.pos += 1;
                }
                if self.trivia {
                    return Ok(Some(self.emit_trivia(TokenKind::Whitespace, start, at)));
                }
                self.bump_position(self.slice(start));
                continue;
            }
            if b == b'/' {
                match self.peek_at(1) {
                    Some(b'/') => {
                        self.pos += 2;
                        while self.peek().is_some_and(|c| c != b'\n') {
                            self.pos += 1;
                        }
                        if self.trivia {
                            return Ok(Some(self.emit_trivia(TokenKind::LineComment, start, at)));
                        }
                        self.bump_position(self.slice(start));
                        continue;
                    }
                    Some(b'*') => {
                        self.pos += 2;
                        // Block comments do not nest
                        loop {
                            match self.peek() {
                                Some(b'*') if self.peek_at(1) == Some(b'/') => {
                                    self.pos += 2;
                                    break;
                                }
                                Some(_) => self.pos += 1,
                                None => {
                                    return Err(LexerError::new(
                                        "unterminated block comment",
                                        at,
                                    ));
                                }
                            }
                        }
                        if self.trivia {
                            return Ok(Some(self.emit_trivia(TokenKind::BlockComment, start, at)));
                        }
                        self.bump_position(self.slice(start));
                        continue;
                    }
                    _ => {}
                }
            }

            return self.scan_token(b, start, at).map(Some);
        }
    }

    fn scan_token(
        &mut self,
        b: u8,
        start: usize,
        at: Position,
    ) -> Result<Token<'input>, LexerError> {
        match b {
            b'.' => self.single(TokenKind::Dot, start, at),
            b'(' => self.single(TokenKind::LeftParen, start, at),
            b')' => self.single(TokenKind::RightParen, start, at),
            b'[' => self.single(TokenKind::LeftBracket, start, at),
            b']' => self.single(TokenKind::RightBracket, start, at),
            b',' => self.single(TokenKind::Comma, start, at),
            b'+' => self.single(TokenKind::Plus, start, at),
            b'-' => self.single(TokenKind::Minus, start, at),
            b'*' => self.single(TokenKind::Multiply, start, at),
            b'/' => self.single(TokenKind::Divide, start, at),
            b'&' => self.single(TokenKind::Ampersand, start, at),
            b'|' => self.single(TokenKind::Pipe, start, at),
            b'=' => self.single(TokenKind::Equal, start, at),
            b'~' => self.single(TokenKind::Equivalent, start, at),
            b'{' => {
                // `{}` is the null literal; a lone `{` opens a collection
                if self.peek_at(1) == Some(b'}') {
                    self.pos += 2;
                    Ok(self.emit(TokenKind::Null, start, at))
                } else {
                    self.single(TokenKind::LeftBrace, start, at)
                }
            }
            b'}' => self.single(TokenKind::RightBrace, start, at),
            b'<' => {
                if self.peek_at(1) == Some(b'=') {
                    self.pos += 2;
                    Ok(self.emit(TokenKind::LessThanOrEqual, start, at))
                } else {
                    self.single(TokenKind::LessThan, start, at)
                }
            }
            b'>' => {
                if self.peek_at(1) == Some(b'=') {
                    self.pos += 2;
                    Ok(self.emit(TokenKind::GreaterThanOrEqual, start, at))
                } else {
                    self.single(TokenKind::GreaterThan, start, at)
                }
            }
            b'!' => match self.peek_at(1) {
                Some(b'=') => {
                    self.pos += 2;
                    Ok(self.emit(TokenKind::NotEqual, start, at))
                }
                Some(b'~') => {
                    self.pos += 2;
                    Ok(self.emit(TokenKind::NotEquivalent, start, at))
                }
                _ => Err(LexerError::with_char("unexpected character", at, '!')),
            },
            b'\'' => {
                self.scan_quoted(b'\'', "unterminated string literal", at)?;
                Ok(self.emit(TokenKind::String, start, at))
            }
            b'`' => {
                self.scan_quoted(b'`', "unterminated delimited identifier", at)?;
                Ok(self.emit(TokenKind::DelimitedIdentifier, start, at))
            }
            b'@' => self.scan_temporal(start, at),
            b'%' => self.scan_env_variable(start, at),
            b'$' => self.scan_special_variable(start, at),
            _ if is_digit(b) => {
                self.scan_number();
                Ok(self.emit(TokenKind::Number, start, at))
            }
            _ if self.is_identifier_start() => {
                self.scan_identifier();
                let kind = keyword(self.slice(start)).unwrap_or(TokenKind::Identifier);
                Ok(self.emit(kind, start, at))
            }
            _ => {
                let ch = self.source[self.pos..].chars().next().unwrap_or('\u{fffd}');
                Err(LexerError::with_char("unexpected character", at, ch))
            }
        }
    }

    fn single(
        &mut self,
        kind: TokenKind,
        start: usize,
        at: Position,
    ) -> Result<Token<'input>, LexerError> {
        self.pos += 1;
        Ok(self.emit(kind, start, at))
    }

    #[inline]
    fn is_identifier_start(&self) -> bool {
        match self.peek() {
            Some(b) if b < 128 => ASCII_FLAGS[b as usize] & FLAG_ID_START != 0,
            Some(_) => self.source[self.pos..]
                .chars()
                .next()
                .is_some_and(UnicodeXID::is_xid_start),
            None => false,
        }
    }

    fn scan_identifier(&mut self) {
        while let Some(b) = self.peek() {
            if b < 128 {
                if ASCII_FLAGS[b as usize] & FLAG_ID_CONTINUE == 0 {
                    break;
                }
                self.pos += 1;
            } else {
                let ch = self.source[self.pos..].chars().next().unwrap();
                if !UnicodeXID::is_xid_continue(ch) {
                    break;
                }
                self.pos += ch.len_utf8();
            }
        }
    }

    fn scan_number(&mut self) {
        while self.peek().is_some_and(is_digit) {
            self.pos += 1;
        }
        // A fractional part requires at least one digit after the dot
        if self.peek() == Some(b'.') && self.peek_at(1).is_some_and(is_digit) {
            self.pos += 1;
            while self.peek().is_some_and(is_digit) {
                self.pos += 1;
            }
        }
    }

    /// Scan a quoted literal (string or delimited identifier), validating
    /// escape sequences. The quote character itself is consumed.
    fn scan_quoted(&mut self, quote: u8, unterminated: &str, at: Position) -> Result<(), LexerError> {
        self.pos += 1;
        loop {
            match self.peek() {
                Some(b) if b == quote => {
                    self.pos += 1;
                    return Ok(());
                }
                Some(b'\\') => {
                    let esc_at = Position::new(
                        self.line,
                        self.column + (self.pos - at.offset) as u32,
                        self.pos,
                    );
                    self.pos += 1;
                    match self.peek() {
                        Some(b'\'' | b'`' | b'\\' | b'/' | b'f' | b'n' | b'r' | b't') => {
                            self.pos += 1;
                        }
                        Some(b'u') => {
                            self.pos += 1;
                            for _ in 0..4 {
                                match self.peek() {
                                    Some(h) if h.is_ascii_hexdigit() => self.pos += 1,
                                    _ => {
                                        return Err(LexerError::new(
                                            "\\u escape requires exactly 4 hex digits",
                                            esc_at,
                                        ));
                                    }
                                }
                            }
                        }
                        Some(other) => {
                            return Err(LexerError::with_char(
                                "invalid escape sequence",
                                esc_at,
                                other as char,
                            ));
                        }
                        None => return Err(LexerError::new(unterminated, at)),
                    }
                }
                Some(_) => {
                    let ch = self.source[self.pos..].chars().next().unwrap();
                    self.pos += ch.len_utf8();
                }
                None => return Err(LexerError::new(unterminated, at)),
            }
        }
    }

    /// Scan `@`-prefixed date, datetime and time literals.
    ///
    /// Grammar: `@YEAR(-MM(-DD(THH(:mm(:ss(.frac)?)?)?TZ?)?)?)?` or `@T` time.
    /// The literal kind is `DateTime` when a `T` is present, `Time` for `@T`,
    /// otherwise `Date`.
    fn scan_temporal(&mut self, start: usize, at: Position) -> Result<Token<'input>, LexerError> {
        self.pos += 1; // '@'
        if self.peek() == Some(b'T') {
            self.pos += 1;
            if !self.scan_time_part() {
                return Err(LexerError::new("invalid time literal", at));
            }
            self.scan_timezone();
            return Ok(self.emit(TokenKind::Time, start, at));
        }

        if !self.scan_digits(4) {
            return Err(LexerError::new("date literal requires a 4-digit year", at));
        }
        let mut has_time = false;
        if self.peek() == Some(b'-') && self.peek_at(1).is_some_and(is_digit) {
            self.pos += 1;
            if !self.scan_digits(2) {
                return Err(LexerError::new("invalid month in date literal", at));
            }
            if self.peek() == Some(b'-') && self.peek_at(1).is_some_and(is_digit) {
                self.pos += 1;
                if !self.scan_digits(2) {
                    return Err(LexerError::new("invalid day in date literal", at));
                }
            }
        }
        if self.peek() == Some(b'T') {
            self.pos += 1;
            has_time = true;
            // The time part after `T` may be elided entirely
            self.scan_time_part();
            self.scan_timezone();
        }
        let kind = if has_time {
            TokenKind::DateTime
        } else {
            TokenKind::Date
        };
        Ok(self.emit(kind, start, at))
    }

    /// Scan `HH(:mm(:ss(.frac)?)?)?`; returns false when no hour digits follow
    fn scan_time_part(&mut self) -> bool {
        if !self.peek().is_some_and(is_digit) {
            return false;
        }
        if !self.scan_digits(2) {
            return false;
        }
        if self.peek() == Some(b':') && self.peek_at(1).is_some_and(is_digit) {
            self.pos += 1;
            if !self.scan_digits(2) {
                return false;
            }
            if self.peek() == Some(b':') && self.peek_at(1).is_some_and(is_digit) {
                self.pos += 1;
                if !self.scan_digits(2) {
                    return false;
                }
                if self.peek() == Some(b'.') && self.peek_at(1).is_some_and(is_digit) {
                    self.pos += 1;
                    while self.peek().is_some_and(is_digit) {
                        self.pos += 1;
                    }
                }
            }
        }
        true
    }

    fn scan_timezone(&mut self) {
        match self.peek() {
            Some(b'Z') => self.pos += 1,
            Some(b'+') | Some(b'-') => {
                // +hh:mm / -hh:mm; leave the sign alone if digits don't follow
                let mark = self.pos;
                self.pos += 1;
                if self.scan_digits(2) && self.peek() == Some(b':') {
                    self.pos += 1;
                    if self.scan_digits(2) {
                        return;
                    }
                }
                self.pos = mark;
            }
            _ => {}
        }
    }

    fn scan_digits(&mut self, count: usize) -> bool {
        for _ in 0..count {
            if self.peek().is_some_and(is_digit) {
                self.pos += 1;
            } else {
                return false;
            }
        }
        true
    }

    /// Scan `%name`, `` %`name` `` or `%'name'`
    fn scan_env_variable(
        &mut self,
        start: usize,
        at: Position,
    ) -> Result<Token<'input>, LexerError> {
        self.pos += 1; // '%'
        match self.peek() {
            Some(b'`') => self.scan_quoted(b'`', "unterminated delimited identifier", at)?,
            Some(b'\'') => self.scan_quoted(b'\'', "unterminated string literal", at)?,
            _ if self.is_identifier_start() => self.scan_identifier(),
            _ => {
                return Err(LexerError::new(
                    "environment variable requires a name after '%'",
                    at,
                ));
            }
        }
        Ok(self.emit(TokenKind::EnvVariable, start, at))
    }

    /// Only `$this`, `$index` and `$total` exist
    fn scan_special_variable(
        &mut self,
        start: usize,
        at: Position,
    ) -> Result<Token<'input>, LexerError> {
        self.pos += 1; // '$'
        if !self.is_identifier_start() {
            return Err(LexerError::new("expected variable name after '$'", at));
        }
        self.scan_identifier();
        let kind = match &self.slice(start)[1..] {
            "this" => TokenKind::This,
            "index" => TokenKind::Index,
            "total" => TokenKind::Total,
            other => {
                return Err(LexerError::new(
                    format!("unknown special variable '${other}'"),
                    at,
                ));
            }
        };
        Ok(self.emit(kind, start, at))
    }
}

/// Decode the escape sequences of a validated quoted lexeme body.
///
/// `raw` is the text between the quotes; the lexer has already checked that
/// every escape is well-formed.
pub(crate) fn unescape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        match chars.next() {
            Some('f') => out.push('\u{000c}'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('t') => out.push('\t'),
            Some('u') => {
                let hex: String = chars.by_ref().take(4).collect();
                if let Some(c) = u32::from_str_radix(&hex, 16).ok().and_then(char::from_u32) {
                    out.push(c);
                }
            }
            Some(other) => out.push(other),
            None => {}
        }
    }
    out
}

/// Strip quotes/backticks/prefix from a lexeme and decode its escapes
pub(crate) fn literal_text(lexeme: &str) -> String {
    let body = match lexeme.as_bytes().first() {
        Some(b'\'') | Some(b'`') => &lexeme[1..lexeme.len() - 1],
        _ => lexeme,
    };
    unescape(body)
}
