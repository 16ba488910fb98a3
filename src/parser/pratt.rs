//! Pratt parser for FHIRPath expressions
//!
//! Precedence-climbing over the token stream with recursive descent for
//! primaries. Two modes: fast mode aborts on the first structural error;
//! error-recovery mode records diagnostics, emits `Error` nodes and
//! resynchronizes at stable boundaries so editors get a usable tree.

use super::error::{LexerError, ParseError, ParseResult as Fallible};
use super::lexer::{self, literal_text};
use super::span::Range;
use super::token::{Channel, Token, TokenKind};
use crate::ast::{BinaryOperator, Expression, ExpressionNode, LiteralValue, UnaryOperator};
use crate::diagnostics::Diagnostic;
use smallvec::SmallVec;

/// Operator precedence levels; a higher value binds tighter.
///
/// The thirteen levels follow the FHIRPath specification, `implies` loosest
/// and `.` navigation tightest. `implies` is the single right-associative
/// level.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Precedence {
    /// `implies`
    Implies = 1,
    /// `or`, `xor`
    Or = 2,
    /// `and`
    And = 3,
    /// `in`, `contains`
    Membership = 4,
    /// `=`, `~`, `!=`, `!~`
    Equality = 5,
    /// `<`, `<=`, `>`, `>=`
    Comparison = 6,
    /// `|`
    Union = 7,
    /// `is`, `as`
    Type = 8,
    /// `+`, `-`, `&`
    Additive = 9,
    /// `*`, `/`, `div`, `mod`
    Multiplicative = 10,
    /// prefix `+`, `-`
    Unary = 11,
    /// postfix `[..]`
    Index = 12,
    /// `.`
    Navigation = 13,
}

impl Precedence {
    #[inline(always)]
    pub(crate) const fn binding_power(self) -> u8 {
        self as u8
    }
}

/// Binary operator lookup: token kind to operator and precedence
#[inline(always)]
fn binary_operator(kind: TokenKind) -> Option<(BinaryOperator, Precedence)> {
    match kind {
        // Most frequent first
        TokenKind::Equal => Some((BinaryOperator::Equal, Precedence::Equality)),
        TokenKind::NotEqual => Some((BinaryOperator::NotEqual, Precedence::Equality)),
        TokenKind::Equivalent => Some((BinaryOperator::Equivalent, Precedence::Equality)),
        TokenKind::NotEquivalent => Some((BinaryOperator::NotEquivalent, Precedence::Equality)),
        TokenKind::And => Some((BinaryOperator::And, Precedence::And)),
        TokenKind::Or => Some((BinaryOperator::Or, Precedence::Or)),
        TokenKind::Xor => Some((BinaryOperator::Xor, Precedence::Or)),
        TokenKind::Implies => Some((BinaryOperator::Implies, Precedence::Implies)),
        TokenKind::Plus => Some((BinaryOperator::Add, Precedence::Additive)),
        TokenKind::Minus => Some((BinaryOperator::Subtract, Precedence::Additive)),
        TokenKind::Ampersand => Some((BinaryOperator::Concatenate, Precedence::Additive)),
        TokenKind::Multiply => Some((BinaryOperator::Multiply, Precedence::Multiplicative)),
        TokenKind::Divide => Some((BinaryOperator::Divide, Precedence::Multiplicative)),
        TokenKind::Div => Some((BinaryOperator::IntegerDivide, Precedence::Multiplicative)),
        TokenKind::Mod => Some((BinaryOperator::Modulo, Precedence::Multiplicative)),
        TokenKind::LessThan => Some((BinaryOperator::LessThan, Precedence::Comparison)),
        TokenKind::LessThanOrEqual => {
            Some((BinaryOperator::LessThanOrEqual, Precedence::Comparison))
        }
        TokenKind::GreaterThan => Some((BinaryOperator::GreaterThan, Precedence::Comparison)),
        TokenKind::GreaterThanOrEqual => {
            Some((BinaryOperator::GreaterThanOrEqual, Precedence::Comparison))
        }
        TokenKind::Pipe => Some((BinaryOperator::Union, Precedence::Union)),
        TokenKind::In => Some((BinaryOperator::In, Precedence::Membership)),
        TokenKind::Contains => Some((BinaryOperator::Contains, Precedence::Membership)),
        _ => None,
    }
}

/// Parser options
#[derive(Debug, Clone, Copy, Default)]
pub struct ParseOptions {
    /// Record diagnostics and produce `Error` nodes instead of aborting
    pub error_recovery: bool,
    /// Keep whitespace/comments on the hidden channel of the token stream
    pub preserve_trivia: bool,
}

/// Result of a recovery-mode (or options-driven) parse
#[derive(Debug, Clone)]
pub struct ParseResult {
    /// The parsed tree; may contain `Error` nodes in recovery mode
    pub ast: Expression,
    /// Structural diagnostics collected during the parse
    pub diagnostics: Vec<Diagnostic>,
    /// True when any diagnostic is an error
    pub has_errors: bool,
}

/// Parse in fast mode: the first structural error aborts.
pub fn parse_expression(source: &str) -> Fallible<Expression> {
    let tokens = lexer::tokenize(source)?;
    let mut parser = Parser::new(tokens, false);
    let expr = parser.parse_root()?;
    Ok(expr)
}

/// Parse with explicit options.
pub fn parse_with_options(source: &str, options: ParseOptions) -> ParseResult {
    let tokens = if options.preserve_trivia {
        lexer::tokenize_with_trivia(source)
    } else {
        lexer::tokenize(source)
    };
    let tokens = match tokens {
        Ok(tokens) => tokens,
        Err(err) => return lexer_failure(source, err),
    };
    let mut parser = Parser::new(tokens, options.error_recovery);
    match parser.parse_root() {
        Ok(ast) => {
            let has_errors = parser.diagnostics.iter().any(Diagnostic::is_error);
            ParseResult {
                ast,
                diagnostics: parser.diagnostics,
                has_errors,
            }
        }
        // Fast-mode abort surfaced through the options API
        Err(err) => {
            let range = Range::at(err.position());
            let message = err.to_string();
            let mut diagnostics = parser.diagnostics;
            diagnostics.push(Diagnostic::parse_error(range, &message));
            ParseResult {
                ast: Expression::error(message, range),
                diagnostics,
                has_errors: true,
            }
        }
    }
}

fn lexer_failure(_source: &str, err: LexerError) -> ParseResult {
    let range = Range::at(err.position);
    let diagnostic = Diagnostic::parse_error(range, err.to_string());
    ParseResult {
        ast: Expression::error(err.to_string(), range),
        diagnostics: vec![diagnostic],
        has_errors: true,
    }
}

struct Parser<'input> {
    tokens: Vec<Token<'input>>,
    index: usize,
    recover: bool,
    diagnostics: Vec<Diagnostic>,
}

impl<'input> Parser<'input> {
    fn new(tokens: Vec<Token<'input>>, recover: bool) -> Self {
        // Hidden-channel tokens never participate in parse decisions
        let tokens = tokens
            .into_iter()
            .filter(|t| t.channel == Channel::Default)
            .collect();
        Self {
            tokens,
            index: 0,
            recover,
            diagnostics: Vec::new(),
        }
    }

    #[inline]
    fn peek(&self) -> Token<'input> {
        self.tokens[self.index.min(self.tokens.len() - 1)]
    }

    #[inline]
    fn peek_kind(&self) -> TokenKind {
        self.peek().kind
    }

    #[inline]
    fn advance(&mut self) -> Token<'input> {
        let token = self.peek();
        if self.index < self.tokens.len() - 1 {
            self.index += 1;
        }
        token
    }

    fn token_range(&self, token: &Token<'input>) -> Range {
        Range::new(token.position, token.end_position())
    }

    fn error_at(&self, token: &Token<'input>, message: String) -> ParseError {
        ParseError::syntax(message, token.position)
    }

    /// Record a diagnostic (recovery mode) or build the fast-mode error
    fn report(&mut self, token: &Token<'input>, message: String) -> Option<ParseError> {
        if self.recover {
            self.diagnostics
                .push(Diagnostic::parse_error(self.token_range(token), &message));
            None
        } else {
            Some(self.error_at(token, message))
        }
    }

    /// Skip tokens until a stable boundary: `,`, `)`, `]`, `}`, EOF or a
    /// keyword that can only start a new clause.
    fn synchronize(&mut self) {
        loop {
            match self.peek_kind() {
                TokenKind::Comma
                | TokenKind::RightParen
                | TokenKind::RightBracket
                | TokenKind::RightBrace
                | TokenKind::And
                | TokenKind::Or
                | TokenKind::Xor
                | TokenKind::Implies
                | TokenKind::Eof => return,
                _ => {
                    self.advance();
                }
            }
        }
    }

    fn expect(&mut self, kind: TokenKind, what: &str) -> Fallible<Token<'input>> {
        let token = self.peek();
        if token.kind == kind {
            Ok(self.advance())
        } else {
            match self.report(&token, format!("expected {what}, found '{}'", token.lexeme)) {
                Some(err) => Err(err),
                // Recovery: leave the unexpected token in place
                None => Ok(Token::new(kind, "", token.position)),
            }
        }
    }

    fn parse_root(&mut self) -> Fallible<Expression> {
        let expr = self.parse_expression(Precedence::Implies.binding_power())?;
        let trailing = self.peek();
        if !trailing.is_eof() {
            match self.report(
                &trailing,
                format!("unexpected token '{}' after expression", trailing.lexeme),
            ) {
                Some(err) => return Err(err),
                None => self.synchronize(),
            }
        }
        Ok(expr)
    }

    fn parse_expression(&mut self, min_bp: u8) -> Fallible<Expression> {
        let mut lhs = self.parse_unary()?;

        loop {
            let token = self.peek();
            match token.kind {
                TokenKind::Dot if Precedence::Navigation.binding_power() >= min_bp => {
                    self.advance();
                    lhs = self.parse_invocation(lhs)?;
                }
                TokenKind::LeftBracket if Precedence::Index.binding_power() >= min_bp => {
                    self.advance();
                    let index = self.parse_expression(Precedence::Implies.binding_power())?;
                    let close = self.expect(TokenKind::RightBracket, "']'")?;
                    let range = lhs.range.cover(&self.token_range(&close));
                    lhs = Expression::index(lhs, index, range);
                }
                TokenKind::Is | TokenKind::As if Precedence::Type.binding_power() >= min_bp => {
                    let is_test = token.kind == TokenKind::Is;
                    self.advance();
                    let (type_name, type_range) = self.parse_type_specifier()?;
                    let range = lhs.range.cover(&type_range);
                    lhs = if is_test {
                        Expression::membership_test(lhs, type_name, range)
                    } else {
                        Expression::type_cast(lhs, type_name, range)
                    };
                }
                _ => {
                    let Some((op, prec)) = binary_operator(token.kind) else {
                        break;
                    };
                    let bp = prec.binding_power();
                    if bp < min_bp {
                        break;
                    }
                    self.advance();
                    // implies is right-associative; everything else climbs
                    let next_min = if op == BinaryOperator::Implies { bp } else { bp + 1 };
                    let rhs = self.parse_expression(next_min)?;
                    lhs = Expression::binary(op, lhs, rhs);
                }
            }
        }

        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Fallible<Expression> {
        let token = self.peek();
        let op = match token.kind {
            TokenKind::Plus => Some(UnaryOperator::Plus),
            TokenKind::Minus => Some(UnaryOperator::Minus),
            _ => None,
        };
        if let Some(op) = op {
            self.advance();
            let operand = self.parse_expression(Precedence::Unary.binding_power() + 1)?;
            let range = self.token_range(&token).cover(&operand.range);
            return Ok(Expression::unary(op, operand, range));
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Fallible<Expression> {
        let token = self.peek();
        let range = self.token_range(&token);

        match token.kind {
            TokenKind::Null => {
                self.advance();
                Ok(Expression::literal(LiteralValue::Null, range))
            }
            TokenKind::True => {
                self.advance();
                Ok(Expression::literal(LiteralValue::Boolean(true), range))
            }
            TokenKind::False => {
                self.advance();
                Ok(Expression::literal(LiteralValue::Boolean(false), range))
            }
            TokenKind::Number => {
                self.advance();
                self.parse_number_literal(token, range)
            }
            TokenKind::String => {
                self.advance();
                Ok(Expression::literal(
                    LiteralValue::String(literal_text(token.lexeme)),
                    range,
                ))
            }
            TokenKind::Date => {
                self.advance();
                Ok(Expression::literal(
                    LiteralValue::Date(token.lexeme[1..].to_string()),
                    range,
                ))
            }
            TokenKind::DateTime => {
                self.advance();
                Ok(Expression::literal(
                    LiteralValue::DateTime(token.lexeme[1..].to_string()),
                    range,
                ))
            }
            TokenKind::Time => {
                self.advance();
                Ok(Expression::literal(
                    LiteralValue::Time(token.lexeme[2..].to_string()),
                    range,
                ))
            }
            TokenKind::This => {
                self.advance();
                Ok(Expression::variable("$this", range))
            }
            TokenKind::Index => {
                self.advance();
                Ok(Expression::variable("$index", range))
            }
            TokenKind::Total => {
                self.advance();
                Ok(Expression::variable("$total", range))
            }
            TokenKind::EnvVariable => {
                self.advance();
                let name = format!("%{}", literal_text(&token.lexeme[1..]));
                Ok(Expression::variable(name, range))
            }
            TokenKind::LeftParen => {
                self.advance();
                let inner = self.parse_expression(Precedence::Implies.binding_power())?;
                let close = self.expect(TokenKind::RightParen, "')'")?;
                let mut expr = inner;
                expr.range = range.cover(&self.token_range(&close));
                Ok(expr)
            }
            TokenKind::LeftBrace => {
                self.advance();
                let mut elements = Vec::new();
                if self.peek_kind() != TokenKind::RightBrace {
                    loop {
                        elements.push(
                            self.parse_expression(Precedence::Implies.binding_power())?,
                        );
                        if self.peek_kind() == TokenKind::Comma {
                            self.advance();
                        } else {
                            break;
                        }
                    }
                }
                let close = self.expect(TokenKind::RightBrace, "'}'")?;
                Ok(Expression::collection(
                    elements,
                    range.cover(&self.token_range(&close)),
                ))
            }
            kind if kind.identifier_like() => {
                self.advance();
                let name = if kind == TokenKind::DelimitedIdentifier {
                    literal_text(token.lexeme)
                } else {
                    token.lexeme.to_string()
                };
                let callee = Expression::identifier(name, range);
                if self.peek_kind() == TokenKind::LeftParen {
                    self.parse_call(callee)
                } else {
                    Ok(callee)
                }
            }
            TokenKind::Eof => match self.report(&token, "unexpected end of input".to_string()) {
                Some(err) => Err(err),
                None => Ok(Expression::error("unexpected end of input", range)),
            },
            _ => {
                let message = format!("unexpected token '{}'", token.lexeme);
                match self.report(&token, message.clone()) {
                    Some(err) => Err(err),
                    None => {
                        self.synchronize();
                        Ok(Expression::error(message, range))
                    }
                }
            }
        }
    }

    /// Number literal, optionally merged with a following unit into a
    /// quantity (`4 days`, `5 'mg'`)
    fn parse_number_literal(
        &mut self,
        token: Token<'input>,
        range: Range,
    ) -> Fallible<Expression> {
        let next = self.peek();
        match next.kind {
            TokenKind::Unit => {
                self.advance();
                Ok(Expression::literal(
                    LiteralValue::Quantity {
                        value: token.lexeme.to_string(),
                        unit: next.lexeme.to_string(),
                    },
                    range.cover(&self.token_range(&next)),
                ))
            }
            TokenKind::String => {
                self.advance();
                Ok(Expression::literal(
                    LiteralValue::Quantity {
                        value: token.lexeme.to_string(),
                        unit: literal_text(next.lexeme),
                    },
                    range.cover(&self.token_range(&next)),
                ))
            }
            _ => {
                let value = if token.lexeme.contains('.') {
                    LiteralValue::Decimal(token.lexeme.to_string())
                } else {
                    match token.lexeme.parse::<i64>() {
                        Ok(n) => LiteralValue::Integer(n),
                        Err(_) => LiteralValue::Decimal(token.lexeme.to_string()),
                    }
                };
                Ok(Expression::literal(value, range))
            }
        }
    }

    /// The invocation after a `.`: a property, or a method call. Keyword
    /// tokens are accepted as names here (`where`, `contains`, `is`, ...).
    fn parse_invocation(&mut self, receiver: Expression) -> Fallible<Expression> {
        let token = self.peek();
        if !token.kind.identifier_like() {
            let message = format!("expected member name after '.', found '{}'", token.lexeme);
            return match self.report(&token, message.clone()) {
                Some(err) => Err(err),
                None => {
                    self.synchronize();
                    let range = receiver.range.cover(&self.token_range(&token));
                    Ok(Expression::error(message, range))
                }
            };
        }
        self.advance();
        let name = if token.kind == TokenKind::DelimitedIdentifier {
            literal_text(token.lexeme)
        } else {
            token.lexeme.to_string()
        };
        let member = Expression::identifier(name, self.token_range(&token));
        let callee = Expression::binary(BinaryOperator::Navigation, receiver, member);
        if self.peek_kind() == TokenKind::LeftParen {
            self.parse_call(callee)
        } else {
            Ok(callee)
        }
    }

    /// Argument list for `callee(..)`; for the type-specifier functions the
    /// single identifier argument becomes a `TypeReference`.
    fn parse_call(&mut self, callee: Expression) -> Fallible<Expression> {
        self.expect(TokenKind::LeftParen, "'('")?;
        let mut arguments: SmallVec<[Expression; 4]> = SmallVec::new();
        if self.peek_kind() != TokenKind::RightParen {
            loop {
                arguments.push(self.parse_expression(Precedence::Implies.binding_power())?);
                if self.peek_kind() == TokenKind::Comma {
                    self.advance();
                } else {
                    break;
                }
            }
        }
        let close = self.expect(TokenKind::RightParen, "')'")?;
        let range = callee.range.cover(&self.token_range(&close));

        let name = match &callee.node {
            ExpressionNode::Identifier(n) | ExpressionNode::TypeOrIdentifier(n) => Some(n.as_str()),
            ExpressionNode::Binary(data) => data.right.as_identifier(),
            _ => None,
        };
        if matches!(name, Some("is" | "as" | "ofType")) && arguments.len() == 1 {
            if let Some(type_name) = dotted_type_name(&arguments[0]) {
                let arg_range = arguments[0].range;
                arguments[0] = Expression::new(ExpressionNode::TypeReference(type_name), arg_range);
            }
        }

        Ok(Expression::function(callee, arguments, range))
    }

    /// Type specifier after `is`/`as`: an identifier, qualified through a
    /// known namespace (`System.Boolean`, `FHIR.Patient`). A dot after any
    /// other name is navigation on the result of the type operation.
    fn parse_type_specifier(&mut self) -> Fallible<(String, Range)> {
        let token = self.peek();
        if !token.kind.identifier_like() {
            let message = format!("expected type name, found '{}'", token.lexeme);
            return match self.report(&token, message) {
                Some(err) => Err(err),
                None => Ok(("Any".to_string(), self.token_range(&token))),
            };
        }
        self.advance();
        let mut name = if token.kind == TokenKind::DelimitedIdentifier {
            literal_text(token.lexeme)
        } else {
            token.lexeme.to_string()
        };
        let mut range = self.token_range(&token);

        if matches!(name.as_str(), "System" | "FHIR") && self.peek_kind() == TokenKind::Dot {
            self.advance();
            let segment = self.peek();
            if segment.kind.identifier_like() {
                self.advance();
                let text = if segment.kind == TokenKind::DelimitedIdentifier {
                    literal_text(segment.lexeme)
                } else {
                    segment.lexeme.to_string()
                };
                name.push('.');
                name.push_str(&text);
                range = range.cover(&self.token_range(&segment));
            }
        }
        Ok((name, range))
    }
}

/// Render a navigation chain of identifiers as a dotted type name
fn dotted_type_name(expr: &Expression) -> Option<String> {
    match &expr.node {
        ExpressionNode::Identifier(name) | ExpressionNode::TypeOrIdentifier(name) => {
            Some(name.clone())
        }
        ExpressionNode::Binary(data) if data.op == BinaryOperator::Navigation => {
            let left = dotted_type_name(&data.left)?;
            let right = data.right.as_identifier()?;
            Some(format!("{left}.{right}"))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::BinaryOperator as Op;
    use pretty_assertions::assert_eq;

    fn parse(source: &str) -> Expression {
        parse_expression(source).unwrap()
    }

    fn binary_op(expr: &Expression) -> Op {
        match &expr.node {
            ExpressionNode::Binary(data) => data.op,
            other => panic!("expected binary node, got {other:?}"),
        }
    }

    #[test]
    fn or_is_looser_than_and() {
        // a or (b and c)
        let expr = parse("a or b and c");
        assert_eq!(binary_op(&expr), Op::Or);
        if let ExpressionNode::Binary(data) = &expr.node {
            assert_eq!(binary_op(&data.right), Op::And);
        }
    }

    #[test]
    fn multiplication_binds_tighter_than_addition() {
        let expr = parse("1 + 2 * 3");
        assert_eq!(binary_op(&expr), Op::Add);
        if let ExpressionNode::Binary(data) = &expr.node {
            assert_eq!(binary_op(&data.right), Op::Multiply);
        }
    }

    #[test]
    fn equality_is_looser_than_and_navigation() {
        // ((a.b) = 1) and ((a.c) = 2)
        let expr = parse("a.b = 1 and a.c = 2");
        assert_eq!(binary_op(&expr), Op::And);
        if let ExpressionNode::Binary(data) = &expr.node {
            assert_eq!(binary_op(&data.left), Op::Equal);
            assert_eq!(binary_op(&data.right), Op::Equal);
        }
    }

    #[test]
    fn union_left_associates() {
        let expr = parse("a | b | c");
        assert_eq!(binary_op(&expr), Op::Union);
        if let ExpressionNode::Binary(data) = &expr.node {
            assert_eq!(binary_op(&data.left), Op::Union);
        }
    }

    #[test]
    fn implies_right_associates() {
        let expr = parse("a implies b implies c");
        if let ExpressionNode::Binary(data) = &expr.node {
            assert_eq!(data.op, Op::Implies);
            assert_eq!(binary_op(&data.right), Op::Implies);
        } else {
            panic!("expected binary");
        }
    }

    #[test]
    fn parenthesized_grouping() {
        let expr = parse("(1 + 2) * 3");
        assert_eq!(binary_op(&expr), Op::Multiply);
    }

    #[test]
    fn method_call_callee_is_navigation() {
        let expr = parse("name.where(use = 'official')");
        if let ExpressionNode::Function(data) = &expr.node {
            assert_eq!(data.name(), Some("where"));
            assert!(data.receiver().is_some());
            assert_eq!(data.arguments.len(), 1);
        } else {
            panic!("expected function call");
        }
    }

    #[test]
    fn keyword_accepted_as_method_name() {
        let expr = parse("code.contains('a')");
        if let ExpressionNode::Function(data) = &expr.node {
            assert_eq!(data.name(), Some("contains"));
        } else {
            panic!("expected function call");
        }
    }

    #[test]
    fn contains_is_binary_outside_method_position() {
        let expr = parse("list contains 4");
        assert_eq!(binary_op(&expr), Op::Contains);
    }

    #[test]
    fn is_builds_membership_test() {
        let expr = parse("value is Quantity");
        assert!(matches!(expr.node, ExpressionNode::MembershipTest(_)));
    }

    #[test]
    fn as_builds_type_cast_with_qualified_name() {
        let expr = parse("value as System.Decimal");
        if let ExpressionNode::TypeCast(data) = &expr.node {
            assert_eq!(data.type_name, "System.Decimal");
        } else {
            panic!("expected type cast");
        }
    }

    #[test]
    fn navigation_after_cast_applies_to_cast_result() {
        let expr = parse("value as Quantity.unit");
        if let ExpressionNode::Binary(data) = &expr.node {
            assert_eq!(data.op, Op::Navigation);
            assert!(matches!(data.left.node, ExpressionNode::TypeCast(_)));
        } else {
            panic!("expected navigation");
        }
    }

    #[test]
    fn of_type_argument_becomes_type_reference() {
        let expr = parse("value.ofType(Quantity)");
        if let ExpressionNode::Function(data) = &expr.node {
            assert!(matches!(
                data.arguments[0].node,
                ExpressionNode::TypeReference(_)
            ));
        } else {
            panic!("expected function call");
        }
    }

    #[test]
    fn index_is_postfix() {
        let expr = parse("name[0].given");
        if let ExpressionNode::Binary(data) = &expr.node {
            assert_eq!(data.op, Op::Navigation);
            assert!(matches!(data.left.node, ExpressionNode::Index(_)));
        } else {
            panic!("expected navigation");
        }
    }

    #[test]
    fn unary_minus_binds_tighter_than_multiplication() {
        let expr = parse("-a * b");
        assert_eq!(binary_op(&expr), Op::Multiply);
        if let ExpressionNode::Binary(data) = &expr.node {
            assert!(matches!(data.left.node, ExpressionNode::Unary { .. }));
        }
    }

    #[test]
    fn quantity_literal_with_calendar_unit() {
        let expr = parse("4 days");
        assert!(matches!(
            expr.node,
            ExpressionNode::Literal(LiteralValue::Quantity { .. })
        ));
    }

    #[test]
    fn ast_range_covers_whole_input() {
        let source = "name.where(use = 'official').given";
        let expr = parse(source);
        assert_eq!(expr.range.start.offset, 0);
        assert_eq!(expr.range.end.offset, source.len());
    }

    #[test]
    fn fast_mode_aborts_on_first_error() {
        assert!(parse_expression("1 + ").is_err());
        assert!(parse_expression("a ..b").is_err());
    }

    #[test]
    fn trailing_tokens_are_rejected() {
        assert!(parse_expression("a b").is_err());
    }

    #[test]
    fn recovery_mode_produces_error_nodes() {
        let result = parse_with_options(
            "1 + ",
            ParseOptions {
                error_recovery: true,
                preserve_trivia: false,
            },
        );
        assert!(result.has_errors);
        assert!(!result.diagnostics.is_empty());
        let mut saw_error_node = false;
        result.ast.walk(&mut |e| saw_error_node |= e.is_error());
        assert!(saw_error_node);
    }

    #[test]
    fn recovery_mode_synchronizes_at_boundaries() {
        let result = parse_with_options(
            "items.where( = 1) and active",
            ParseOptions {
                error_recovery: true,
                preserve_trivia: false,
            },
        );
        assert!(result.has_errors);
        // The tree still reaches the `and` clause
        let mut saw_and = false;
        result.ast.walk(&mut |e| {
            if let ExpressionNode::Binary(data) = &e.node {
                saw_and |= data.op == Op::And;
            }
        });
        assert!(saw_and);
    }

    #[test]
    fn lexer_failure_surfaces_as_diagnostic_in_recovery() {
        let result = parse_with_options(
            "'open",
            ParseOptions {
                error_recovery: true,
                preserve_trivia: false,
            },
        );
        assert!(result.has_errors);
        assert!(result.ast.is_error());
    }
}
