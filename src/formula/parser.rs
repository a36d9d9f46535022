//! Recursive-descent parser with precedence climbing for binary operators

use super::{is_reserved, DEFAULT_MAX_DEPTH};
use crate::error::ParseError;
use crate::expr::{AggOp, BinaryOp, CaseBranch, Expression, LiteralValue, UnaryOp};
use crate::naming::to_entity_name;

/// Source name used when an aggregation's collection cannot be inferred
pub const UNKNOWN_SOURCE: &str = "Unknown";

/// Single-use parser over one formula string
pub struct Parser<'a> {
    src: &'a str,
    pos: usize,
    depth: usize,
    max_depth: usize,
}

impl<'a> Parser<'a> {
    pub fn new(src: &'a str) -> Self {
        Self {
            src,
            pos: 0,
            depth: 0,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Parse the whole input; trailing characters are an error
    pub fn parse(mut self) -> Result<Expression, ParseError> {
        self.skip_whitespace();
        let expr = self.parse_expression(0)?;
        self.skip_whitespace();
        if let Some(c) = self.peek_char() {
            return Err(self.error(format!("Unexpected character: {}", c)));
        }
        Ok(expr)
    }

    // ------------------------------------------------------------------
    // Expressions
    // ------------------------------------------------------------------

    fn parse_expression(&mut self, min_precedence: u8) -> Result<Expression, ParseError> {
        self.enter()?;
        let result = self.parse_binary(min_precedence);
        self.depth -= 1;
        result
    }

    fn parse_binary(&mut self, min_precedence: u8) -> Result<Expression, ParseError> {
        let mut left = self.parse_unary(min_precedence)?;

        loop {
            self.skip_whitespace();
            let Some((op, len)) = self.peek_operator() else {
                break;
            };
            if op.precedence() < min_precedence {
                break;
            }
            self.pos += len;
            let right = self.parse_expression(op.precedence() + 1)?;
            left = Expression::binary(op, left, right);
        }

        Ok(left)
    }

    fn parse_unary(&mut self, min_precedence: u8) -> Result<Expression, ParseError> {
        self.skip_whitespace();

        if self.peek_word() == "not" {
            self.pos += 3;
            // comparisons bind tighter than `not`; so does the enclosing operator
            let operand =
                self.parse_expression(BinaryOp::Eq.precedence().max(min_precedence))?;
            return Ok(Expression::unary(UnaryOp::Not, operand));
        }

        if self.peek_char() == Some('-') && !self.peek_char_at(1).is_some_and(|c| c.is_ascii_digit())
        {
            self.pos += 1;
            self.enter()?;
            let operand = self.parse_unary(min_precedence);
            self.depth -= 1;
            return Ok(Expression::unary(UnaryOp::Neg, operand?));
        }

        let mut expr = self.parse_primary()?;

        // postfix `is null` / `is not null`
        loop {
            self.skip_whitespace();
            if self.peek_word() != "is" {
                break;
            }
            self.pos += 2;
            self.skip_whitespace();
            let op = if self.peek_word() == "not" {
                self.pos += 3;
                UnaryOp::IsNotNull
            } else {
                UnaryOp::IsNull
            };
            self.consume_word("null")?;
            expr = Expression::unary(op, expr);
        }

        Ok(expr)
    }

    fn parse_primary(&mut self) -> Result<Expression, ParseError> {
        self.skip_whitespace();

        let Some(c) = self.peek_char() else {
            return Err(self.error("Unexpected end of input"));
        };

        match c {
            '(' => {
                self.consume_char('(')?;
                let expr = self.parse_expression(0)?;
                self.skip_whitespace();
                self.consume_char(')')?;
                Ok(expr)
            }
            '0'..='9' | '-' => self.parse_number(),
            '"' | '\'' => self.parse_string(),
            '[' => self.parse_list(),
            c if c.is_ascii_alphabetic() || c == '_' => self.parse_identifier_expression(),
            other => Err(self.error(format!("Unexpected character: {}", other))),
        }
    }

    fn parse_identifier_expression(&mut self) -> Result<Expression, ParseError> {
        let start = self.pos;
        let ident = self.parse_identifier();

        match ident {
            "if" => return self.parse_if(),
            "case" => return self.parse_case(),
            "true" => return Ok(Expression::literal(LiteralValue::Bool(true))),
            "false" => return Ok(Expression::literal(LiteralValue::Bool(false))),
            "null" => return Ok(Expression::literal(LiteralValue::Null)),
            _ => {}
        }

        self.skip_whitespace();

        if let Some(op) = AggOp::from_keyword(ident) {
            if self.peek_char() == Some('(') {
                return self.parse_aggregation(op);
            }
        }

        if is_reserved(ident) {
            return Err(ParseError::new(
                format!("Unexpected keyword '{}'", ident),
                start,
            ));
        }

        match self.peek_char() {
            Some('.') => self.parse_reference(ident),
            Some('(') => self.parse_call(ident),
            _ => Ok(Expression::input(ident)),
        }
    }

    fn parse_number(&mut self) -> Result<Expression, ParseError> {
        let start = self.pos;
        if self.peek_char() == Some('-') {
            self.pos += 1;
        }
        self.skip_digits();

        let is_decimal = self.peek_char() == Some('.');
        if is_decimal {
            self.pos += 1;
            self.skip_digits();
        }

        let text = &self.src[start..self.pos];
        let value = if is_decimal {
            text.parse::<f64>().map(LiteralValue::Float).ok()
        } else {
            text.parse::<i64>().map(LiteralValue::Int).ok()
        };

        value
            .map(Expression::literal)
            .ok_or_else(|| ParseError::new(format!("Invalid number: {}", text), start))
    }

    fn parse_string(&mut self) -> Result<Expression, ParseError> {
        let start = self.pos;
        let quote = self.consume_any()?;
        let mut value = String::new();

        loop {
            match self.peek_char() {
                None => return Err(ParseError::new("Unterminated string literal", start)),
                Some(c) if c == quote => {
                    self.pos += c.len_utf8();
                    break;
                }
                Some('\\') => {
                    self.pos += 1;
                    match self.peek_char() {
                        Some(escaped) => {
                            value.push(escaped);
                            self.pos += escaped.len_utf8();
                        }
                        None => {
                            return Err(ParseError::new("Unterminated string literal", start))
                        }
                    }
                }
                Some(c) => {
                    value.push(c);
                    self.pos += c.len_utf8();
                }
            }
        }

        Ok(Expression::literal(LiteralValue::String(value)))
    }

    fn parse_list(&mut self) -> Result<Expression, ParseError> {
        self.consume_char('[')?;
        let items = self.parse_comma_separated(']')?;
        Ok(Expression::ListLiteral { items })
    }

    /// `self.field` or `entity.field[.nested...]`
    fn parse_reference(&mut self, first: &str) -> Result<Expression, ParseError> {
        let mut parts = vec![first.to_string()];

        while self.peek_char() == Some('.') {
            self.pos += 1;
            let part = self.parse_identifier();
            if part.is_empty() {
                return Err(self.error("Expected identifier after '.'"));
            }
            parts.push(part.to_string());
        }

        if parts[0] == "self" {
            Ok(Expression::SelfRef {
                field: parts[1..].join("."),
            })
        } else {
            Ok(Expression::FieldRef {
                path: parts.join("."),
            })
        }
    }

    /// `count(Entity [where cond])` or `sum(expr [where cond])`
    fn parse_aggregation(&mut self, op: AggOp) -> Result<Expression, ParseError> {
        self.consume_char('(')?;
        self.skip_whitespace();

        if op.takes_collection() {
            let source = self.parse_identifier();
            if source.is_empty() {
                return Err(self.error(format!(
                    "Expected collection name in {}()",
                    op.keyword()
                )));
            }
            let from = to_entity_name(source);
            let filter = self.parse_where()?;
            self.skip_whitespace();
            self.consume_char(')')?;

            return Ok(Expression::Aggregation {
                op,
                from,
                expr: None,
                filter,
            });
        }

        let expr = self.parse_expression(0)?;
        let filter = self.parse_where()?;
        self.skip_whitespace();
        self.consume_char(')')?;

        let from = infer_source(&expr).unwrap_or_else(|| UNKNOWN_SOURCE.to_string());

        Ok(Expression::Aggregation {
            op,
            from,
            expr: Some(Box::new(expr)),
            filter,
        })
    }

    fn parse_where(&mut self) -> Result<Option<Box<Expression>>, ParseError> {
        self.skip_whitespace();
        if self.peek_word() != "where" {
            return Ok(None);
        }
        self.pos += 5;
        Ok(Some(Box::new(self.parse_expression(0)?)))
    }

    /// `if cond then a else b`
    fn parse_if(&mut self) -> Result<Expression, ParseError> {
        let cond = self.parse_expression(0)?;
        self.consume_word("then")?;
        let then = self.parse_expression(0)?;
        self.consume_word("else")?;
        let otherwise = self.parse_expression(0)?;

        Ok(Expression::If {
            cond: Box::new(cond),
            then: Box::new(then),
            otherwise: Box::new(otherwise),
        })
    }

    /// `case when c1 then v1 [when c2 then v2 ...] [else v] end`
    fn parse_case(&mut self) -> Result<Expression, ParseError> {
        let mut branches = Vec::new();

        loop {
            self.skip_whitespace();
            if self.peek_word() != "when" {
                break;
            }
            self.pos += 4;
            let when = self.parse_expression(0)?;
            self.consume_word("then")?;
            let then = self.parse_expression(0)?;
            branches.push(CaseBranch { when, then });
        }

        if branches.is_empty() {
            return Err(self.error("Expected 'when' in case expression"));
        }

        self.skip_whitespace();
        let otherwise = if self.peek_word() == "else" {
            self.pos += 4;
            Some(Box::new(self.parse_expression(0)?))
        } else {
            None
        };

        self.consume_word("end")?;

        Ok(Expression::Case {
            branches,
            otherwise,
        })
    }

    fn parse_call(&mut self, name: &str) -> Result<Expression, ParseError> {
        self.consume_char('(')?;
        let args = self.parse_comma_separated(')')?;
        Ok(Expression::Call {
            name: name.to_string(),
            args,
        })
    }

    /// Items up to and including the closing delimiter; the opener is already consumed
    fn parse_comma_separated(&mut self, close: char) -> Result<Vec<Expression>, ParseError> {
        let mut items = Vec::new();

        self.skip_whitespace();
        if self.peek_char() != Some(close) {
            items.push(self.parse_expression(0)?);
            loop {
                self.skip_whitespace();
                if self.peek_char() != Some(',') {
                    break;
                }
                self.pos += 1;
                items.push(self.parse_expression(0)?);
            }
        }

        self.skip_whitespace();
        self.consume_char(close)?;
        Ok(items)
    }

    // ------------------------------------------------------------------
    // Operators
    // ------------------------------------------------------------------

    /// Infix operator at the cursor and its byte length. Only called where
    /// an infix operator is syntactically expected.
    fn peek_operator(&self) -> Option<(BinaryOp, usize)> {
        let rest = &self.src[self.pos..];

        for (text, op) in [("<=", BinaryOp::Le), (">=", BinaryOp::Ge), ("!=", BinaryOp::Ne)] {
            if rest.starts_with(text) {
                return Some((op, 2));
            }
        }

        let single = match rest.chars().next()? {
            '+' => Some(BinaryOp::Add),
            '-' => Some(BinaryOp::Sub),
            '*' => Some(BinaryOp::Mul),
            '/' => Some(BinaryOp::Div),
            '%' => Some(BinaryOp::Mod),
            '=' => Some(BinaryOp::Eq),
            '<' => Some(BinaryOp::Lt),
            '>' => Some(BinaryOp::Gt),
            _ => None,
        };
        if let Some(op) = single {
            return Some((op, 1));
        }

        let word = word_at(rest);
        match word {
            "and" => Some((BinaryOp::And, 3)),
            "or" => Some((BinaryOp::Or, 2)),
            "in" => Some((BinaryOp::In, 2)),
            "like" => Some((BinaryOp::Like, 4)),
            "not" => {
                let after = &rest[3..];
                let trimmed = after.trim_start_matches(is_whitespace);
                let gap = after.len() - trimmed.len();
                if gap == 0 {
                    return None;
                }
                match word_at(trimmed) {
                    "in" => Some((BinaryOp::NotIn, 3 + gap + 2)),
                    "like" => Some((BinaryOp::NotLike, 3 + gap + 4)),
                    _ => None,
                }
            }
            _ => None,
        }
    }

    // ------------------------------------------------------------------
    // Lexing helpers
    // ------------------------------------------------------------------

    fn enter(&mut self) -> Result<(), ParseError> {
        self.depth += 1;
        if self.depth > self.max_depth {
            return Err(self.error(format!(
                "Expression nested too deeply (limit {})",
                self.max_depth
            )));
        }
        Ok(())
    }

    fn error(&self, message: impl Into<String>) -> ParseError {
        ParseError::new(message, self.pos)
    }

    fn peek_char(&self) -> Option<char> {
        self.src[self.pos..].chars().next()
    }

    fn peek_char_at(&self, offset: usize) -> Option<char> {
        self.src[self.pos..].chars().nth(offset)
    }

    /// Identifier-shaped word at the cursor, after skipping whitespace
    fn peek_word(&mut self) -> &'a str {
        self.skip_whitespace();
        let src: &'a str = self.src;
        word_at(&src[self.pos..])
    }

    fn parse_identifier(&mut self) -> &'a str {
        let src: &'a str = self.src;
        let word = word_at(&src[self.pos..]);
        self.pos += word.len();
        word
    }

    fn consume_word(&mut self, expected: &str) -> Result<(), ParseError> {
        self.skip_whitespace();
        let start = self.pos;
        let word = self.parse_identifier();
        if word != expected {
            let got = if word.is_empty() {
                self.peek_char()
                    .map(String::from)
                    .unwrap_or_else(|| "end of input".to_string())
            } else {
                word.to_string()
            };
            return Err(ParseError::new(
                format!("Expected '{}' but got '{}'", expected, got),
                start,
            ));
        }
        Ok(())
    }

    fn consume_char(&mut self, expected: char) -> Result<(), ParseError> {
        match self.peek_char() {
            None => Err(self.error("Unexpected end of input")),
            Some(c) if c == expected => {
                self.pos += c.len_utf8();
                Ok(())
            }
            Some(c) => Err(self.error(format!("Expected '{}' but got '{}'", expected, c))),
        }
    }

    fn consume_any(&mut self) -> Result<char, ParseError> {
        let c = self
            .peek_char()
            .ok_or_else(|| self.error("Unexpected end of input"))?;
        self.pos += c.len_utf8();
        Ok(c)
    }

    fn skip_whitespace(&mut self) {
        let rest = &self.src[self.pos..];
        let trimmed = rest.trim_start_matches(is_whitespace);
        self.pos += rest.len() - trimmed.len();
    }

    fn skip_digits(&mut self) {
        let rest = &self.src[self.pos..];
        let trimmed = rest.trim_start_matches(|c: char| c.is_ascii_digit());
        self.pos += rest.len() - trimmed.len();
    }
}

fn is_whitespace(c: char) -> bool {
    matches!(c, ' ' | '\t' | '\n' | '\r')
}

fn is_identifier_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// Leading identifier-shaped run of `s` (empty if `s` starts with a digit)
fn word_at(s: &str) -> &str {
    if s.starts_with(|c: char| c.is_ascii_digit()) {
        return "";
    }
    let end = s.find(|c: char| !is_identifier_char(c)).unwrap_or(s.len());
    &s[..end]
}

/// Collection an aggregated expression ranges over: the first segment of the
/// left-most `FieldRef`, singularized.
pub(crate) fn infer_source(expr: &Expression) -> Option<String> {
    match expr {
        Expression::FieldRef { path } => path
            .split('.')
            .next()
            .filter(|s| !s.is_empty())
            .map(to_entity_name),
        Expression::Binary { left, right, .. } => {
            infer_source(left).or_else(|| infer_source(right))
        }
        _ => None,
    }
}
