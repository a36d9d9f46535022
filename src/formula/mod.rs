//! Formula language
//!
//! Every derived value, precondition, error condition, guard and invariant in
//! a spec is written in a small pure expression language:
//!
//! ```text
//! self.quantity * self.unitPrice
//! sum(items.quantity * items.unitPrice)
//! count(orders where orders.status = 'COMPLETED')
//! if self.total >= 5000 then 0 else 500
//! status in ['OPEN', 'PENDING'] and not archived
//! ```
//!
//! `parse` turns a string into an [`Expression`] or fails with a
//! [`ParseError`]; it never returns a partial tree and always consumes the
//! whole input.
//!
//! ## Precedence (lowest first)
//!
//! | Level | Operators |
//! |-------|-----------|
//! | 1 | `or` |
//! | 2 | `and` |
//! | 3 | `= != < <= > >= in`, `not in`, `like`, `not like` |
//! | 4 | `+ -` |
//! | 5 | `* / %` |
//!
//! Operators of equal precedence associate to the left.

mod parser;

pub use parser::{Parser, UNKNOWN_SOURCE};

use crate::error::ParseError;
use crate::expr::Expression;

/// Default nesting limit for [`parse`]
pub const DEFAULT_MAX_DEPTH: usize = 64;

/// Words that cannot be used as bare input references
pub const RESERVED_WORDS: &[&str] = &[
    "if", "then", "else", "true", "false", "null", "and", "or", "in", "where", "sum", "count",
    "avg", "min", "max", "exists", "not", "like", "is", "case", "when", "end",
];

pub fn is_reserved(word: &str) -> bool {
    RESERVED_WORDS.contains(&word)
}

/// Parse a formula string
pub fn parse(formula: &str) -> Result<Expression, ParseError> {
    Parser::new(formula).parse()
}

/// Parse with an explicit nesting limit
pub fn parse_with_max_depth(formula: &str, max_depth: usize) -> Result<Expression, ParseError> {
    Parser::new(formula).with_max_depth(max_depth).parse()
}
