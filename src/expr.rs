//! Formula AST: the tagged union every derived value, precondition, guard
//! and assertion is parsed into.
//!
//! The serialized form is the tagged format used inside spec documents, so
//! a spec may carry either a formula string or a pre-built tree:
//!
//! ```yaml
//! formula:
//!   type: binary
//!   op: mul
//!   left: { type: self, field: quantity }
//!   right: { type: self, field: unitPrice }
//! ```
//!
//! Nodes own their children; there are no parent links, so a tree can never
//! contain a cycle.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Functions a `Call` node may name without a matching derived formula.
pub const BUILTIN_FUNCTIONS: &[&str] = &[
    "abs",
    "round",
    "floor",
    "ceil",
    "len",
    "length",
    "lower",
    "upper",
    "trim",
    "concat",
    "coalesce",
    "substring",
    "contains",
    "starts_with",
    "ends_with",
    "now",
    "today",
    "date_diff",
    "any",
    "all",
];

/// Is `name` part of the fixed built-in function set?
pub fn is_builtin_function(name: &str) -> bool {
    BUILTIN_FUNCTIONS.contains(&name)
}

/// A literal value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum LiteralValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
}

impl fmt::Display for LiteralValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LiteralValue::Null => write!(f, "null"),
            LiteralValue::Bool(b) => write!(f, "{}", b),
            LiteralValue::Int(i) => write!(f, "{}", i),
            LiteralValue::Float(x) => {
                if x.fract() == 0.0 && x.is_finite() {
                    write!(f, "{:.1}", x)
                } else {
                    write!(f, "{}", x)
                }
            }
            LiteralValue::String(s) => {
                write!(f, "'")?;
                for c in s.chars() {
                    if c == '\'' || c == '\\' {
                        write!(f, "\\")?;
                    }
                    write!(f, "{}", c)?;
                }
                write!(f, "'")
            }
        }
    }
}

/// Binary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
    In,
    NotIn,
    Like,
    NotLike,
}

impl BinaryOp {
    /// Binding strength, lowest first: or < and < comparisons < additive < multiplicative
    pub fn precedence(self) -> u8 {
        match self {
            BinaryOp::Or => 1,
            BinaryOp::And => 2,
            BinaryOp::Eq
            | BinaryOp::Ne
            | BinaryOp::Lt
            | BinaryOp::Le
            | BinaryOp::Gt
            | BinaryOp::Ge
            | BinaryOp::In
            | BinaryOp::NotIn
            | BinaryOp::Like
            | BinaryOp::NotLike => 3,
            BinaryOp::Add | BinaryOp::Sub => 4,
            BinaryOp::Mul | BinaryOp::Div | BinaryOp::Mod => 5,
        }
    }

    /// Surface syntax of the operator
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
            BinaryOp::Eq => "=",
            BinaryOp::Ne => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::And => "and",
            BinaryOp::Or => "or",
            BinaryOp::In => "in",
            BinaryOp::NotIn => "not in",
            BinaryOp::Like => "like",
            BinaryOp::NotLike => "not like",
        }
    }

    pub fn is_comparison(self) -> bool {
        self.precedence() == 3
    }
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.symbol())
    }
}

/// Unary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum UnaryOp {
    Not,
    Neg,
    IsNull,
    IsNotNull,
}

/// Aggregation operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum AggOp {
    Sum,
    Count,
    Avg,
    Min,
    Max,
    Exists,
}

impl AggOp {
    pub fn from_keyword(word: &str) -> Option<Self> {
        match word {
            "sum" => Some(AggOp::Sum),
            "count" => Some(AggOp::Count),
            "avg" => Some(AggOp::Avg),
            "min" => Some(AggOp::Min),
            "max" => Some(AggOp::Max),
            "exists" => Some(AggOp::Exists),
            _ => None,
        }
    }

    pub fn keyword(self) -> &'static str {
        match self {
            AggOp::Sum => "sum",
            AggOp::Count => "count",
            AggOp::Avg => "avg",
            AggOp::Min => "min",
            AggOp::Max => "max",
            AggOp::Exists => "exists",
        }
    }

    /// `count` and `exists` range over a collection, not a per-item expression
    pub fn takes_collection(self) -> bool {
        matches!(self, AggOp::Count | AggOp::Exists)
    }
}

/// Date operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum DateOpKind {
    Diff,
    Add,
    Sub,
    Now,
    Today,
    Overlaps,
    Truncate,
}

impl DateOpKind {
    pub fn name(self) -> &'static str {
        match self {
            DateOpKind::Diff => "diff",
            DateOpKind::Add => "add",
            DateOpKind::Sub => "sub",
            DateOpKind::Now => "now",
            DateOpKind::Today => "today",
            DateOpKind::Overlaps => "overlaps",
            DateOpKind::Truncate => "truncate",
        }
    }
}

/// List operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ListOpKind {
    Contains,
    Length,
    First,
    Last,
    At,
    Slice,
}

impl ListOpKind {
    pub fn name(self) -> &'static str {
        match self {
            ListOpKind::Contains => "contains",
            ListOpKind::Length => "length",
            ListOpKind::First => "first",
            ListOpKind::Last => "last",
            ListOpKind::At => "at",
            ListOpKind::Slice => "slice",
        }
    }
}

/// One `when ... then ...` arm of a `Case`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct CaseBranch {
    pub when: Expression,
    pub then: Expression,
}

/// A formula expression
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Expression {
    Literal {
        value: LiteralValue,
    },

    /// `self.field`, a field of the instance the formula is evaluated on
    #[serde(rename = "self")]
    SelfRef { field: String },

    /// `entity.field[.nested]`
    #[serde(rename = "ref")]
    FieldRef { path: String },

    /// Bare identifier, usually a command input parameter
    #[serde(rename = "input")]
    InputRef { name: String },

    Binary {
        op: BinaryOp,
        left: Box<Expression>,
        right: Box<Expression>,
    },

    Unary {
        op: UnaryOp,
        expr: Box<Expression>,
    },

    #[serde(rename = "agg")]
    Aggregation {
        op: AggOp,
        from: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        expr: Option<Box<Expression>>,
        #[serde(rename = "where", default, skip_serializing_if = "Option::is_none")]
        filter: Option<Box<Expression>>,
    },

    Call {
        name: String,
        #[serde(default)]
        args: Vec<Expression>,
    },

    If {
        cond: Box<Expression>,
        then: Box<Expression>,
        #[serde(rename = "else")]
        otherwise: Box<Expression>,
    },

    Case {
        branches: Vec<CaseBranch>,
        #[serde(rename = "else", default, skip_serializing_if = "Option::is_none")]
        otherwise: Option<Box<Expression>>,
    },

    #[serde(rename = "list")]
    ListLiteral { items: Vec<Expression> },

    #[serde(rename = "date")]
    DateOp {
        op: DateOpKind,
        #[serde(default)]
        args: Vec<Expression>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        unit: Option<String>,
    },

    ListOp {
        op: ListOpKind,
        list: Box<Expression>,
        #[serde(default)]
        args: Vec<Expression>,
    },
}

impl Expression {
    pub fn literal(value: LiteralValue) -> Self {
        Expression::Literal { value }
    }

    pub fn binary(op: BinaryOp, left: Expression, right: Expression) -> Self {
        Expression::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn unary(op: UnaryOp, expr: Expression) -> Self {
        Expression::Unary {
            op,
            expr: Box::new(expr),
        }
    }

    pub fn field_ref(path: impl Into<String>) -> Self {
        Expression::FieldRef { path: path.into() }
    }

    pub fn self_ref(field: impl Into<String>) -> Self {
        Expression::SelfRef {
            field: field.into(),
        }
    }

    pub fn input(name: impl Into<String>) -> Self {
        Expression::InputRef { name: name.into() }
    }

    /// Short tag naming the node kind
    pub fn kind(&self) -> &'static str {
        match self {
            Expression::Literal { .. } => "literal",
            Expression::SelfRef { .. } => "self",
            Expression::FieldRef { .. } => "ref",
            Expression::InputRef { .. } => "input",
            Expression::Binary { .. } => "binary",
            Expression::Unary { .. } => "unary",
            Expression::Aggregation { .. } => "agg",
            Expression::Call { .. } => "call",
            Expression::If { .. } => "if",
            Expression::Case { .. } => "case",
            Expression::ListLiteral { .. } => "list",
            Expression::DateOp { .. } => "date",
            Expression::ListOp { .. } => "list_op",
        }
    }

    /// Direct children, left to right
    pub fn children(&self) -> Vec<&Expression> {
        match self {
            Expression::Literal { .. }
            | Expression::SelfRef { .. }
            | Expression::FieldRef { .. }
            | Expression::InputRef { .. } => Vec::new(),
            Expression::Binary { left, right, .. } => vec![&**left, &**right],
            Expression::Unary { expr, .. } => vec![&**expr],
            Expression::Aggregation { expr, filter, .. } => {
                expr.iter().chain(filter.iter()).map(|e| e.as_ref()).collect()
            }
            Expression::Call { args, .. } | Expression::DateOp { args, .. } => {
                args.iter().collect()
            }
            Expression::If {
                cond,
                then,
                otherwise,
            } => vec![&**cond, &**then, &**otherwise],
            Expression::Case {
                branches,
                otherwise,
            } => {
                let mut out: Vec<&Expression> = branches
                    .iter()
                    .flat_map(|b| [&b.when, &b.then])
                    .collect();
                if let Some(e) = otherwise {
                    out.push(&**e);
                }
                out
            }
            Expression::ListLiteral { items } => items.iter().collect(),
            Expression::ListOp { list, args, .. } => {
                std::iter::once(list.as_ref()).chain(args.iter()).collect()
            }
        }
    }

    /// Pre-order walk over this node and every descendant
    pub fn walk<'a>(&'a self, visit: &mut impl FnMut(&'a Expression)) {
        visit(self);
        for child in self.children() {
            child.walk(visit);
        }
    }

    /// Every node in pre-order
    pub fn nodes(&self) -> Vec<&Expression> {
        let mut out = Vec::new();
        self.walk(&mut |e| out.push(e));
        out
    }

    /// Depth of the tree (a leaf has depth 1)
    pub fn depth(&self) -> usize {
        1 + self
            .children()
            .into_iter()
            .map(Expression::depth)
            .max()
            .unwrap_or(0)
    }

    /// Dotted `FieldRef` paths referenced anywhere in the tree
    pub fn field_paths(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.walk(&mut |e| {
            if let Expression::FieldRef { path } = e {
                out.push(path.as_str());
            }
        });
        out
    }

    /// Names of all `Call` nodes in the tree
    pub fn call_names(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.walk(&mut |e| {
            if let Expression::Call { name, .. } = e {
                out.push(name.as_str());
            }
        });
        out
    }

    /// Names of all `InputRef` nodes in the tree
    pub fn input_names(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.walk(&mut |e| {
            if let Expression::InputRef { name } = e {
                out.push(name.as_str());
            }
        });
        out
    }
}

fn write_args(f: &mut fmt::Formatter<'_>, args: &[Expression]) -> fmt::Result {
    for (i, arg) in args.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{}", arg)?;
    }
    Ok(())
}

/// Canonical formula text. Binary nodes are fully parenthesised so the
/// output re-parses to the same tree.
impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expression::Literal { value } => write!(f, "{}", value),
            Expression::SelfRef { field } => write!(f, "self.{}", field),
            Expression::FieldRef { path } => write!(f, "{}", path),
            Expression::InputRef { name } => write!(f, "{}", name),
            Expression::Binary { op, left, right } => {
                write!(f, "({} {} {})", left, op, right)
            }
            Expression::Unary { op, expr } => match op {
                UnaryOp::Not => write!(f, "(not {})", expr),
                UnaryOp::Neg => write!(f, "(- {})", expr),
                UnaryOp::IsNull => write!(f, "({} is null)", expr),
                UnaryOp::IsNotNull => write!(f, "({} is not null)", expr),
            },
            Expression::Aggregation {
                op,
                from,
                expr,
                filter,
            } => {
                write!(f, "{}(", op.keyword())?;
                match expr {
                    Some(e) => write!(f, "{}", e)?,
                    None => write!(f, "{}", from)?,
                }
                if let Some(w) = filter {
                    write!(f, " where {}", w)?;
                }
                write!(f, ")")
            }
            Expression::Call { name, args } => {
                write!(f, "{}(", name)?;
                write_args(f, args)?;
                write!(f, ")")
            }
            Expression::If {
                cond,
                then,
                otherwise,
            } => write!(f, "(if {} then {} else {})", cond, then, otherwise),
            Expression::Case {
                branches,
                otherwise,
            } => {
                write!(f, "case")?;
                for b in branches {
                    write!(f, " when {} then {}", b.when, b.then)?;
                }
                if let Some(e) = otherwise {
                    write!(f, " else {}", e)?;
                }
                write!(f, " end")
            }
            Expression::ListLiteral { items } => {
                write!(f, "[")?;
                write_args(f, items)?;
                write!(f, "]")
            }
            Expression::DateOp { op, args, unit } => {
                write!(f, "date_{}(", op.name())?;
                write_args(f, args)?;
                if let Some(u) = unit {
                    if !args.is_empty() {
                        write!(f, ", ")?;
                    }
                    write!(f, "'{}'", u)?;
                }
                write!(f, ")")
            }
            Expression::ListOp { op, list, args } => {
                write!(f, "list_{}({}", op.name(), list)?;
                for arg in args {
                    write!(f, ", {}", arg)?;
                }
                write!(f, ")")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Expression {
        // sum(items.quantity * items.unitPrice) > 100
        Expression::binary(
            BinaryOp::Gt,
            Expression::Aggregation {
                op: AggOp::Sum,
                from: "Item".into(),
                expr: Some(Box::new(Expression::binary(
                    BinaryOp::Mul,
                    Expression::field_ref("items.quantity"),
                    Expression::field_ref("items.unitPrice"),
                ))),
                filter: None,
            },
            Expression::literal(LiteralValue::Int(100)),
        )
    }

    #[test]
    fn test_tagged_json_shape() {
        let expr = Expression::binary(
            BinaryOp::Mul,
            Expression::self_ref("quantity"),
            Expression::self_ref("unitPrice"),
        );
        let json = serde_json::to_value(&expr).unwrap();
        assert_eq!(json["type"], "binary");
        assert_eq!(json["op"], "mul");
        assert_eq!(json["left"]["type"], "self");
        assert_eq!(json["left"]["field"], "quantity");
    }

    #[test]
    fn test_deserialize_aggregation_with_where() {
        let json = r#"{
            "type": "agg",
            "op": "count",
            "from": "Order",
            "where": {"type": "binary", "op": "eq",
                      "left": {"type": "ref", "path": "orders.status"},
                      "right": {"type": "literal", "value": "COMPLETED"}}
        }"#;
        let expr: Expression = serde_json::from_str(json).unwrap();
        match expr {
            Expression::Aggregation {
                op, from, filter, ..
            } => {
                assert_eq!(op, AggOp::Count);
                assert_eq!(from, "Order");
                assert!(filter.is_some());
            }
            other => panic!("expected aggregation, got {:?}", other),
        }
    }

    #[test]
    fn test_literal_null_and_numbers() {
        let null: Expression =
            serde_json::from_str(r#"{"type": "literal", "value": null}"#).unwrap();
        assert_eq!(null, Expression::literal(LiteralValue::Null));

        let int: Expression = serde_json::from_str(r#"{"type": "literal", "value": 5}"#).unwrap();
        assert_eq!(int, Expression::literal(LiteralValue::Int(5)));

        let float: Expression =
            serde_json::from_str(r#"{"type": "literal", "value": 1.5}"#).unwrap();
        assert_eq!(float, Expression::literal(LiteralValue::Float(1.5)));
    }

    #[test]
    fn test_walk_and_collectors() {
        let expr = sample();
        assert_eq!(expr.nodes().len(), 5);
        assert_eq!(expr.depth(), 3);
        assert_eq!(expr.field_paths(), vec!["items.quantity", "items.unitPrice"]);
        assert!(expr.call_names().is_empty());
    }

    #[test]
    fn test_display_is_parenthesised() {
        assert_eq!(
            sample().to_string(),
            "(sum((items.quantity * items.unitPrice)) > 100)"
        );
        let s = Expression::literal(LiteralValue::String("it's".into()));
        assert_eq!(s.to_string(), r"'it\'s'");
    }

    #[test]
    fn test_precedence_table() {
        assert!(BinaryOp::Or.precedence() < BinaryOp::And.precedence());
        assert!(BinaryOp::And.precedence() < BinaryOp::Eq.precedence());
        assert!(BinaryOp::In.precedence() < BinaryOp::Add.precedence());
        assert!(BinaryOp::Sub.precedence() < BinaryOp::Mod.precedence());
        assert!(BinaryOp::NotLike.is_comparison());
    }

    #[test]
    fn test_builtins() {
        assert!(is_builtin_function("round"));
        assert!(!is_builtin_function("order_total"));
    }
}
