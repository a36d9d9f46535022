//! Formula parser behavior through the public API

use meshspec::expr::{CaseBranch, Expression as E};
use meshspec::formula::{parse_with_max_depth, Parser};
use meshspec::{parse, AggOp, BinaryOp, LiteralValue, UnaryOp};
use pretty_assertions::assert_eq;
use rstest::rstest;

fn int(i: i64) -> E {
    E::literal(LiteralValue::Int(i))
}

fn bin(op: BinaryOp, l: E, r: E) -> E {
    E::binary(op, l, r)
}

// ============================================================================
// Precedence and associativity
// ============================================================================

#[rstest]
#[case("1 + 2 * 3", bin(BinaryOp::Add, int(1), bin(BinaryOp::Mul, int(2), int(3))))]
#[case("1 * 2 + 3", bin(BinaryOp::Add, bin(BinaryOp::Mul, int(1), int(2)), int(3)))]
#[case("1 - 2 - 3", bin(BinaryOp::Sub, bin(BinaryOp::Sub, int(1), int(2)), int(3)))]
#[case("8 / 4 % 3", bin(BinaryOp::Mod, bin(BinaryOp::Div, int(8), int(4)), int(3)))]
#[case("(1 + 2) * 3", bin(BinaryOp::Mul, bin(BinaryOp::Add, int(1), int(2)), int(3)))]
#[case(
    "a or b and c",
    bin(BinaryOp::Or, E::input("a"), bin(BinaryOp::And, E::input("b"), E::input("c")))
)]
#[case(
    "x + 1 > y",
    bin(BinaryOp::Gt, bin(BinaryOp::Add, E::input("x"), int(1)), E::input("y"))
)]
#[case(
    "a = 1 and b != 2",
    bin(
        BinaryOp::And,
        bin(BinaryOp::Eq, E::input("a"), int(1)),
        bin(BinaryOp::Ne, E::input("b"), int(2))
    )
)]
#[case(
    "1 * not a + b",
    bin(
        BinaryOp::Add,
        bin(BinaryOp::Mul, int(1), E::unary(UnaryOp::Not, E::input("a"))),
        E::input("b")
    )
)]
#[case(
    "a and not b = c",
    bin(
        BinaryOp::And,
        E::input("a"),
        E::unary(UnaryOp::Not, bin(BinaryOp::Eq, E::input("b"), E::input("c")))
    )
)]
fn test_precedence(#[case] formula: &str, #[case] expected: E) {
    assert_eq!(parse(formula).unwrap(), expected);
}

#[rstest]
#[case("1 - 2", bin(BinaryOp::Sub, int(1), int(2)))]
#[case("1 -2", bin(BinaryOp::Sub, int(1), int(2)))]
#[case("-2", int(-2))]
#[case("-x", E::unary(UnaryOp::Neg, E::input("x")))]
#[case("3 * -2", bin(BinaryOp::Mul, int(3), int(-2)))]
fn test_minus(#[case] formula: &str, #[case] expected: E) {
    assert_eq!(parse(formula).unwrap(), expected);
}

// ============================================================================
// Primaries
// ============================================================================

#[rstest]
#[case("true", E::literal(LiteralValue::Bool(true)))]
#[case("null", E::literal(LiteralValue::Null))]
#[case("2.5", E::literal(LiteralValue::Float(2.5)))]
#[case(r"'it\'s'", E::literal(LiteralValue::String("it's".into())))]
#[case(r#""a\"b""#, E::literal(LiteralValue::String("a\"b".into())))]
#[case("self.total", E::self_ref("total"))]
#[case("Order.customer.name", E::field_ref("Order.customer.name"))]
#[case("amount", E::input("amount"))]
#[case("android", E::input("android"))]
#[case("inventory", E::input("inventory"))]
fn test_primaries(#[case] formula: &str, #[case] expected: E) {
    assert_eq!(parse(formula).unwrap(), expected);
}

#[test]
fn test_list_and_membership() {
    assert_eq!(
        parse("role in ['admin', 'owner']").unwrap(),
        bin(
            BinaryOp::In,
            E::input("role"),
            E::ListLiteral {
                items: vec![
                    E::literal(LiteralValue::String("admin".into())),
                    E::literal(LiteralValue::String("owner".into())),
                ],
            }
        )
    );
    assert_eq!(
        parse("role not in []").unwrap(),
        bin(BinaryOp::NotIn, E::input("role"), E::ListLiteral { items: vec![] })
    );
}

#[test]
fn test_if_and_case() {
    assert_eq!(
        parse("if a > 0 then a else 0").unwrap(),
        E::If {
            cond: Box::new(bin(BinaryOp::Gt, E::input("a"), int(0))),
            then: Box::new(E::input("a")),
            otherwise: Box::new(int(0)),
        }
    );
    assert_eq!(
        parse("case when a then 1 end").unwrap(),
        E::Case {
            branches: vec![CaseBranch {
                when: E::input("a"),
                then: int(1),
            }],
            otherwise: None,
        }
    );
}

#[test]
fn test_call() {
    assert_eq!(
        parse("round(self.total, 2)").unwrap(),
        E::Call {
            name: "round".into(),
            args: vec![E::self_ref("total"), int(2)],
        }
    );
}

// ============================================================================
// Aggregations
// ============================================================================

#[test]
fn test_aggregation_source_inferred_from_plural() {
    assert_eq!(
        parse("sum(items.quantity * items.unitPrice)").unwrap(),
        E::Aggregation {
            op: AggOp::Sum,
            from: "Item".into(),
            expr: Some(Box::new(bin(
                BinaryOp::Mul,
                E::field_ref("items.quantity"),
                E::field_ref("items.unitPrice"),
            ))),
            filter: None,
        }
    );
}

#[rstest]
#[case("count(orders)", AggOp::Count, "Order")]
#[case("exists(lineItems where item.qty > 0)", AggOp::Exists, "LineItem")]
#[case("avg(2 * reviews.score)", AggOp::Avg, "Review")]
#[case("max(1 + 2)", AggOp::Max, "Unknown")]
fn test_aggregation_sources(#[case] formula: &str, #[case] op: AggOp, #[case] from: &str) {
    match parse(formula).unwrap() {
        E::Aggregation { op: got, from: src, .. } => {
            assert_eq!(got, op);
            assert_eq!(src, from);
        }
        other => panic!("expected aggregation, got {:?}", other),
    }
}

#[test]
fn test_where_clause() {
    let expr = parse("sum(items.price where items.active = true)").unwrap();
    let E::Aggregation { filter, .. } = expr else {
        panic!("expected aggregation");
    };
    assert_eq!(
        filter.map(|f| *f),
        Some(bin(
            BinaryOp::Eq,
            E::field_ref("items.active"),
            E::literal(LiteralValue::Bool(true))
        ))
    );
}

// ============================================================================
// Errors
// ============================================================================

#[rstest]
#[case::dangling_operator("1 +", 3)]
#[case::juxtaposed_literals("1 1", 2)]
#[case::unclosed_paren("(1 + 2", 6)]
#[case::empty("", 0)]
#[case::reserved_word("then", 0)]
#[case::unterminated_string("'abc", 0)]
fn test_parse_errors(#[case] formula: &str, #[case] position: usize) {
    let err = parse(formula).unwrap_err();
    assert_eq!(err.position, position, "{}", err);
}

#[test]
fn test_depth_limit_configurable() {
    let nested = format!("{}1{}", "(".repeat(30), ")".repeat(30));
    assert!(parse(&nested).is_ok());
    assert!(parse_with_max_depth(&nested, 10).is_err());
    assert!(Parser::new(&nested).with_max_depth(100).parse().is_ok());

    let deep = format!("{}1{}", "(".repeat(5000), ")".repeat(5000));
    let err = parse(&deep).unwrap_err();
    assert!(err.message.contains("nested too deeply"));
}

// ============================================================================
// Display
// ============================================================================

#[rstest]
#[case("1 + 2 * 3", "(1 + (2 * 3))")]
#[case("not a = b", "(not (a = b))")]
#[case("x is not null", "(x is not null)")]
#[case("count(orders where item.open)", "count(Order where item.open)")]
fn test_display(#[case] formula: &str, #[case] rendered: &str) {
    assert_eq!(parse(formula).unwrap().to_string(), rendered);
}
