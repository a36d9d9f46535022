//! Property-based tests for the formula parser
//!
//! Uses proptest to generate expression trees and operator chains

use meshspec::expr::{CaseBranch, Expression};
use meshspec::{parse, BinaryOp, LiteralValue, UnaryOp};
use proptest::prelude::*;

proptest! {
    #[test]
    fn test_display_reparses_to_same_tree(expr in any_expression()) {
        let rendered = expr.to_string();
        let reparsed = parse(&rendered);
        prop_assert_eq!(reparsed, Ok(expr), "rendered: {}", rendered);
    }

    #[test]
    fn test_lower_precedence_nests_outside(
        (low, high) in op_pair(),
        a in 0i64..100,
        b in 0i64..100,
        c in 0i64..100,
    ) {
        let formula = format!("{} {} {} {} {}", a, low.symbol(), b, high.symbol(), c);
        let expected = Expression::binary(
            low,
            int(a),
            Expression::binary(high, int(b), int(c)),
        );
        prop_assert_eq!(parse(&formula), Ok(expected));
    }

    #[test]
    fn test_equal_precedence_is_left_associative(
        ops in prop::collection::vec(arithmetic_op(), 2..5),
    ) {
        // 1 op 2 op 3 ... must fold from the left
        let mut formula = "1".to_string();
        let mut expected = int(1);
        for (i, op) in ops.iter().enumerate() {
            let n = i as i64 + 2;
            formula.push_str(&format!(" {} {}", op.symbol(), n));
            expected = Expression::binary(*op, expected, int(n));
        }
        if ops.iter().all(|op| op.precedence() == ops[0].precedence()) {
            prop_assert_eq!(parse(&formula), Ok(expected));
        }
    }

    #[test]
    fn test_never_panics(input in "\\PC{0,48}") {
        let _ = parse(&input);
    }

    #[test]
    fn test_trailing_garbage_rejected(expr in any_expression(), junk in "[0-9]{1,3}") {
        let formula = format!("{} {}", expr, junk);
        prop_assert!(parse(&formula).is_err());
    }
}

fn int(i: i64) -> Expression {
    Expression::literal(LiteralValue::Int(i))
}

fn arithmetic_op() -> impl Strategy<Value = BinaryOp> {
    prop_oneof![
        Just(BinaryOp::Add),
        Just(BinaryOp::Sub),
        Just(BinaryOp::Mul),
        Just(BinaryOp::Div),
        Just(BinaryOp::Mod),
    ]
}

fn any_binary_op() -> impl Strategy<Value = BinaryOp> {
    prop_oneof![
        arithmetic_op(),
        Just(BinaryOp::Eq),
        Just(BinaryOp::Ne),
        Just(BinaryOp::Lt),
        Just(BinaryOp::Le),
        Just(BinaryOp::Gt),
        Just(BinaryOp::Ge),
        Just(BinaryOp::And),
        Just(BinaryOp::Or),
        Just(BinaryOp::In),
        Just(BinaryOp::NotIn),
        Just(BinaryOp::Like),
        Just(BinaryOp::NotLike),
    ]
}

/// Two operators where the first binds strictly looser
fn op_pair() -> impl Strategy<Value = (BinaryOp, BinaryOp)> {
    (any_binary_op(), any_binary_op())
        .prop_filter("needs strictly lower precedence first", |(low, high)| {
            low.precedence() < high.precedence()
        })
}

fn leaf() -> impl Strategy<Value = Expression> {
    prop_oneof![
        any::<i64>().prop_map(int),
        any::<bool>().prop_map(|b| Expression::literal(LiteralValue::Bool(b))),
        Just(Expression::literal(LiteralValue::Null)),
        "[a-z '\\\\]{0,8}".prop_map(|s| Expression::literal(LiteralValue::String(s))),
        prop::sample::select(vec!["price", "qty", "status", "orders"]).prop_map(Expression::input),
        prop::sample::select(vec!["total", "customer.name"]).prop_map(Expression::self_ref),
        prop::sample::select(vec!["Order.total", "Item.price"]).prop_map(Expression::field_ref),
    ]
}

fn any_expression() -> impl Strategy<Value = Expression> {
    leaf().prop_recursive(4, 32, 3, |inner| {
        prop_oneof![
            (any_binary_op(), inner.clone(), inner.clone())
                .prop_map(|(op, l, r)| Expression::binary(op, l, r)),
            (
                prop::sample::select(vec![
                    UnaryOp::Not,
                    UnaryOp::Neg,
                    UnaryOp::IsNull,
                    UnaryOp::IsNotNull
                ]),
                inner.clone()
            )
                .prop_map(|(op, e)| Expression::unary(op, e)),
            (inner.clone(), inner.clone(), inner.clone()).prop_map(|(c, t, o)| Expression::If {
                cond: Box::new(c),
                then: Box::new(t),
                otherwise: Box::new(o),
            }),
            (inner.clone(), inner.clone()).prop_map(|(w, t)| Expression::Case {
                branches: vec![CaseBranch { when: w, then: t }],
                otherwise: None,
            }),
            prop::collection::vec(inner.clone(), 0..3)
                .prop_map(|items| Expression::ListLiteral { items }),
            prop::collection::vec(inner, 0..3).prop_map(|args| Expression::Call {
                name: "coalesce".into(),
                args,
            }),
        ]
    })
}
