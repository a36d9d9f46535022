//! Identifier heuristics
//!
//! Spec authors write collections in the plural (`orderItems`) and foreign
//! keys by suffix (`customerId`, `customer_id`). These helpers turn such
//! names back into entity names. They only guess; callers must prefer an
//! explicit declaration and tag anything derived here as inferred.

use regex::Regex;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

static FOREIGN_KEY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<base>[A-Za-z][A-Za-z0-9_]*?)(?:_id|Id)$").expect("valid foreign key pattern")
});

static IDENTIFIER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("valid identifier pattern"));

/// How a reference was established
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    /// Declared in the spec (e.g. `type: { ref: Customer }`)
    Explicit,
    /// Guessed from naming convention
    Inferred,
}

/// Singularize and capitalize a collection name: `orderItems` -> `OrderItem`,
/// `categories` -> `Category`, `address` stays `Address`.
pub fn to_entity_name(name: &str) -> String {
    let singular = if let Some(stem) = name.strip_suffix("ies") {
        format!("{}y", stem)
    } else if name.ends_with('s') && !name.ends_with("ss") {
        name[..name.len() - 1].to_string()
    } else {
        name.to_string()
    };

    let mut chars = singular.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Guess the entity a foreign-key-looking field points at:
/// `customerId` / `customer_id` -> `Customer`. A bare `id` yields nothing.
pub fn infer_foreign_key(field_name: &str) -> Option<String> {
    let caps = FOREIGN_KEY.captures(field_name)?;
    let base = caps.name("base")?.as_str();
    let mut out = String::new();
    for part in base.split('_').filter(|p| !p.is_empty()) {
        let mut chars = part.chars();
        if let Some(first) = chars.next() {
            out.extend(first.to_uppercase());
            out.push_str(chars.as_str());
        }
    }
    if out.is_empty() {
        None
    } else {
        Some(out)
    }
}

/// Matches the formula grammar's identifier rule
pub fn is_identifier(name: &str) -> bool {
    IDENTIFIER.is_match(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("items", "Item")]
    #[case("orderItems", "OrderItem")]
    #[case("categories", "Category")]
    #[case("address", "Address")]
    #[case("orders", "Order")]
    #[case("Invoice", "Invoice")]
    fn test_to_entity_name(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(to_entity_name(input), expected);
    }

    #[rstest]
    #[case("customerId", Some("Customer"))]
    #[case("customer_id", Some("Customer"))]
    #[case("order_item_id", Some("OrderItem"))]
    #[case("parentOrderId", Some("ParentOrder"))]
    #[case("id", None)]
    #[case("Id", None)]
    #[case("amount", None)]
    fn test_infer_foreign_key(#[case] input: &str, #[case] expected: Option<&str>) {
        assert_eq!(infer_foreign_key(input).as_deref(), expected);
    }

    #[test]
    fn test_is_identifier() {
        assert!(is_identifier("order_total"));
        assert!(is_identifier("_x1"));
        assert!(!is_identifier("1abc"));
        assert!(!is_identifier("a.b"));
    }
}
