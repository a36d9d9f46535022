//! Field constraint sanity (`min`/`max`, lengths, patterns)

use super::{Category, Diagnostic};
use crate::spec::{Field, Spec};
use regex::Regex;

/// Patterns are compiled with the `regex` crate, which has no lookaround
/// and no backreferences.
const PATTERN_DIALECT: &str = "regular expression without lookaround or backreferences";

pub(super) fn check(spec: &Spec) -> Vec<Diagnostic> {
    let mut diags = Vec::new();

    for (name, entity) in &spec.entities {
        for (field, def) in &entity.fields {
            check_field(&format!("entities.{}.fields.{}", name, field), def, &mut diags);
        }
    }
    for (name, cmd) in &spec.commands {
        for (field, def) in &cmd.input {
            check_field(&format!("commands.{}.input.{}", name, field), def, &mut diags);
        }
    }
    for (name, event) in &spec.events {
        for (field, def) in &event.payload {
            check_field(&format!("events.{}.payload.{}", name, field), def, &mut diags);
        }
    }

    diags
}

fn check_field(path: &str, field: &Field, diags: &mut Vec<Diagnostic>) {
    if let (Some(min), Some(max)) = (field.min, field.max) {
        if min > max {
            diags.push(
                Diagnostic::error(
                    "CNS-001",
                    Category::Constraint,
                    path,
                    format!("min ({}) is greater than max ({})", min, max),
                )
                .with_expected("min <= max"),
            );
        }
    }

    if field.typ.is_string_like() && (field.min.is_some() || field.max.is_some()) {
        diags.push(
            Diagnostic::warning(
                "CNS-002",
                Category::Constraint,
                path,
                "min/max on a string field; use minLength/maxLength",
            )
            .with_options(["minLength", "maxLength"]),
        );
    }

    if let Some(pattern) = &field.pattern {
        if let Err(e) = Regex::new(pattern) {
            diags.push(
                Diagnostic::error(
                    "CNS-003",
                    Category::Constraint,
                    format!("{}.pattern", path),
                    format!("Invalid pattern: {}", e),
                )
                .with_expected(PATTERN_DIALECT)
                .with_actual(pattern.as_str()),
            );
        }
    }

    if let (Some(min), Some(max)) = (field.min_length, field.max_length) {
        if min > max {
            diags.push(
                Diagnostic::error(
                    "CNS-004",
                    Category::Constraint,
                    path,
                    format!("minLength ({}) is greater than maxLength ({})", min, max),
                )
                .with_expected("minLength <= maxLength"),
            );
        }
    }
}
