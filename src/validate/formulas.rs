//! Formula-level checks over compiled expressions

use super::{Category, Diagnostic};
use crate::error::ParseError;
use crate::expr::{is_builtin_function, Expression};
use crate::formula::UNKNOWN_SOURCE;
use crate::spec::Spec;

/// VAL-001, one per formula that failed to compile
pub(super) fn parse_failures(spec: &Spec, failures: &[(String, ParseError)]) -> Vec<Diagnostic> {
    let formulas = spec.formulas();

    failures
        .iter()
        .map(|(path, err)| {
            let mut diag = Diagnostic::error(
                "VAL-001",
                Category::Schema,
                path.clone(),
                format!("Formula failed to parse: {}", err),
            )
            .with_expected("valid formula expression");

            let source = formulas
                .iter()
                .find(|(p, _)| p == path)
                .and_then(|(_, f)| f.source());
            if let Some(source) = source {
                diag = diag.with_actual(source);
            }
            diag
        })
        .collect()
}

/// REF-005 unknown calls, LGC-002 unresolved aggregation sources and
/// REF-001 aggregations over undeclared entities
pub(super) fn check(spec: &Spec) -> Vec<Diagnostic> {
    let mut diags = Vec::new();

    for (path, formula) in spec.formulas() {
        let Some(ast) = formula.ast() else {
            continue;
        };

        ast.walk(&mut |node| match node {
            Expression::Call { name, .. } => {
                if !is_builtin_function(name) && !spec.derived.contains_key(name) {
                    diags.push(
                        Diagnostic::error(
                            "REF-005",
                            Category::Reference,
                            path.clone(),
                            format!("Unknown function '{}'", name),
                        )
                        .with_actual(name.as_str())
                        .with_options(spec.derived.keys()),
                    );
                }
            }
            Expression::Aggregation { op, from, .. } if from == UNKNOWN_SOURCE => {
                diags.push(Diagnostic::warning(
                    "LGC-002",
                    Category::Logic,
                    path.clone(),
                    format!("Could not infer the source collection of {}()", op.keyword()),
                ));
            }
            Expression::Aggregation { from, .. } => {
                if !spec.entities.contains_key(from) {
                    diags.push(
                        Diagnostic::error(
                            "REF-001",
                            Category::Reference,
                            path.clone(),
                            format!("Aggregation over unknown entity '{}'", from),
                        )
                        .with_actual(from.as_str())
                        .with_options(spec.entities.keys()),
                    );
                }
            }
            _ => {}
        });
    }

    diags
}
