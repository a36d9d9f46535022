//! Spec validation: static checks that run to completion and report every
//! finding at once.
//!
//! Each rule is a pure function from a compiled spec to its diagnostics;
//! `validate_spec` concatenates them. Codes follow a prefix convention:
//! `REF-*` unknown reference, `VAL-*` generic, `FSM-*`/`TRANS-*` state
//! machines, `LGC-*` logic, `CNS-*` field constraints.

mod constraints;
mod cycles;
mod formulas;
mod references;
mod state_machine;

pub use cycles::find_cycles;
pub use state_machine::reachable_states;

use crate::config::ValidationConfig;
use crate::spec::Spec;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Severity of a diagnostic. Warnings never block downstream use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical,
    Error,
    Warning,
}

impl Severity {
    pub fn is_blocking(self) -> bool {
        !matches!(self, Severity::Warning)
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Severity::Critical => "critical",
            Severity::Error => "error",
            Severity::Warning => "warning",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Schema,
    Reference,
    Type,
    Logic,
    Constraint,
}

/// A single patch operation against the spec document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum FixPatch {
    Add {
        path: String,
        value: serde_json::Value,
    },
    Replace {
        path: String,
        value: serde_json::Value,
    },
    Remove {
        path: String,
    },
}

/// A validation finding
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Diagnostic {
    /// Location in the spec, e.g. `stateMachines.order.transitions[2]`
    pub path: String,
    pub code: String,
    pub category: Category,
    pub severity: Severity,
    pub message: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actual: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub valid_options: Vec<String>,

    #[serde(default)]
    pub auto_fixable: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fix: Option<FixPatch>,
}

impl Diagnostic {
    pub fn new(
        severity: Severity,
        code: &str,
        category: Category,
        path: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            path: path.into(),
            code: code.to_string(),
            category,
            severity,
            message: message.into(),
            expected: None,
            actual: None,
            valid_options: Vec::new(),
            auto_fixable: false,
            fix: None,
        }
    }

    pub fn error(
        code: &str,
        category: Category,
        path: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::new(Severity::Error, code, category, path, message)
    }

    pub fn warning(
        code: &str,
        category: Category,
        path: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::new(Severity::Warning, code, category, path, message)
    }

    pub fn with_expected(mut self, expected: impl Into<String>) -> Self {
        self.expected = Some(expected.into());
        self
    }

    pub fn with_actual(mut self, actual: impl Into<String>) -> Self {
        self.actual = Some(actual.into());
        self
    }

    pub fn with_options<I, S>(mut self, options: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.valid_options = options.into_iter().map(Into::into).collect();
        self
    }

    /// Attach a suggested patch. `auto_fixable` marks it safe to apply blindly.
    pub fn with_fix(mut self, fix: FixPatch, auto_fixable: bool) -> Self {
        self.fix = Some(fix);
        self.auto_fixable = auto_fixable;
        self
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} {}: {}",
            self.code, self.severity, self.path, self.message
        )
    }
}

/// Result of spec validation
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ValidationReport {
    pub is_valid: bool,
    pub errors: Vec<Diagnostic>,
    pub warnings: Vec<Diagnostic>,
    pub error_count: usize,
    pub warning_count: usize,
}

impl ValidationReport {
    /// Split diagnostics by severity. In strict mode warnings become errors.
    pub fn from_diagnostics(diagnostics: Vec<Diagnostic>, strict: bool) -> Self {
        let (mut errors, mut warnings): (Vec<_>, Vec<_>) = diagnostics
            .into_iter()
            .partition(|d| d.severity.is_blocking());

        if strict {
            for mut w in warnings.drain(..) {
                w.severity = Severity::Error;
                errors.push(w);
            }
        }

        Self {
            is_valid: errors.is_empty(),
            error_count: errors.len(),
            warning_count: warnings.len(),
            errors,
            warnings,
        }
    }

    /// Errors then warnings
    pub fn diagnostics(&self) -> impl Iterator<Item = &Diagnostic> {
        self.errors.iter().chain(self.warnings.iter())
    }

    /// Diagnostics carrying `code`
    pub fn with_code<'a>(&'a self, code: &'a str) -> impl Iterator<Item = &'a Diagnostic> {
        self.diagnostics().filter(move |d| d.code == code)
    }

    /// Patches of auto-fixable diagnostics
    pub fn fix_patches(&self) -> Vec<&FixPatch> {
        self.diagnostics()
            .filter(|d| d.auto_fixable)
            .filter_map(|d| d.fix.as_ref())
            .collect()
    }

    /// Human-readable report
    pub fn to_report(&self) -> String {
        let mut out = String::new();

        if self.is_valid {
            out.push_str("✓ Spec is valid");
        } else {
            out.push_str("✗ Spec is invalid");
        }
        out.push_str(&format!(
            " ({} errors, {} warnings)\n",
            self.error_count, self.warning_count
        ));

        for d in self.diagnostics() {
            out.push_str(&format!("\n  {}\n", d));
            if let Some(expected) = &d.expected {
                out.push_str(&format!("      expected: {}\n", expected));
            }
            if let Some(actual) = &d.actual {
                out.push_str(&format!("      actual:   {}\n", actual));
            }
            if !d.valid_options.is_empty() {
                out.push_str(&format!("      options:  {}\n", d.valid_options.join(", ")));
            }
            if d.auto_fixable {
                out.push_str("      (auto-fixable)\n");
            }
        }

        out
    }
}

type Rule = fn(&Spec) -> Vec<Diagnostic>;

const RULES: &[(&str, Rule)] = &[
    ("references", references::check),
    ("formulas", formulas::check),
    ("role_cycles", cycles::role_cycles),
    ("derived_cycles", cycles::derived_cycles),
    ("state_machines", state_machine::check),
    ("transition_conflicts", state_machine::transition_conflicts),
    ("field_constraints", constraints::check),
];

/// Validate with default settings
pub fn validate_spec(spec: &Spec, strict: bool) -> ValidationReport {
    let config = ValidationConfig {
        strict,
        ..ValidationConfig::default()
    };
    validate_with_config(spec, &config)
}

/// Run every rule over a compiled copy of `spec`
pub fn validate_with_config(spec: &Spec, config: &ValidationConfig) -> ValidationReport {
    let mut compiled = spec.clone();
    let failures = compiled.parse_formulas(config.max_formula_depth);

    let mut diagnostics = formulas::parse_failures(&compiled, &failures);
    for (name, rule) in RULES {
        let found = rule(&compiled);
        tracing::debug!(rule = name, count = found.len(), "ran validation rule");
        diagnostics.extend(found);
    }

    let report = ValidationReport::from_diagnostics(diagnostics, config.strict);
    tracing::debug!(
        errors = report.error_count,
        warnings = report.warning_count,
        "validated spec"
    );
    report
}
