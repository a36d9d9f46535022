//! Validation CLI command

use super::util::{load_spec, print_json};
use super::Outcome;
use meshspec::{validate_with_config, Result, ValidationReport};
use std::path::Path;

pub fn cmd_validate(spec_path: &Path, strict: bool, json: bool) -> Result<Outcome> {
    let (spec, mut config) = load_spec(spec_path)?;
    config.validation.strict |= strict;

    let report = validate_with_config(&spec, &config.validation);

    if json {
        print_json(&report)?;
    } else {
        print_validation_report(&report, spec_path);
    }

    Ok(Outcome::from_ok(report.is_valid))
}

fn print_validation_report(report: &ValidationReport, spec_path: &Path) {
    if report.is_valid && report.warning_count == 0 {
        println!("✓ {}: valid (no issues found)", spec_path.display());
        return;
    }

    println!("{}: {}", spec_path.display(), report.to_report());

    let fixes = report.fix_patches();
    if !fixes.is_empty() {
        println!("{} auto-fixable issue(s)", fixes.len());
    }
}
