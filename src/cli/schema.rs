//! Formula and schema CLI commands

use super::util::print_json;
use super::Outcome;
use meshspec::{Expression, ImpactAnalysis, MeshConfig, Result, Slice, Spec, ValidationReport};

pub fn cmd_parse(formula: &str) -> Result<Outcome> {
    let expr = meshspec::parse(formula)?;
    print_json(&expr)?;
    Ok(Outcome::Success)
}

pub fn cmd_schema(name: Option<&str>) -> Result<Outcome> {
    match name.unwrap_or("list") {
        "list" => {
            println!("Available schemas: spec, config, expression, validate, impact, slice");
            Ok(Outcome::Success)
        }
        "spec" => print_schema::<Spec>(),
        "config" => print_schema::<MeshConfig>(),
        "expression" => print_schema::<Expression>(),
        "validate" => print_schema::<ValidationReport>(),
        "impact" => print_schema::<ImpactAnalysis>(),
        "slice" => print_schema::<Slice>(),
        other => Err(format!("Unknown schema: {}", other).into()),
    }
}

fn print_schema<T: schemars::JsonSchema>() -> Result<Outcome> {
    let schema = schemars::schema_for!(T);
    print_json(&schema)?;
    Ok(Outcome::Success)
}
