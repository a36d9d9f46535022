//! Graph, impact and slice CLI commands

use super::util::{load_spec, print_json};
use super::Outcome;
use meshspec::{ChangeType, GraphBuilder, MeshConfig, NodeId, NodeKind, Result, Spec};
use std::path::Path;

fn build_graph(spec: &Spec, config: &MeshConfig) -> meshspec::Graph {
    GraphBuilder::new(spec)
        .infer_references(config.validation.infer_references)
        .build()
}

pub fn cmd_graph(spec_path: &Path, mermaid: bool) -> Result<Outcome> {
    let (spec, config) = load_spec(spec_path)?;
    let graph = build_graph(&spec, &config);

    if mermaid {
        println!("{}", graph.to_mermaid());
    } else {
        print_json(&graph)?;
    }
    Ok(Outcome::Success)
}

pub fn cmd_impact(
    spec_path: &Path,
    kind: &str,
    name: &str,
    change: &str,
    json: bool,
) -> Result<Outcome> {
    let kind: NodeKind = kind.parse()?;
    let change: ChangeType = change.parse()?;

    let (spec, config) = load_spec(spec_path)?;
    let graph = build_graph(&spec, &config);
    let impact = graph.analyze_impact(&NodeId::new(kind, name), change)?;

    if json {
        print_json(&impact)?;
    } else {
        print!("{}", impact.to_report());
    }

    Ok(Outcome::from_ok(!impact.is_breaking()))
}

pub fn cmd_slice(spec_path: &Path, function: &str) -> Result<Outcome> {
    let (spec, config) = load_spec(spec_path)?;
    let graph = build_graph(&spec, &config);
    print_json(&graph.get_slice(function)?)?;
    Ok(Outcome::Success)
}
