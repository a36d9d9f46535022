//! Cycle detection over name graphs (role inheritance, derived formulas)

use super::{Category, Diagnostic};
use crate::spec::Spec;
use std::collections::{BTreeMap, BTreeSet};

/// DFS colouring: absent is white, `Open` is on the current path, `Done` is
/// fully explored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    Open,
    Done,
}

/// Cycles in `graph`, one per back-edge found by a depth-first search that
/// restarts from every unvisited node.
///
/// Each node is expanded once, so the search is linear in the size of the
/// graph. Cycles that only share a back-edge with one already found are not
/// reported separately. Each cycle is rotated to start at its smallest member
/// and ends with that member repeated, e.g. `["A", "B", "C", "A"]`. Neighbors
/// that are not keys of the graph are ignored. The result is sorted.
pub fn find_cycles<'a>(graph: &BTreeMap<&'a str, Vec<&'a str>>) -> Vec<Vec<&'a str>> {
    let mut marks = BTreeMap::new();
    let mut path = Vec::new();
    let mut cycles = BTreeSet::new();

    for &root in graph.keys() {
        if !marks.contains_key(root) {
            visit(graph, root, &mut marks, &mut path, &mut cycles);
        }
    }

    cycles.into_iter().collect()
}

fn visit<'a>(
    graph: &BTreeMap<&'a str, Vec<&'a str>>,
    node: &'a str,
    marks: &mut BTreeMap<&'a str, Mark>,
    path: &mut Vec<&'a str>,
    cycles: &mut BTreeSet<Vec<&'a str>>,
) {
    marks.insert(node, Mark::Open);
    path.push(node);

    for &next in graph.get(node).into_iter().flatten() {
        if !graph.contains_key(next) {
            continue;
        }
        match marks.get(next) {
            None => visit(graph, next, marks, path, cycles),
            Some(Mark::Open) => {
                if let Some(at) = path.iter().position(|&n| n == next) {
                    cycles.insert(rooted(&path[at..]));
                }
            }
            Some(Mark::Done) => {}
        }
    }

    path.pop();
    marks.insert(node, Mark::Done);
}

/// Rotate so the smallest member leads, then close the loop
fn rooted<'a>(members: &[&'a str]) -> Vec<&'a str> {
    let min = members
        .iter()
        .enumerate()
        .min_by_key(|(_, name)| **name)
        .map_or(0, |(i, _)| i);
    let mut cycle: Vec<&str> = members[min..].iter().chain(&members[..min]).copied().collect();
    if let Some(&first) = cycle.first() {
        cycle.push(first);
    }
    cycle
}

fn describe(cycle: &[&str]) -> String {
    cycle.join(" -> ")
}

/// LGC-001
pub(super) fn role_cycles(spec: &Spec) -> Vec<Diagnostic> {
    let graph: BTreeMap<&str, Vec<&str>> = spec
        .roles
        .iter()
        .map(|(name, role)| {
            (
                name.as_str(),
                role.inherits.iter().map(String::as_str).collect(),
            )
        })
        .collect();

    find_cycles(&graph)
        .into_iter()
        .map(|cycle| {
            Diagnostic::error(
                "LGC-001",
                Category::Logic,
                format!("roles.{}.inherits", cycle[0]),
                format!("Circular role inheritance: {}", describe(&cycle)),
            )
            .with_expected("acyclic role hierarchy")
            .with_actual(describe(&cycle))
        })
        .collect()
}

/// LGC-003, derived formulas calling each other in a loop
pub(super) fn derived_cycles(spec: &Spec) -> Vec<Diagnostic> {
    let graph: BTreeMap<&str, Vec<&str>> = spec
        .derived
        .iter()
        .map(|(name, derived)| {
            let calls = derived
                .formula
                .ast()
                .map(|ast| {
                    ast.call_names()
                        .into_iter()
                        .filter(|c| spec.derived.contains_key(*c))
                        .collect()
                })
                .unwrap_or_default();
            (name.as_str(), calls)
        })
        .collect();

    find_cycles(&graph)
        .into_iter()
        .map(|cycle| {
            Diagnostic::warning(
                "LGC-003",
                Category::Logic,
                format!("derived.{}.formula", cycle[0]),
                format!("Derived formulas reference each other: {}", describe(&cycle)),
            )
        })
        .collect()
}
