//! Impact analysis and function slices

use super::{Graph, NodeId, NodeKind};
use crate::error::{Error, Result};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, VecDeque};
use std::fmt;
use std::str::FromStr;

/// Kind of proposed change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum ChangeType {
    Add,
    Modify,
    Remove,
}

impl fmt::Display for ChangeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ChangeType::Add => "add",
            ChangeType::Modify => "modify",
            ChangeType::Remove => "remove",
        })
    }
}

impl FromStr for ChangeType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "add" => Ok(ChangeType::Add),
            "modify" => Ok(ChangeType::Modify),
            "remove" | "delete" => Ok(ChangeType::Remove),
            other => Err(Error::Other(format!("Unknown change type: {}", other))),
        }
    }
}

/// Everything that transitively depends on a changed element, by kind
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct ImpactAnalysis {
    pub target: NodeId,
    pub change: ChangeType,
    pub affected_entities: BTreeSet<String>,
    pub affected_fields: BTreeSet<String>,
    pub affected_derived: BTreeSet<String>,
    pub affected_functions: BTreeSet<String>,
    pub affected_scenarios: BTreeSet<String>,
    pub affected_invariants: BTreeSet<String>,
    pub affected_state_machines: BTreeSet<String>,
    pub affected_events: BTreeSet<String>,
    pub affected_subscriptions: BTreeSet<String>,
    pub affected_sagas: BTreeSet<String>,
    pub affected_roles: BTreeSet<String>,
    pub affected_gateways: BTreeSet<String>,
    pub affected_deadlines: BTreeSet<String>,
    pub affected_schedules: BTreeSet<String>,
    pub affected_constraints: BTreeSet<String>,
    /// Only populated for removals reaching a function or scenario
    pub breaking_changes: Vec<String>,
}

impl ImpactAnalysis {
    fn empty(target: NodeId, change: ChangeType) -> Self {
        Self {
            target,
            change,
            affected_entities: BTreeSet::new(),
            affected_fields: BTreeSet::new(),
            affected_derived: BTreeSet::new(),
            affected_functions: BTreeSet::new(),
            affected_scenarios: BTreeSet::new(),
            affected_invariants: BTreeSet::new(),
            affected_state_machines: BTreeSet::new(),
            affected_events: BTreeSet::new(),
            affected_subscriptions: BTreeSet::new(),
            affected_sagas: BTreeSet::new(),
            affected_roles: BTreeSet::new(),
            affected_gateways: BTreeSet::new(),
            affected_deadlines: BTreeSet::new(),
            affected_schedules: BTreeSet::new(),
            affected_constraints: BTreeSet::new(),
            breaking_changes: Vec::new(),
        }
    }

    fn bucket_mut(&mut self, kind: NodeKind) -> &mut BTreeSet<String> {
        match kind {
            NodeKind::Entity => &mut self.affected_entities,
            NodeKind::Field => &mut self.affected_fields,
            NodeKind::Derived => &mut self.affected_derived,
            NodeKind::Function => &mut self.affected_functions,
            NodeKind::Scenario => &mut self.affected_scenarios,
            NodeKind::Invariant => &mut self.affected_invariants,
            NodeKind::StateMachine => &mut self.affected_state_machines,
            NodeKind::Event => &mut self.affected_events,
            NodeKind::Subscription => &mut self.affected_subscriptions,
            NodeKind::Saga => &mut self.affected_sagas,
            NodeKind::Role => &mut self.affected_roles,
            NodeKind::Gateway => &mut self.affected_gateways,
            NodeKind::Deadline => &mut self.affected_deadlines,
            NodeKind::Schedule => &mut self.affected_schedules,
            NodeKind::Constraint => &mut self.affected_constraints,
        }
    }

    fn buckets(&self) -> [(&'static str, &BTreeSet<String>); 15] {
        [
            ("entities", &self.affected_entities),
            ("fields", &self.affected_fields),
            ("derived", &self.affected_derived),
            ("functions", &self.affected_functions),
            ("scenarios", &self.affected_scenarios),
            ("invariants", &self.affected_invariants),
            ("state machines", &self.affected_state_machines),
            ("events", &self.affected_events),
            ("subscriptions", &self.affected_subscriptions),
            ("sagas", &self.affected_sagas),
            ("roles", &self.affected_roles),
            ("gateways", &self.affected_gateways),
            ("deadlines", &self.affected_deadlines),
            ("schedules", &self.affected_schedules),
            ("constraints", &self.affected_constraints),
        ]
    }

    pub fn is_breaking(&self) -> bool {
        !self.breaking_changes.is_empty()
    }

    pub fn total_affected(&self) -> usize {
        self.buckets().iter().map(|(_, set)| set.len()).sum()
    }

    /// Human-readable summary
    pub fn to_report(&self) -> String {
        let mut out = format!("Impact of {} {}\n", self.change, self.target);

        if self.total_affected() == 0 {
            out.push_str("  nothing depends on it\n");
        }
        for (label, set) in self.buckets() {
            if !set.is_empty() {
                let names: Vec<&str> = set.iter().map(String::as_str).collect();
                out.push_str(&format!("  {}: {}\n", label, names.join(", ")));
            }
        }

        if self.is_breaking() {
            out.push_str(&format!("\nBreaking changes ({}):\n", self.breaking_changes.len()));
            for b in &self.breaking_changes {
                out.push_str(&format!("  ✗ {}\n", b));
            }
        }

        out
    }
}

/// The part of a spec one function needs
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct Slice {
    pub function: String,
    pub entities: BTreeSet<String>,
    pub derived: BTreeSet<String>,
    pub scenarios: BTreeSet<String>,
    pub invariants: BTreeSet<String>,
    pub state_machines: BTreeSet<String>,
}

impl Graph {
    /// Transitive dependents of `target`, excluding the target itself
    pub fn analyze_impact(&self, target: &NodeId, change: ChangeType) -> Result<ImpactAnalysis> {
        if !self.contains(target) {
            // nothing can depend on an element that does not exist yet
            if change == ChangeType::Add {
                return Ok(ImpactAnalysis::empty(target.clone(), change));
            }
            return Err(Error::UnknownNode(target.to_string()));
        }

        let affected = self.closure(target, |id| self.reverse.get(id));
        let mut result = ImpactAnalysis::empty(target.clone(), change);

        for id in affected.iter().filter(|id| *id != target) {
            result.bucket_mut(id.kind).insert(id.name.clone());
        }

        if change == ChangeType::Remove {
            result.breaking_changes = affected
                .iter()
                .filter(|id| *id != target)
                .filter(|id| matches!(id.kind, NodeKind::Function | NodeKind::Scenario))
                .map(|id| format!("{} depends on removed {}", id, target))
                .collect();
        }

        tracing::debug!(
            target = %target,
            change = %change,
            affected = result.total_affected(),
            breaking = result.breaking_changes.len(),
            "analyzed impact"
        );
        Ok(result)
    }

    /// Everything a function transitively depends on, plus the scenarios
    /// that call it, the invariants over its entities, and the state machines
    /// it drives.
    pub fn get_slice(&self, function: &str) -> Result<Slice> {
        let id = NodeId::function(function);
        if !self.contains(&id) {
            return Err(Error::UnknownNode(id.to_string()));
        }

        let deps = self.closure(&id, |n| self.forward.get(n));
        let names_of = |kind: NodeKind| -> BTreeSet<String> {
            deps.iter()
                .filter(|n| n.kind == kind)
                .map(|n| n.name.clone())
                .collect()
        };
        let entities = names_of(NodeKind::Entity);
        let derived = names_of(NodeKind::Derived);

        let direct_dependents = self.get_dependents(&id);
        let dependents_of_kind = |kind: NodeKind| -> BTreeSet<String> {
            direct_dependents
                .iter()
                .filter(|n| n.kind == kind)
                .map(|n| n.name.clone())
                .collect()
        };

        let invariants = self
            .nodes_of_kind(NodeKind::Invariant)
            .filter(|inv| {
                self.get_dependencies(inv)
                    .iter()
                    .any(|d| d.kind == NodeKind::Entity && entities.contains(&d.name))
            })
            .map(|inv| inv.name.clone())
            .collect();

        Ok(Slice {
            function: function.to_string(),
            scenarios: dependents_of_kind(NodeKind::Scenario),
            state_machines: dependents_of_kind(NodeKind::StateMachine),
            entities,
            derived,
            invariants,
        })
    }

    /// Breadth-first closure from `start` (inclusive) along `next`
    fn closure<'a, F>(&'a self, start: &NodeId, next: F) -> BTreeSet<NodeId>
    where
        F: Fn(&NodeId) -> Option<&'a BTreeSet<NodeId>>,
    {
        let mut seen = BTreeSet::new();
        let mut queue = VecDeque::from([start.clone()]);

        while let Some(current) = queue.pop_front() {
            if !seen.insert(current.clone()) {
                continue;
            }
            if let Some(neighbors) = next(&current) {
                queue.extend(neighbors.iter().filter(|n| !seen.contains(*n)).cloned());
            }
        }

        seen
    }
}
