//! Dependency graph over every named element of a spec
//!
//! Edges point from the dependent element to what it depends on: a function
//! that creates `Invoice` has an edge `function:create_invoice -> entity:Invoice`.
//! Impact analysis walks edges backwards; slices walk them forwards.
//!
//! ```rust,ignore
//! use meshspec::{Graph, NodeId, NodeKind, ChangeType};
//!
//! let graph = Graph::build(&spec);
//! let impact = graph.analyze_impact(&NodeId::entity("Invoice"), ChangeType::Remove)?;
//! assert!(impact.is_breaking());
//! ```

mod build;
mod impact;
mod refs;

pub use build::GraphBuilder;
pub use impact::{ChangeType, ImpactAnalysis, Slice};
pub use refs::{ExprDeps, Resolver};

use crate::error::{Error, Result};
use crate::naming::Confidence;
use crate::spec::Spec;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

/// Kind of spec element a node stands for
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Entity,
    Field,
    Derived,
    Function,
    Scenario,
    Invariant,
    StateMachine,
    Event,
    Subscription,
    Saga,
    Role,
    Gateway,
    Deadline,
    Schedule,
    Constraint,
}

impl NodeKind {
    pub const ALL: [NodeKind; 15] = [
        NodeKind::Entity,
        NodeKind::Field,
        NodeKind::Derived,
        NodeKind::Function,
        NodeKind::Scenario,
        NodeKind::Invariant,
        NodeKind::StateMachine,
        NodeKind::Event,
        NodeKind::Subscription,
        NodeKind::Saga,
        NodeKind::Role,
        NodeKind::Gateway,
        NodeKind::Deadline,
        NodeKind::Schedule,
        NodeKind::Constraint,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            NodeKind::Entity => "entity",
            NodeKind::Field => "field",
            NodeKind::Derived => "derived",
            NodeKind::Function => "function",
            NodeKind::Scenario => "scenario",
            NodeKind::Invariant => "invariant",
            NodeKind::StateMachine => "state_machine",
            NodeKind::Event => "event",
            NodeKind::Subscription => "subscription",
            NodeKind::Saga => "saga",
            NodeKind::Role => "role",
            NodeKind::Gateway => "gateway",
            NodeKind::Deadline => "deadline",
            NodeKind::Schedule => "schedule",
            NodeKind::Constraint => "constraint",
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NodeKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let normalized = match s {
            "command" => "function",
            "stateMachine" | "statemachine" => "state_machine",
            other => other,
        };
        NodeKind::ALL
            .into_iter()
            .find(|k| k.as_str() == normalized)
            .ok_or_else(|| Error::Other(format!("Unknown node kind: {}", s)))
    }
}

/// Typed node identity. Fields are named `Entity.field`.
#[derive(
    Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema,
)]
pub struct NodeId {
    pub kind: NodeKind,
    pub name: String,
}

impl NodeId {
    pub fn new(kind: NodeKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
        }
    }

    pub fn entity(name: impl Into<String>) -> Self {
        Self::new(NodeKind::Entity, name)
    }

    pub fn field(entity: &str, field: &str) -> Self {
        Self::new(NodeKind::Field, format!("{}.{}", entity, field))
    }

    pub fn function(name: impl Into<String>) -> Self {
        Self::new(NodeKind::Function, name)
    }

    pub fn derived(name: impl Into<String>) -> Self {
        Self::new(NodeKind::Derived, name)
    }

    pub fn scenario(name: impl Into<String>) -> Self {
        Self::new(NodeKind::Scenario, name)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.name)
    }
}

/// Edge label
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum Relation {
    References,
    DerivesFrom,
    Modifies,
    Creates,
    Deletes,
    Triggers,
    DependsOn,
    BelongsTo,
}

impl Relation {
    pub fn as_str(self) -> &'static str {
        match self {
            Relation::References => "references",
            Relation::DerivesFrom => "derives_from",
            Relation::Modifies => "modifies",
            Relation::Creates => "creates",
            Relation::Deletes => "deletes",
            Relation::Triggers => "triggers",
            Relation::DependsOn => "depends_on",
            Relation::BelongsTo => "belongs_to",
        }
    }
}

impl fmt::Display for Relation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(
    Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema,
)]
pub struct Edge {
    pub from: NodeId,
    pub to: NodeId,
    pub relation: Relation,
    pub confidence: Confidence,
}

/// Directed multigraph with at most one edge per `(from, to, relation)`
#[derive(Debug, Clone, Default, Serialize)]
pub struct Graph {
    nodes: BTreeSet<NodeId>,
    edges: BTreeSet<Edge>,
    #[serde(skip)]
    forward: BTreeMap<NodeId, BTreeSet<NodeId>>,
    #[serde(skip)]
    reverse: BTreeMap<NodeId, BTreeSet<NodeId>>,
}

impl Graph {
    /// Build with default options (naming-heuristic references enabled)
    pub fn build(spec: &Spec) -> Graph {
        GraphBuilder::new(spec).build()
    }

    pub(crate) fn add_node(&mut self, id: NodeId) {
        self.nodes.insert(id);
    }

    /// Insert an edge. Edges to unknown nodes are dropped; an explicit edge
    /// replaces an inferred one with the same endpoints and relation.
    pub(crate) fn add_edge(
        &mut self,
        from: NodeId,
        to: NodeId,
        relation: Relation,
        confidence: Confidence,
    ) -> bool {
        if !self.nodes.contains(&to) {
            tracing::warn!(from = %from, to = %to, relation = %relation, "dropping edge to missing node");
            return false;
        }

        let mut edge = Edge {
            from,
            to,
            relation,
            confidence: Confidence::Explicit,
        };
        if self.edges.contains(&edge) {
            return false;
        }
        if confidence == Confidence::Explicit {
            edge.confidence = Confidence::Inferred;
            self.edges.remove(&edge);
            edge.confidence = Confidence::Explicit;
        } else {
            edge.confidence = Confidence::Inferred;
            if self.edges.contains(&edge) {
                return false;
            }
        }

        self.forward
            .entry(edge.from.clone())
            .or_default()
            .insert(edge.to.clone());
        self.reverse
            .entry(edge.to.clone())
            .or_default()
            .insert(edge.from.clone());
        self.edges.insert(edge)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &NodeId> {
        self.nodes.iter()
    }

    pub fn edges(&self) -> impl Iterator<Item = &Edge> {
        self.edges.iter()
    }

    pub fn nodes_of_kind(&self, kind: NodeKind) -> impl Iterator<Item = &NodeId> {
        self.nodes.iter().filter(move |n| n.kind == kind)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn contains(&self, id: &NodeId) -> bool {
        self.nodes.contains(id)
    }

    /// Is there an edge `from -> to` with this relation?
    pub fn has_edge(&self, from: &NodeId, to: &NodeId, relation: Relation) -> bool {
        self.edges
            .iter()
            .any(|e| &e.from == from && &e.to == to && e.relation == relation)
    }

    /// Nodes this node points at (one hop)
    pub fn get_dependencies(&self, id: &NodeId) -> BTreeSet<NodeId> {
        self.forward.get(id).cloned().unwrap_or_default()
    }

    /// Nodes pointing at this node (one hop)
    pub fn get_dependents(&self, id: &NodeId) -> BTreeSet<NodeId> {
        self.reverse.get(id).cloned().unwrap_or_default()
    }

    /// Resolve `kind:name` or a bare name. A bare name must match exactly one node.
    pub fn find_node(&self, name: &str) -> Result<NodeId> {
        if let Some((kind, rest)) = name.split_once(':') {
            if let Ok(kind) = kind.parse::<NodeKind>() {
                let id = NodeId::new(kind, rest);
                return if self.contains(&id) {
                    Ok(id)
                } else {
                    Err(Error::UnknownNode(id.to_string()))
                };
            }
        }

        let mut matches = self.nodes.iter().filter(|n| n.name == name);
        match (matches.next(), matches.next()) {
            (Some(id), None) => Ok(id.clone()),
            (None, _) => Err(Error::UnknownNode(name.to_string())),
            (Some(a), Some(b)) => Err(Error::Other(format!(
                "Ambiguous node name '{}': matches {} and {}",
                name, a, b
            ))),
        }
    }

    /// SHA-256 over the sorted node and edge sets
    pub fn fingerprint(&self) -> String {
        use sha2::{Digest, Sha256};
        let mut hasher = Sha256::new();
        for node in &self.nodes {
            hasher.update(format!("node {}\n", node).as_bytes());
        }
        for edge in &self.edges {
            hasher.update(
                format!(
                    "edge {} -> {} {} {:?}\n",
                    edge.from, edge.to, edge.relation, edge.confidence
                )
                .as_bytes(),
            );
        }
        format!("sha256:{}", hex::encode(hasher.finalize()))
    }

    /// Mermaid flowchart
    pub fn to_mermaid(&self) -> String {
        let mut lines = vec!["graph LR".to_string()];

        for kind in NodeKind::ALL {
            lines.push(format!("    classDef {} fill:{}", kind, mermaid_color(kind)));
        }

        for node in &self.nodes {
            lines.push(format!(
                "    {}[\"{}\"]:::{}",
                mermaid_id(node),
                node.name.replace('"', "#quot;"),
                node.kind
            ));
        }

        for edge in &self.edges {
            let arrow = match edge.confidence {
                Confidence::Explicit => "-->",
                Confidence::Inferred => "-.->",
            };
            lines.push(format!(
                "    {} {}|{}| {}",
                mermaid_id(&edge.from),
                arrow,
                edge.relation,
                mermaid_id(&edge.to)
            ));
        }

        lines.join("\n")
    }
}

fn mermaid_id(id: &NodeId) -> String {
    let name: String = id
        .name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    format!("{}_{}", id.kind, name)
}

fn mermaid_color(kind: NodeKind) -> &'static str {
    match kind {
        NodeKind::Entity => "#e1f5fe",
        NodeKind::Field => "#eceff1",
        NodeKind::Derived => "#fff3e0",
        NodeKind::Function => "#e8f5e9",
        NodeKind::Scenario => "#fce4ec",
        NodeKind::Invariant => "#f3e5f5",
        NodeKind::StateMachine => "#ffecb3",
        NodeKind::Event => "#dcedc8",
        NodeKind::Subscription => "#b2dfdb",
        NodeKind::Saga => "#ffe0b2",
        NodeKind::Role => "#e1bee7",
        NodeKind::Gateway => "#b3e5fc",
        NodeKind::Deadline => "#ffcdd2",
        NodeKind::Schedule => "#c5cae9",
        NodeKind::Constraint => "#ffccbc",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small() -> Graph {
        let mut g = Graph::default();
        g.add_node(NodeId::entity("Order"));
        g.add_node(NodeId::function("place_order"));
        g.add_node(NodeId::scenario("SC-1"));
        g.add_edge(
            NodeId::function("place_order"),
            NodeId::entity("Order"),
            Relation::Creates,
            Confidence::Explicit,
        );
        g.add_edge(
            NodeId::scenario("SC-1"),
            NodeId::function("place_order"),
            Relation::DependsOn,
            Confidence::Explicit,
        );
        g
    }

    #[test]
    fn test_node_id_display_and_kind_parse() {
        assert_eq!(NodeId::entity("Order").to_string(), "entity:Order");
        assert_eq!(
            "state_machine".parse::<NodeKind>().unwrap(),
            NodeKind::StateMachine
        );
        assert_eq!("command".parse::<NodeKind>().unwrap(), NodeKind::Function);
        assert!("widget".parse::<NodeKind>().is_err());
    }

    #[test]
    fn test_edges_to_missing_nodes_dropped() {
        let mut g = small();
        let added = g.add_edge(
            NodeId::function("place_order"),
            NodeId::entity("Ghost"),
            Relation::References,
            Confidence::Explicit,
        );
        assert!(!added);
        assert_eq!(g.edge_count(), 2);
    }

    #[test]
    fn test_explicit_edge_replaces_inferred() {
        let mut g = small();
        let from = NodeId::scenario("SC-1");
        let to = NodeId::entity("Order");
        assert!(g.add_edge(from.clone(), to.clone(), Relation::References, Confidence::Inferred));
        assert!(!g.add_edge(from.clone(), to.clone(), Relation::References, Confidence::Inferred));
        assert!(g.add_edge(from.clone(), to.clone(), Relation::References, Confidence::Explicit));
        assert!(!g.add_edge(from, to, Relation::References, Confidence::Inferred));

        let refs: Vec<_> = g
            .edges()
            .filter(|e| e.relation == Relation::References)
            .collect();
        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].confidence, Confidence::Explicit);
    }

    #[test]
    fn test_one_hop_queries() {
        let g = small();
        let deps = g.get_dependencies(&NodeId::function("place_order"));
        assert_eq!(deps.into_iter().collect::<Vec<_>>(), vec![NodeId::entity("Order")]);
        let dependents = g.get_dependents(&NodeId::entity("Order"));
        assert_eq!(
            dependents.into_iter().collect::<Vec<_>>(),
            vec![NodeId::function("place_order")]
        );
        assert!(g.get_dependencies(&NodeId::entity("Nope")).is_empty());
    }

    #[test]
    fn test_find_node() {
        let g = small();
        assert_eq!(g.find_node("Order").unwrap(), NodeId::entity("Order"));
        assert_eq!(
            g.find_node("function:place_order").unwrap(),
            NodeId::function("place_order")
        );
        assert!(matches!(g.find_node("Nope"), Err(Error::UnknownNode(_))));
    }

    #[test]
    fn test_mermaid_export() {
        let out = small().to_mermaid();
        assert!(out.starts_with("graph LR"));
        assert!(out.contains("entity_Order[\"Order\"]:::entity"));
        assert!(out.contains("function_place_order -->|creates| entity_Order"));
        assert!(out.contains("scenario_SC_1"));
    }

    #[test]
    fn test_fingerprint_tracks_content() {
        let a = small();
        let mut b = small();
        assert_eq!(a.fingerprint(), b.fingerprint());
        b.add_node(NodeId::entity("Extra"));
        assert_ne!(a.fingerprint(), b.fingerprint());
    }
}
