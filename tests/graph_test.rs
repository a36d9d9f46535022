//! Dependency graph, impact analysis and slices over YAML specs

use meshspec::{
    ChangeType, Confidence, Error, Graph, GraphBuilder, NodeId, NodeKind, Relation, Spec,
};
use pretty_assertions::assert_eq;
use std::collections::BTreeSet;

const BILLING: &str = r#"
meta:
  id: billing
entities:
  Invoice:
    fields:
      amount: { type: decimal }
      customerId: { type: string }
      status: { type: string }
  Customer:
    fields:
      name: { type: string }
  Item:
    fields:
      price: { type: decimal }
derived:
  items_total:
    entity: Invoice
    formula: sum(items.price)
  grand_total:
    entity: Invoice
    formula: items_total() * 1.2
commands:
  create_invoice:
    input:
      amount: { type: decimal }
    pre:
      - expr: amount > 0
    post:
      - action: { create: Invoice }
  archive_invoice:
    post:
      - action: { delete: Invoice }
scenarios:
  SC-001:
    given: { Customer: {} }
    when: { call: create_invoice }
invariants:
  - id: INV-1
    entity: Invoice
    expr: self.amount >= 0
stateMachines:
  invoice_status:
    entity: Invoice
    field: status
    initial: DRAFT
    states: { DRAFT: {}, SENT: { final: true } }
    transitions:
      - { from: DRAFT, to: SENT, trigger: create_invoice }
"#;

fn names(set: &[&str]) -> BTreeSet<String> {
    set.iter().map(|s| s.to_string()).collect()
}

fn billing(infer: bool) -> Graph {
    let spec = Spec::from_yaml(BILLING).unwrap().compiled();
    GraphBuilder::new(&spec).infer_references(infer).build()
}

#[test]
fn test_remove_entity_is_breaking() {
    let g = billing(true);
    let impact = g
        .analyze_impact(&NodeId::entity("Invoice"), ChangeType::Remove)
        .unwrap();

    assert_eq!(
        impact.affected_functions,
        names(&["archive_invoice", "create_invoice"])
    );
    assert!(impact.affected_scenarios.contains("SC-001"));
    assert!(impact.affected_invariants.contains("INV-1"));
    assert!(impact.affected_state_machines.contains("invoice_status"));
    assert!(impact.affected_derived.contains("grand_total"));
    assert!(!impact.affected_entities.contains("Invoice"));
    assert!(impact.is_breaking());
}

#[test]
fn test_modify_reports_same_sets_without_breaking() {
    let g = billing(true);
    let target = NodeId::entity("Invoice");
    let removed = g.analyze_impact(&target, ChangeType::Remove).unwrap();
    let modified = g.analyze_impact(&target, ChangeType::Modify).unwrap();

    assert!(modified.breaking_changes.is_empty());
    assert_eq!(modified.affected_functions, removed.affected_functions);
    assert_eq!(modified.affected_scenarios, removed.affected_scenarios);
    assert_eq!(modified.total_affected(), removed.total_affected());
}

#[test]
fn test_field_impact_is_transitive_through_derived() {
    let g = billing(true);
    let impact = g
        .analyze_impact(&NodeId::field("Item", "price"), ChangeType::Remove)
        .unwrap();

    assert_eq!(impact.affected_derived, names(&["grand_total", "items_total"]));
    assert!(impact.breaking_changes.is_empty());
}

#[test]
fn test_naming_heuristics_can_be_disabled() {
    let inferred = billing(true);
    let strict = billing(false);
    let price = NodeId::field("Item", "price");

    assert!(inferred.has_edge(
        &NodeId::derived("items_total"),
        &price,
        Relation::DerivesFrom
    ));
    assert!(!strict.has_edge(
        &NodeId::derived("items_total"),
        &price,
        Relation::DerivesFrom
    ));

    let fk = NodeId::field("Invoice", "customerId");
    let customer = NodeId::entity("Customer");
    let edge = inferred
        .edges()
        .find(|e| e.from == fk && e.to == customer)
        .unwrap();
    assert_eq!(edge.confidence, Confidence::Inferred);
    assert!(!strict.has_edge(&fk, &customer, Relation::References));
}

#[test]
fn test_add_unknown_node_is_empty() {
    let g = billing(true);
    let impact = g
        .analyze_impact(&NodeId::entity("Payment"), ChangeType::Add)
        .unwrap();
    assert_eq!(impact.total_affected(), 0);

    assert!(matches!(
        g.analyze_impact(&NodeId::entity("Payment"), ChangeType::Remove),
        Err(Error::UnknownNode(_))
    ));
}

#[test]
fn test_slice() {
    let g = billing(true);
    let slice = g.get_slice("create_invoice").unwrap();

    assert_eq!(slice.entities, names(&["Invoice"]));
    assert_eq!(slice.scenarios, names(&["SC-001"]));
    assert_eq!(slice.invariants, names(&["INV-1"]));
    assert_eq!(slice.state_machines, names(&["invoice_status"]));
    assert!(g.get_slice("missing").is_err());
}

#[test]
fn test_one_hop_queries() {
    let g = billing(true);
    let deps = g.get_dependencies(&NodeId::scenario("SC-001"));
    assert_eq!(
        deps,
        [NodeId::entity("Customer"), NodeId::function("create_invoice")]
            .into_iter()
            .collect::<BTreeSet<_>>()
    );
    assert!(g
        .get_dependents(&NodeId::derived("items_total"))
        .contains(&NodeId::derived("grand_total")));
}

#[test]
fn test_find_node() {
    let g = billing(true);
    assert_eq!(
        g.find_node("function:create_invoice").unwrap(),
        NodeId::function("create_invoice")
    );
    assert_eq!(g.find_node("SC-001").unwrap(), NodeId::scenario("SC-001"));
    assert!(g.find_node("nowhere").is_err());
}

#[test]
fn test_build_is_deterministic() {
    assert_eq!(billing(true).fingerprint(), billing(true).fingerprint());
    assert_ne!(billing(true).fingerprint(), billing(false).fingerprint());
}

#[test]
fn test_mermaid_marks_inferred_edges() {
    let mermaid = billing(true).to_mermaid();
    assert!(mermaid.starts_with("graph LR"));
    assert!(mermaid.contains("-.->"));
    assert!(mermaid.contains("function_create_invoice"));
    assert_eq!(billing(true).nodes_of_kind(NodeKind::Entity).count(), 3);
}

#[test]
fn test_shared_event_does_not_link_emitters() {
    let spec = Spec::from_yaml(
        r#"
entities:
  X: { fields: { v: { type: string } } }
  Y: { fields: { v: { type: string } } }
commands:
  a:
    post:
      - action: { create: Y, emit: E }
  b:
    post:
      - action: { create: X, emit: E }
events:
  E:
    emittedBy: [a, b]
subscriptions:
  on_e: { event: E, handler: a }
"#,
    )
    .unwrap()
    .compiled();
    let g = GraphBuilder::new(&spec).build();

    let impact = g
        .analyze_impact(&NodeId::entity("X"), ChangeType::Remove)
        .unwrap();
    assert_eq!(impact.affected_functions, names(&["b"]));
    assert!(impact.affected_events.contains("E"));
    assert!(impact.breaking_changes.iter().all(|b| !b.contains("function:a")));

    assert_eq!(g.get_slice("a").unwrap().entities, names(&["Y"]));
    assert_eq!(g.get_slice("b").unwrap().entities, names(&["X"]));
}
