//! Graph construction from a compiled spec

use super::refs::{ExprDeps, Resolver};
use super::{Graph, NodeId, NodeKind, Relation};
use crate::naming::Confidence;
use crate::spec::{ActionKind, Formula, Spec};

/// Builds a [`Graph`] from a spec. The spec is never modified.
pub struct GraphBuilder<'a> {
    spec: &'a Spec,
    infer_references: bool,
}

impl<'a> GraphBuilder<'a> {
    pub fn new(spec: &'a Spec) -> Self {
        Self {
            spec,
            infer_references: true,
        }
    }

    /// Enable or disable the naming-heuristic reference tier
    pub fn infer_references(mut self, enabled: bool) -> Self {
        self.infer_references = enabled;
        self
    }

    pub fn build(self) -> Graph {
        let mut graph = Graph::default();
        self.add_nodes(&mut graph);
        self.add_edges(&mut graph);

        tracing::debug!(
            nodes = graph.node_count(),
            edges = graph.edge_count(),
            "built dependency graph"
        );
        graph
    }

    /// All nodes go in first so edge insertion can check targets
    fn add_nodes(&self, graph: &mut Graph) {
        let spec = self.spec;

        for (name, entity) in &spec.entities {
            graph.add_node(NodeId::entity(name));
            for field in entity.fields.keys() {
                graph.add_node(NodeId::field(name, field));
            }
        }

        let sections: [(NodeKind, Vec<&String>); 13] = [
            (NodeKind::Derived, spec.derived.keys().collect()),
            (NodeKind::Function, spec.commands.keys().collect()),
            (NodeKind::Scenario, spec.scenarios.keys().collect()),
            (NodeKind::Invariant, spec.invariants.iter().map(|i| &i.id).collect()),
            (NodeKind::StateMachine, spec.state_machines.keys().collect()),
            (NodeKind::Event, spec.events.keys().collect()),
            (NodeKind::Subscription, spec.subscriptions.keys().collect()),
            (NodeKind::Saga, spec.sagas.keys().collect()),
            (NodeKind::Role, spec.roles.keys().collect()),
            (NodeKind::Gateway, spec.gateways.keys().collect()),
            (NodeKind::Deadline, spec.deadlines.keys().collect()),
            (NodeKind::Schedule, spec.schedules.keys().collect()),
            (NodeKind::Constraint, spec.constraints.keys().collect()),
        ];
        for (kind, names) in sections {
            for name in names {
                graph.add_node(NodeId::new(kind, name.as_str()));
            }
        }
    }

    fn add_edges(&self, graph: &mut Graph) {
        let spec = self.spec;
        let resolver = Resolver::new(spec, self.infer_references);
        let explicit = Confidence::Explicit;

        // Fields
        for (entity_name, entity) in &spec.entities {
            for (field_name, field) in &entity.fields {
                let id = NodeId::field(entity_name, field_name);
                graph.add_edge(
                    id.clone(),
                    NodeId::entity(entity_name),
                    Relation::BelongsTo,
                    explicit,
                );
                if let Some((target, confidence)) = resolver.field_target(field_name, field) {
                    graph.add_edge(id, NodeId::entity(target), Relation::References, confidence);
                }
            }
        }

        // Derived formulas
        for (name, derived) in &spec.derived {
            let id = NodeId::derived(name);
            if let Some(entity) = &derived.entity {
                graph.add_edge(id.clone(), NodeId::entity(entity), Relation::References, explicit);
            }
            let deps = formula_deps(&resolver, &derived.formula, derived.entity.as_deref());
            add_expr_edges(graph, &id, &deps, Relation::DerivesFrom);
        }

        // Functions
        for (name, cmd) in &spec.commands {
            let id = NodeId::function(name);
            for pre in &cmd.pre {
                if let Some(entity) = &pre.entity {
                    graph.add_edge(id.clone(), NodeId::entity(entity), Relation::References, explicit);
                }
                let deps = formula_deps(&resolver, &pre.expr, None);
                add_expr_edges(graph, &id, &deps, Relation::References);
            }
            for err in &cmd.error {
                let deps = formula_deps(&resolver, &err.when, None);
                add_expr_edges(graph, &id, &deps, Relation::References);
            }
            for post in &cmd.post {
                for (kind, target) in post.action.entity_targets() {
                    let relation = match kind {
                        ActionKind::Create => Relation::Creates,
                        ActionKind::Update => Relation::Modifies,
                        ActionKind::Delete => Relation::Deletes,
                    };
                    graph.add_edge(id.clone(), NodeId::entity(target), relation, explicit);
                }
                // an emitted event depends on its emitter, same as `emittedBy`
                if let Some(event) = &post.action.emit {
                    let event = NodeId::new(NodeKind::Event, event.as_str());
                    if graph.contains(&event) {
                        graph.add_edge(event, id.clone(), Relation::DependsOn, explicit);
                    }
                }
                if let Some(cond) = &post.condition {
                    let deps = formula_deps(&resolver, cond, None);
                    add_expr_edges(graph, &id, &deps, Relation::References);
                }
            }
        }

        // Scenarios
        for (name, scenario) in &spec.scenarios {
            let id = NodeId::scenario(name);
            if let Some(function) = scenario.called_function() {
                graph.add_edge(id.clone(), NodeId::function(function), Relation::DependsOn, explicit);
            }
            for entity in scenario.given_entities() {
                graph.add_edge(id.clone(), NodeId::entity(entity), Relation::References, explicit);
            }
        }

        // Invariants
        for inv in &spec.invariants {
            let id = NodeId::new(NodeKind::Invariant, inv.id.as_str());
            if let Some(entity) = &inv.entity {
                graph.add_edge(id.clone(), NodeId::entity(entity), Relation::References, explicit);
            }
            let deps = formula_deps(&resolver, &inv.expr, inv.entity.as_deref());
            add_expr_edges(graph, &id, &deps, Relation::References);
        }

        // State machines
        for (name, sm) in &spec.state_machines {
            let id = NodeId::new(NodeKind::StateMachine, name.as_str());
            if let Some(entity) = &sm.entity {
                graph.add_edge(id.clone(), NodeId::entity(entity), Relation::References, explicit);
                if let Some(field) = &sm.field {
                    graph.add_edge(
                        id.clone(),
                        NodeId::field(entity, field),
                        Relation::References,
                        explicit,
                    );
                }
            }
            for t in &sm.transitions {
                if let Some(trigger) = t.trigger() {
                    let function = NodeId::function(trigger);
                    let target = if graph.contains(&function) {
                        function
                    } else {
                        NodeId::new(NodeKind::Event, trigger)
                    };
                    graph.add_edge(id.clone(), target, Relation::DependsOn, explicit);
                }
                if let Some(guard) = &t.guard {
                    let deps = formula_deps(&resolver, guard, sm.entity.as_deref());
                    add_expr_edges(graph, &id, &deps, Relation::References);
                }
            }
        }

        // Events
        for (name, event) in &spec.events {
            let id = NodeId::new(NodeKind::Event, name.as_str());
            for function in &event.emitted_by {
                graph.add_edge(id.clone(), NodeId::function(function), Relation::DependsOn, explicit);
            }
            for field in event.payload.values() {
                if let Some(target) = field.typ.ref_target() {
                    graph.add_edge(id.clone(), NodeId::entity(target), Relation::References, explicit);
                }
            }
        }

        // Subscriptions
        for (name, sub) in &spec.subscriptions {
            let id = NodeId::new(NodeKind::Subscription, name.as_str());
            graph.add_edge(
                id.clone(),
                NodeId::new(NodeKind::Event, sub.event.as_str()),
                Relation::DependsOn,
                explicit,
            );
            graph.add_edge(id.clone(), NodeId::function(&sub.handler), Relation::Triggers, explicit);
            if let Some(filter) = &sub.filter {
                let deps = formula_deps(&resolver, filter, None);
                add_expr_edges(graph, &id, &deps, Relation::References);
            }
        }

        // Sagas
        for (name, saga) in &spec.sagas {
            let id = NodeId::new(NodeKind::Saga, name.as_str());
            for step in &saga.steps {
                graph.add_edge(id.clone(), NodeId::function(&step.action), Relation::Triggers, explicit);
                if let Some(comp) = &step.compensation {
                    graph.add_edge(id.clone(), NodeId::function(comp), Relation::Triggers, explicit);
                }
            }
        }

        // Roles
        for (name, role) in &spec.roles {
            let id = NodeId::new(NodeKind::Role, name.as_str());
            for parent in &role.inherits {
                graph.add_edge(
                    id.clone(),
                    NodeId::new(NodeKind::Role, parent.as_str()),
                    Relation::DependsOn,
                    explicit,
                );
            }
            for perm in &role.entity_permissions {
                graph.add_edge(id.clone(), NodeId::entity(&perm.entity), Relation::References, explicit);
            }
        }

        // Schedules
        for (name, schedule) in &spec.schedules {
            graph.add_edge(
                NodeId::new(NodeKind::Schedule, name.as_str()),
                NodeId::function(&schedule.action),
                Relation::Triggers,
                explicit,
            );
        }

        // Constraints
        for (name, constraint) in &spec.constraints {
            let id = NodeId::new(NodeKind::Constraint, name.as_str());
            if let Some(entity) = &constraint.entity {
                graph.add_edge(id.clone(), NodeId::entity(entity), Relation::References, explicit);
            }
            if let Some(expr) = &constraint.expr {
                let deps = formula_deps(&resolver, expr, constraint.entity.as_deref());
                add_expr_edges(graph, &id, &deps, Relation::References);
            }
        }

        // Gateways: incoming flows point at the gateway, outgoing flows away from it
        for (name, gateway) in &spec.gateways {
            let id = NodeId::new(NodeKind::Gateway, name.as_str());
            for source in &gateway.incoming_flows {
                if let Some(source) = flow_node(graph, source) {
                    graph.add_edge(source, id.clone(), Relation::Triggers, explicit);
                }
            }
            for flow in &gateway.outgoing_flows {
                if let Some(target) = flow_node(graph, &flow.target) {
                    graph.add_edge(id.clone(), target, Relation::Triggers, explicit);
                }
                if let Some(cond) = &flow.condition {
                    let deps = formula_deps(&resolver, cond, None);
                    add_expr_edges(graph, &id, &deps, Relation::References);
                }
            }
        }

        // Deadlines
        for (name, deadline) in &spec.deadlines {
            let id = NodeId::new(NodeKind::Deadline, name.as_str());
            if let Some(entity) = &deadline.entity {
                graph.add_edge(id.clone(), NodeId::entity(entity), Relation::References, explicit);
            }
            if let Some(on_expire) = &deadline.on_expire {
                if let Some(action) = &on_expire.action {
                    graph.add_edge(id.clone(), NodeId::function(action), Relation::Triggers, explicit);
                }
                if let Some(event) = &on_expire.event {
                    graph.add_edge(
                        id.clone(),
                        NodeId::new(NodeKind::Event, event.as_str()),
                        Relation::Triggers,
                        explicit,
                    );
                }
            }
        }
    }
}

/// A flow endpoint names a function or another gateway
fn flow_node(graph: &Graph, name: &str) -> Option<NodeId> {
    [NodeKind::Function, NodeKind::Gateway]
        .into_iter()
        .map(|kind| NodeId::new(kind, name))
        .find(|id| graph.contains(id))
}

/// Dependencies of a formula. Uncompiled formulas contribute nothing; the
/// validator reports them.
fn formula_deps(resolver: &Resolver<'_>, formula: &Formula, owner: Option<&str>) -> ExprDeps {
    formula
        .ast()
        .map(|expr| resolver.expression(expr, owner))
        .unwrap_or_default()
}

/// Entity and field references get `relation`; derived calls are `depends_on`
fn add_expr_edges(graph: &mut Graph, from: &NodeId, deps: &ExprDeps, relation: Relation) {
    for (entity, confidence) in &deps.entities {
        graph.add_edge(from.clone(), NodeId::entity(entity), relation, *confidence);
    }
    for (field, confidence) in &deps.fields {
        graph.add_edge(
            from.clone(),
            NodeId::new(NodeKind::Field, field.as_str()),
            relation,
            *confidence,
        );
    }
    for derived in &deps.derived {
        graph.add_edge(
            from.clone(),
            NodeId::derived(derived),
            Relation::DependsOn,
            Confidence::Explicit,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SPEC: &str = r#"
entities:
  Order:
    fields:
      total: { type: decimal }
      customerId: { type: string }
      status: { type: string }
  Customer:
    fields:
      name: { type: string }
  Item:
    fields:
      price: { type: decimal }
derived:
  order_total:
    entity: Order
    formula: sum(items.price)
  total_with_tax:
    entity: Order
    formula: order_total() * 1.2 + self.total
commands:
  place_order:
    pre:
      - expr: Customer.name != ''
    post:
      - action: { create: Order, emit: OrderPlaced }
scenarios:
  SC-001:
    given: [{ entity: Customer }]
    when: { call: place_order }
stateMachines:
  order_status:
    entity: Order
    field: status
    initial: OPEN
    states: { OPEN: {}, PAID: { final: true } }
    transitions:
      - { from: OPEN, to: PAID, trigger_function: place_order }
events:
  OrderPlaced:
    emittedBy: [place_order]
subscriptions:
  notify:
    event: OrderPlaced
    handler: place_order
roles:
  admin:
    inherits: [viewer]
    entityPermissions: [{ entity: Order }]
  viewer: {}
"#;

    fn graph(infer: bool) -> Graph {
        let spec = Spec::from_yaml(SPEC).unwrap().compiled();
        GraphBuilder::new(&spec).infer_references(infer).build()
    }

    #[test]
    fn test_nodes_for_every_section() {
        let g = graph(true);
        assert!(g.contains(&NodeId::entity("Order")));
        assert!(g.contains(&NodeId::field("Order", "total")));
        assert!(g.contains(&NodeId::derived("order_total")));
        assert!(g.contains(&NodeId::function("place_order")));
        assert!(g.contains(&NodeId::scenario("SC-001")));
        assert!(g.contains(&NodeId::new(NodeKind::StateMachine, "order_status")));
        assert!(g.contains(&NodeId::new(NodeKind::Role, "viewer")));
        assert_eq!(g.nodes_of_kind(NodeKind::Field).count(), 5);
    }

    #[test]
    fn test_structural_edges() {
        let g = graph(true);
        let f = NodeId::function("place_order");
        assert!(g.has_edge(&f, &NodeId::entity("Order"), Relation::Creates));
        assert!(g.has_edge(&f, &NodeId::entity("Customer"), Relation::References));
        let placed = NodeId::new(NodeKind::Event, "OrderPlaced");
        assert!(g.has_edge(&placed, &f, Relation::DependsOn));
        assert!(g.get_dependencies(&f).iter().all(|d| d.kind != NodeKind::Event));
        assert!(g.has_edge(&NodeId::scenario("SC-001"), &f, Relation::DependsOn));
        assert!(g.has_edge(
            &NodeId::new(NodeKind::StateMachine, "order_status"),
            &f,
            Relation::DependsOn
        ));
        assert!(g.has_edge(
            &NodeId::new(NodeKind::Role, "admin"),
            &NodeId::new(NodeKind::Role, "viewer"),
            Relation::DependsOn
        ));
    }

    #[test]
    fn test_formula_edges() {
        let g = graph(true);
        let d = NodeId::derived("total_with_tax");
        assert!(g.has_edge(&d, &NodeId::derived("order_total"), Relation::DependsOn));
        assert!(g.has_edge(&d, &NodeId::field("Order", "total"), Relation::DerivesFrom));
        assert!(g.has_edge(
            &NodeId::derived("order_total"),
            &NodeId::entity("Item"),
            Relation::DerivesFrom
        ));
    }

    #[test]
    fn test_inferred_foreign_key_edge() {
        let g = graph(true);
        let edge = g
            .edges()
            .find(|e| {
                e.from == NodeId::field("Order", "customerId") && e.relation == Relation::References
            })
            .expect("inferred reference edge");
        assert_eq!(edge.to, NodeId::entity("Customer"));
        assert_eq!(edge.confidence, Confidence::Inferred);

        let strict = graph(false);
        assert!(!strict.has_edge(
            &NodeId::field("Order", "customerId"),
            &NodeId::entity("Customer"),
            Relation::References
        ));
    }

    #[test]
    fn test_build_is_deterministic() {
        assert_eq!(graph(true).fingerprint(), graph(true).fingerprint());
    }
}
