//! Specification types: the declarative document every other module reads
//!
//! A `Spec` maps names to definitions for each section. Formulas may be
//! written as strings or as pre-built expression trees; `parse_formulas`
//! compiles the strings in place.
//!
//! ## Example Spec
//!
//! ```yaml
//! meta:
//!   id: billing
//! entities:
//!   Invoice:
//!     fields:
//!       total: { type: decimal, required: true, min: 0 }
//!       customerId: { type: { ref: Customer } }
//!   Customer:
//!     fields:
//!       name: { type: string, maxLength: 120 }
//! derived:
//!   invoice_total:
//!     entity: Invoice
//!     formula: sum(lines.quantity * lines.unitPrice)
//! commands:
//!   create_invoice:
//!     pre:
//!       - expr: total > 0
//!     post:
//!       - action: { create: Invoice }
//! scenarios:
//!   SC-001:
//!     when: { call: create_invoice }
//! stateMachines:
//!   invoice_status:
//!     entity: Invoice
//!     initial: Draft
//!     states:
//!       Draft: {}
//!       Paid: { final: true }
//!     transitions:
//!       - { from: Draft, to: Paid, trigger_function: pay_invoice }
//! ```

use crate::error::{Error, ParseError, Result};
use crate::expr::Expression;
use crate::formula::{Parser, DEFAULT_MAX_DEPTH};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// A complete specification
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
#[schemars(title = "meshspec Spec", description = "Declarative application specification")]
pub struct Spec {
    #[serde(default, skip_serializing_if = "SpecMeta::is_empty")]
    pub meta: SpecMeta,

    #[serde(default, alias = "state")]
    pub entities: BTreeMap<String, Entity>,

    #[serde(default)]
    pub derived: BTreeMap<String, Derived>,

    #[serde(default, alias = "functions")]
    pub commands: BTreeMap<String, Command>,

    #[serde(default)]
    pub scenarios: BTreeMap<String, Scenario>,

    #[serde(default)]
    pub invariants: Vec<Invariant>,

    #[serde(default)]
    pub state_machines: BTreeMap<String, StateMachine>,

    #[serde(default)]
    pub roles: BTreeMap<String, Role>,

    #[serde(default)]
    pub events: BTreeMap<String, Event>,

    #[serde(default)]
    pub subscriptions: BTreeMap<String, Subscription>,

    #[serde(default)]
    pub sagas: BTreeMap<String, Saga>,

    #[serde(default)]
    pub gateways: BTreeMap<String, Gateway>,

    #[serde(default)]
    pub deadlines: BTreeMap<String, Deadline>,

    #[serde(default)]
    pub schedules: BTreeMap<String, Schedule>,

    #[serde(default)]
    pub constraints: BTreeMap<String, Constraint>,
}

/// Spec metadata
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct SpecMeta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

impl SpecMeta {
    pub fn is_empty(&self) -> bool {
        self.id.is_none() && self.title.is_none() && self.version.is_none()
    }
}

/// A formula: source text until compiled, an expression tree afterwards.
///
/// Spec documents may carry either form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum Formula {
    Source(String),
    Parsed(Expression),
}

impl Formula {
    /// The expression tree, if compiled
    pub fn ast(&self) -> Option<&Expression> {
        match self {
            Formula::Parsed(expr) => Some(expr),
            Formula::Source(_) => None,
        }
    }

    pub fn source(&self) -> Option<&str> {
        match self {
            Formula::Source(s) => Some(s),
            Formula::Parsed(_) => None,
        }
    }

    /// Parse source text into a tree. A failed compile leaves the source in
    /// place.
    pub fn compile(&mut self, max_depth: usize) -> std::result::Result<(), ParseError> {
        if let Formula::Source(src) = self {
            let expr = Parser::new(src).with_max_depth(max_depth).parse()?;
            *self = Formula::Parsed(expr);
        }
        Ok(())
    }
}

impl From<&str> for Formula {
    fn from(s: &str) -> Self {
        Formula::Source(s.to_string())
    }
}

impl From<Expression> for Formula {
    fn from(expr: Expression) -> Self {
        Formula::Parsed(expr)
    }
}

// ============================================================================
// Entities
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct Entity {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default)]
    pub fields: BTreeMap<String, Field>,
}

/// An entity field, command input, or event payload field
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Field {
    #[serde(rename = "type")]
    pub typ: FieldType,

    #[serde(default)]
    pub required: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_length: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_length: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Field {
    pub fn of(typ: FieldType) -> Self {
        Self {
            typ,
            required: false,
            min: None,
            max: None,
            min_length: None,
            max_length: None,
            pattern: None,
            description: None,
        }
    }
}

/// Field type: a scalar name, an explicit entity reference, or an enum
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum FieldType {
    Named(String),
    Ref {
        #[serde(rename = "ref")]
        target: String,
    },
    Enum {
        #[serde(rename = "enum")]
        values: Vec<String>,
    },
    Other(serde_json::Value),
}

impl FieldType {
    /// Target entity of an explicit `{ ref: X }`
    pub fn ref_target(&self) -> Option<&str> {
        match self {
            FieldType::Ref { target } => Some(target),
            _ => None,
        }
    }

    pub fn is_string_like(&self) -> bool {
        match self {
            FieldType::Named(name) => matches!(name.as_str(), "string" | "text"),
            FieldType::Enum { .. } => true,
            FieldType::Ref { .. } | FieldType::Other(_) => false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Derived {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity: Option<String>,

    pub formula: Formula,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub returns: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

// ============================================================================
// Commands
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct Command {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default)]
    pub input: BTreeMap<String, Field>,

    #[serde(default)]
    pub pre: Vec<Precondition>,

    #[serde(default)]
    pub post: Vec<PostAction>,

    #[serde(default)]
    pub error: Vec<ErrorCase>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Precondition {
    pub expr: Formula,

    /// Entity the precondition reads
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct PostAction {
    pub action: Action,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<Formula>,
}

/// What a post action does. Usually exactly one key is set.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct Action {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub create: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delete: Option<String>,

    /// Event emitted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emit: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionKind {
    Create,
    Update,
    Delete,
}

impl ActionKind {
    /// Key of the action in the document
    pub fn key(self) -> &'static str {
        match self {
            ActionKind::Create => "create",
            ActionKind::Update => "update",
            ActionKind::Delete => "delete",
        }
    }
}

impl Action {
    /// Entity targets with the kind of write
    pub fn entity_targets(&self) -> Vec<(ActionKind, &str)> {
        [
            (ActionKind::Create, &self.create),
            (ActionKind::Update, &self.update),
            (ActionKind::Delete, &self.delete),
        ]
        .into_iter()
        .filter_map(|(kind, target)| target.as_deref().map(|t| (kind, t)))
        .collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ErrorCase {
    pub code: String,

    pub when: Formula,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

// ============================================================================
// Scenarios and invariants
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct Scenario {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    /// Either `{Entity: data}` or `[{entity: Entity, ...}]`
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub given: serde_json::Value,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub when: Option<ScenarioCall>,

    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub then: serde_json::Value,
}

impl Scenario {
    /// Entity names set up by `given`, in either accepted shape
    pub fn given_entities(&self) -> Vec<&str> {
        match &self.given {
            serde_json::Value::Object(map) => map.keys().map(String::as_str).collect(),
            serde_json::Value::Array(items) => items
                .iter()
                .filter_map(|item| item.get("entity").and_then(|e| e.as_str()))
                .collect(),
            _ => Vec::new(),
        }
    }

    pub fn called_function(&self) -> Option<&str> {
        self.when.as_ref().map(|w| w.call.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ScenarioCall {
    pub call: String,

    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub input: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Invariant {
    pub id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity: Option<String>,

    pub expr: Formula,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

// ============================================================================
// State machines
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct StateMachine {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,

    #[serde(default)]
    pub states: BTreeMap<String, State>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initial: Option<String>,

    #[serde(default)]
    pub transitions: Vec<Transition>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct State {
    #[serde(default, rename = "final")]
    pub is_final: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Transition {
    pub from: String,

    pub to: String,

    #[serde(default, alias = "trigger", skip_serializing_if = "Option::is_none")]
    pub trigger_function: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guard: Option<Formula>,
}

impl Transition {
    pub fn new(from: &str, to: &str, trigger: &str) -> Self {
        Self {
            from: from.to_string(),
            to: to.to_string(),
            trigger_function: Some(trigger.to_string()),
            event: None,
            guard: None,
        }
    }

    pub fn with_guard(mut self, guard: impl Into<Formula>) -> Self {
        self.guard = Some(guard.into());
        self
    }

    /// Trigger function, falling back to the triggering event
    pub fn trigger(&self) -> Option<&str> {
        self.trigger_function
            .as_deref()
            .or(self.event.as_deref())
            .filter(|t| !t.is_empty())
    }
}

// ============================================================================
// Roles
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Role {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default)]
    pub inherits: Vec<String>,

    #[serde(default)]
    pub entity_permissions: Vec<EntityPermission>,

    #[serde(default)]
    pub permissions: Vec<String>,
}

impl Role {
    pub fn inheriting(parents: &[&str]) -> Self {
        Self {
            inherits: parents.iter().map(|p| p.to_string()).collect(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct EntityPermission {
    pub entity: String,

    #[serde(default)]
    pub operations: Vec<String>,
}

// ============================================================================
// Secondary sections
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    #[serde(default)]
    pub payload: BTreeMap<String, Field>,

    #[serde(default)]
    pub emitted_by: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Subscription {
    pub event: String,

    pub handler: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<Formula>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct Saga {
    #[serde(default)]
    pub steps: Vec<SagaStep>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SagaStep {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    pub action: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compensation: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Gateway {
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,

    #[serde(default)]
    pub incoming_flows: Vec<String>,

    #[serde(default)]
    pub outgoing_flows: Vec<GatewayFlow>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct GatewayFlow {
    pub target: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<Formula>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Deadline {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_expire: Option<OnExpire>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct OnExpire {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Schedule {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cron: Option<String>,

    pub action: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct Constraint {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expr: Option<Formula>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

// ============================================================================
// Loading and compilation
// ============================================================================

impl Spec {
    /// Parse spec from YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_norway::from_str(yaml).map_err(|e| Error::SpecParse(e.to_string()))
    }

    /// Serialize spec to YAML string
    pub fn to_yaml(&self) -> Result<String> {
        serde_norway::to_string(self).map_err(|e| Error::SpecParse(e.to_string()))
    }

    /// Parse spec from JSON string
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Error::SpecParse(e.to_string()))
    }

    /// Serialize spec to JSON string
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| Error::SpecParse(e.to_string()))
    }

    /// Read a spec file (`.json` as JSON, anything else as YAML) and compile
    /// its formulas. Formulas that fail to parse stay as source text.
    pub fn load(path: &Path, max_depth: usize) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let mut spec = match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::from_json(&content)?,
            _ => Self::from_yaml(&content)?,
        };
        spec.parse_formulas(max_depth);
        Ok(spec)
    }

    /// Compile every formula string in place. Returns the failures by path;
    /// the failed formulas keep their source text.
    pub fn parse_formulas(&mut self, max_depth: usize) -> Vec<(String, ParseError)> {
        let mut failures = Vec::new();
        let mut compiled = 0usize;

        self.visit_formulas_mut(&mut |path, formula| {
            if formula.ast().is_some() {
                return;
            }
            match formula.compile(max_depth) {
                Ok(()) => compiled += 1,
                Err(e) => {
                    tracing::warn!(path = %path, error = %e, "formula failed to parse");
                    failures.push((path, e));
                }
            }
        });

        tracing::debug!(compiled, failed = failures.len(), "compiled spec formulas");
        failures
    }

    /// Compile with the default nesting limit
    pub fn compiled(mut self) -> Self {
        self.parse_formulas(DEFAULT_MAX_DEPTH);
        self
    }

    /// Every formula with its location in the document
    pub fn formulas(&self) -> Vec<(String, &Formula)> {
        let mut out = Vec::new();
        self.visit_formulas(&mut |path, f| out.push((path, f)));
        out
    }

    pub fn visit_formulas<'a>(&'a self, visit: &mut impl FnMut(String, &'a Formula)) {
        for (name, d) in &self.derived {
            visit(format!("derived.{}.formula", name), &d.formula);
        }
        for (name, cmd) in &self.commands {
            for (i, pre) in cmd.pre.iter().enumerate() {
                visit(format!("commands.{}.pre[{}].expr", name, i), &pre.expr);
            }
            for (i, post) in cmd.post.iter().enumerate() {
                if let Some(cond) = &post.condition {
                    visit(format!("commands.{}.post[{}].condition", name, i), cond);
                }
            }
            for (i, err) in cmd.error.iter().enumerate() {
                visit(format!("commands.{}.error[{}].when", name, i), &err.when);
            }
        }
        for (i, inv) in self.invariants.iter().enumerate() {
            visit(format!("invariants[{}].expr", i), &inv.expr);
        }
        for (name, sm) in &self.state_machines {
            for (i, t) in sm.transitions.iter().enumerate() {
                if let Some(guard) = &t.guard {
                    visit(format!("stateMachines.{}.transitions[{}].guard", name, i), guard);
                }
            }
        }
        for (name, sub) in &self.subscriptions {
            if let Some(filter) = &sub.filter {
                visit(format!("subscriptions.{}.filter", name), filter);
            }
        }
        for (name, gw) in &self.gateways {
            for (i, flow) in gw.outgoing_flows.iter().enumerate() {
                if let Some(cond) = &flow.condition {
                    visit(format!("gateways.{}.outgoingFlows[{}].condition", name, i), cond);
                }
            }
        }
        for (name, c) in &self.constraints {
            if let Some(expr) = &c.expr {
                visit(format!("constraints.{}.expr", name), expr);
            }
        }
    }

    pub fn visit_formulas_mut(&mut self, visit: &mut impl FnMut(String, &mut Formula)) {
        for (name, d) in &mut self.derived {
            visit(format!("derived.{}.formula", name), &mut d.formula);
        }
        for (name, cmd) in &mut self.commands {
            for (i, pre) in cmd.pre.iter_mut().enumerate() {
                visit(format!("commands.{}.pre[{}].expr", name, i), &mut pre.expr);
            }
            for (i, post) in cmd.post.iter_mut().enumerate() {
                if let Some(cond) = &mut post.condition {
                    visit(format!("commands.{}.post[{}].condition", name, i), cond);
                }
            }
            for (i, err) in cmd.error.iter_mut().enumerate() {
                visit(format!("commands.{}.error[{}].when", name, i), &mut err.when);
            }
        }
        for (i, inv) in self.invariants.iter_mut().enumerate() {
            visit(format!("invariants[{}].expr", i), &mut inv.expr);
        }
        for (name, sm) in &mut self.state_machines {
            for (i, t) in sm.transitions.iter_mut().enumerate() {
                if let Some(guard) = &mut t.guard {
                    visit(format!("stateMachines.{}.transitions[{}].guard", name, i), guard);
                }
            }
        }
        for (name, sub) in &mut self.subscriptions {
            if let Some(filter) = &mut sub.filter {
                visit(format!("subscriptions.{}.filter", name), filter);
            }
        }
        for (name, gw) in &mut self.gateways {
            for (i, flow) in gw.outgoing_flows.iter_mut().enumerate() {
                if let Some(cond) = &mut flow.condition {
                    visit(format!("gateways.{}.outgoingFlows[{}].condition", name, i), cond);
                }
            }
        }
        for (name, c) in &mut self.constraints {
            if let Some(expr) = &mut c.expr {
                visit(format!("constraints.{}.expr", name), expr);
            }
        }
    }

    /// Compute hash of spec for change detection
    pub fn hash(&self) -> Result<String> {
        use sha2::{Digest, Sha256};
        let content = serde_json::to_string(self)?;
        let mut hasher = Sha256::new();
        hasher.update(content.as_bytes());
        Ok(format!("sha256:{}", hex::encode(hasher.finalize())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::{BinaryOp, LiteralValue};

    const YAML: &str = r#"
meta:
  id: shop
entities:
  Order:
    fields:
      total: { type: decimal, required: true, min: 0 }
      customerId: { type: { ref: Customer } }
      status: { type: { enum: [OPEN, PAID] } }
  Customer:
    fields:
      name: { type: string }
derived:
  order_total:
    entity: Order
    formula: sum(items.quantity * items.unitPrice)
  doubled:
    entity: Order
    formula:
      type: binary
      op: mul
      left: { type: self, field: total }
      right: { type: literal, value: 2 }
functions:
  place_order:
    pre:
      - expr: total > 0
    post:
      - action: { create: Order }
        condition: total > 100
    error:
      - code: EMPTY
        when: count(items) = 0
scenarios:
  SC-001:
    given:
      Customer: { name: Ann }
    when: { call: place_order }
stateMachines:
  order_status:
    entity: Order
    initial: OPEN
    states:
      OPEN: {}
      PAID: { final: true }
    transitions:
      - { from: OPEN, to: PAID, trigger: pay, guard: "self.total > 0" }
"#;

    #[test]
    fn test_parse_yaml() {
        let spec = Spec::from_yaml(YAML).unwrap();
        assert_eq!(spec.meta.id.as_deref(), Some("shop"));
        assert_eq!(spec.entities.len(), 2);
        assert_eq!(spec.commands.len(), 1, "`functions` is accepted as an alias");
        assert_eq!(
            spec.entities["Order"].fields["customerId"].typ.ref_target(),
            Some("Customer")
        );
        assert!(spec.entities["Order"].fields["status"].typ.is_string_like());
        let t = &spec.state_machines["order_status"].transitions[0];
        assert_eq!(t.trigger(), Some("pay"));
        assert!(spec.state_machines["order_status"].states["PAID"].is_final);
        assert_eq!(spec.scenarios["SC-001"].given_entities(), vec!["Customer"]);
    }

    #[test]
    fn test_formula_accepts_string_or_tree() {
        let spec = Spec::from_yaml(YAML).unwrap();
        assert!(spec.derived["order_total"].formula.source().is_some());
        match spec.derived["doubled"].formula.ast() {
            Some(Expression::Binary { op, right, .. }) => {
                assert_eq!(*op, BinaryOp::Mul);
                assert_eq!(**right, Expression::literal(LiteralValue::Int(2)));
            }
            other => panic!("expected binary tree, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_formulas_in_place() {
        let mut spec = Spec::from_yaml(YAML).unwrap();
        assert_eq!(spec.formulas().len(), 6);

        let failures = spec.parse_formulas(DEFAULT_MAX_DEPTH);
        assert!(failures.is_empty(), "{:?}", failures);
        assert!(spec.formulas().iter().all(|(_, f)| f.ast().is_some()));
    }

    #[test]
    fn test_parse_failure_keeps_source() {
        let mut spec = Spec::from_yaml(YAML).unwrap();
        spec.invariants.push(Invariant {
            id: "INV-1".into(),
            entity: Some("Order".into()),
            expr: Formula::from("total >"),
            description: None,
        });

        let failures = spec.parse_formulas(DEFAULT_MAX_DEPTH);
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].0, "invariants[0].expr");
        assert_eq!(spec.invariants[0].expr.source(), Some("total >"));
    }

    #[test]
    fn test_action_targets() {
        let action = Action {
            create: Some("Invoice".into()),
            delete: Some("Draft".into()),
            ..Default::default()
        };
        assert_eq!(
            action.entity_targets(),
            vec![(ActionKind::Create, "Invoice"), (ActionKind::Delete, "Draft")]
        );
    }

    #[test]
    fn test_hash_is_stable() {
        let a = Spec::from_yaml(YAML).unwrap();
        let b = Spec::from_yaml(YAML).unwrap();
        let hash = a.hash().unwrap();
        assert_eq!(hash, b.hash().unwrap());
        assert!(hash.starts_with("sha256:"));

        let mut changed = b;
        changed.entities.remove("Order");
        assert_ne!(hash, changed.hash().unwrap());
    }

    #[test]
    fn test_load_json_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("spec.json");
        std::fs::write(
            &path,
            r#"{"entities": {"A": {"fields": {}}}, "derived": {"x": {"formula": "1 + 2"}}}"#,
        )
        .unwrap();

        let spec = Spec::load(&path, DEFAULT_MAX_DEPTH).unwrap();
        assert!(spec.derived["x"].formula.ast().is_some());
    }
}
