//! Reference resolution for graph edges
//!
//! Two tiers: declared structure first (an exact entity name, an explicit
//! `{ ref: X }` field type), then naming heuristics (`items` -> `Item`,
//! `customerId` -> `Customer`). Heuristic hits carry `Confidence::Inferred`.

use crate::expr::Expression;
use crate::naming::{infer_foreign_key, to_entity_name, Confidence};
use crate::spec::{Field, Spec};
use std::collections::{BTreeMap, BTreeSet};

/// Path prefixes that name an iteration variable rather than an entity
const LOCAL_PREFIXES: &[&str] = &["self", "item"];

/// Resolves names appearing in a spec to declared elements
#[derive(Debug, Clone, Copy)]
pub struct Resolver<'a> {
    spec: &'a Spec,
    infer: bool,
}

impl<'a> Resolver<'a> {
    pub fn new(spec: &'a Spec, infer: bool) -> Self {
        Self { spec, infer }
    }

    /// Entity named by `name`, exactly or (when enabled) via singularization
    pub fn entity(&self, name: &str) -> Option<(String, Confidence)> {
        if self.spec.entities.contains_key(name) {
            return Some((name.to_string(), Confidence::Explicit));
        }
        if !self.infer {
            return None;
        }
        let guess = to_entity_name(name);
        self.spec
            .entities
            .contains_key(&guess)
            .then_some((guess, Confidence::Inferred))
    }

    /// Entity a field points at: an explicit `ref`, else a foreign-key-shaped
    /// name. An explicit ref is returned even when the target is undeclared.
    pub fn field_target(&self, field_name: &str, field: &Field) -> Option<(String, Confidence)> {
        if let Some(target) = field.typ.ref_target() {
            return Some((target.to_string(), Confidence::Explicit));
        }
        if !self.infer {
            return None;
        }
        infer_foreign_key(field_name)
            .filter(|e| self.spec.entities.contains_key(e))
            .map(|e| (e, Confidence::Inferred))
    }

    /// Entity, field and derived references inside an expression.
    /// `owner` is the entity `self` refers to, if any.
    pub fn expression(&self, expr: &Expression, owner: Option<&str>) -> ExprDeps {
        let mut deps = ExprDeps::default();

        expr.walk(&mut |node| match node {
            Expression::FieldRef { path } => {
                let mut parts = path.split('.');
                let Some(head) = parts.next() else {
                    return;
                };
                if LOCAL_PREFIXES.contains(&head) {
                    return;
                }
                if let Some((entity, confidence)) = self.entity(head) {
                    if let Some(field) = parts.next() {
                        if self.has_field(&entity, field) {
                            deps.add_field(&entity, field, confidence);
                        }
                    }
                    deps.add_entity(entity, confidence);
                }
            }
            Expression::SelfRef { field } => {
                if let Some(owner) = owner {
                    let first = field.split('.').next().unwrap_or(field);
                    if self.has_field(owner, first) {
                        deps.add_field(owner, first, Confidence::Explicit);
                    }
                }
            }
            Expression::Aggregation { from, .. } => {
                // `from` is already singularized by the parser
                if self.spec.entities.contains_key(from) {
                    deps.add_entity(from.clone(), Confidence::Inferred);
                }
            }
            Expression::Call { name, .. } => {
                if self.spec.derived.contains_key(name) {
                    deps.derived.insert(name.clone());
                }
            }
            Expression::Literal { .. }
            | Expression::InputRef { .. }
            | Expression::Binary { .. }
            | Expression::Unary { .. }
            | Expression::If { .. }
            | Expression::Case { .. }
            | Expression::ListLiteral { .. }
            | Expression::DateOp { .. }
            | Expression::ListOp { .. } => {}
        });

        deps
    }

    fn has_field(&self, entity: &str, field: &str) -> bool {
        self.spec
            .entities
            .get(entity)
            .is_some_and(|e| e.fields.contains_key(field))
    }
}

/// What an expression refers to. Each target keeps its strongest confidence.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExprDeps {
    pub entities: BTreeMap<String, Confidence>,
    /// `Entity.field`
    pub fields: BTreeMap<String, Confidence>,
    pub derived: BTreeSet<String>,
}

impl ExprDeps {
    fn add_entity(&mut self, entity: String, confidence: Confidence) {
        let slot = self.entities.entry(entity).or_insert(confidence);
        *slot = (*slot).min(confidence);
    }

    fn add_field(&mut self, entity: &str, field: &str, confidence: Confidence) {
        let slot = self
            .fields
            .entry(format!("{}.{}", entity, field))
            .or_insert(confidence);
        *slot = (*slot).min(confidence);
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty() && self.fields.is_empty() && self.derived.is_empty()
    }
}
