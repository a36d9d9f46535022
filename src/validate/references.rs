//! Name references between spec sections: entities, functions, events, roles

use super::{Category, Diagnostic, FixPatch};
use crate::spec::Spec;

fn unknown(
    code: &str,
    what: &str,
    path: String,
    name: &str,
    options: impl Iterator<Item = impl Into<String>>,
) -> Diagnostic {
    Diagnostic::error(
        code,
        Category::Reference,
        path,
        format!("Unknown {} '{}'", what, name),
    )
    .with_actual(name)
    .with_options(options)
}

pub(super) fn check(spec: &Spec) -> Vec<Diagnostic> {
    let mut diags = Vec::new();
    entity_refs(spec, &mut diags);
    function_refs(spec, &mut diags);
    event_refs(spec, &mut diags);
    role_refs(spec, &mut diags);
    diags
}

/// REF-001
fn entity_refs(spec: &Spec, diags: &mut Vec<Diagnostic>) {
    let mut refs: Vec<(String, &str)> = Vec::new();

    for (name, entity) in &spec.entities {
        for (field, def) in &entity.fields {
            if let Some(target) = def.typ.ref_target() {
                refs.push((format!("entities.{}.fields.{}.type", name, field), target));
            }
        }
    }
    for (name, d) in &spec.derived {
        if let Some(entity) = &d.entity {
            refs.push((format!("derived.{}.entity", name), entity));
        }
    }
    for (name, cmd) in &spec.commands {
        for (field, def) in &cmd.input {
            if let Some(target) = def.typ.ref_target() {
                refs.push((format!("commands.{}.input.{}.type", name, field), target));
            }
        }
        for (i, pre) in cmd.pre.iter().enumerate() {
            if let Some(entity) = &pre.entity {
                refs.push((format!("commands.{}.pre[{}].entity", name, i), entity));
            }
        }
        for (i, post) in cmd.post.iter().enumerate() {
            for (kind, target) in post.action.entity_targets() {
                refs.push((
                    format!("commands.{}.post[{}].action.{}", name, i, kind.key()),
                    target,
                ));
            }
        }
    }
    for (name, scenario) in &spec.scenarios {
        for entity in scenario.given_entities() {
            refs.push((format!("scenarios.{}.given", name), entity));
        }
    }
    for (i, inv) in spec.invariants.iter().enumerate() {
        if let Some(entity) = &inv.entity {
            refs.push((format!("invariants[{}].entity", i), entity));
        }
    }
    for (name, sm) in &spec.state_machines {
        if let Some(entity) = &sm.entity {
            refs.push((format!("stateMachines.{}.entity", name), entity));
        }
    }
    for (name, role) in &spec.roles {
        for (i, perm) in role.entity_permissions.iter().enumerate() {
            refs.push((
                format!("roles.{}.entityPermissions[{}].entity", name, i),
                &perm.entity,
            ));
        }
    }
    for (name, event) in &spec.events {
        for (field, def) in &event.payload {
            if let Some(target) = def.typ.ref_target() {
                refs.push((format!("events.{}.payload.{}.type", name, field), target));
            }
        }
    }
    for (name, deadline) in &spec.deadlines {
        if let Some(entity) = &deadline.entity {
            refs.push((format!("deadlines.{}.entity", name), entity));
        }
    }
    for (name, constraint) in &spec.constraints {
        if let Some(entity) = &constraint.entity {
            refs.push((format!("constraints.{}.entity", name), entity));
        }
    }

    for (path, entity) in refs {
        if !spec.entities.contains_key(entity) {
            diags.push(unknown(
                "REF-001",
                "entity",
                path,
                entity,
                spec.entities.keys(),
            ));
        }
    }
}

/// REF-002
fn function_refs(spec: &Spec, diags: &mut Vec<Diagnostic>) {
    let mut refs: Vec<(String, &str)> = Vec::new();

    for (name, scenario) in &spec.scenarios {
        if let Some(call) = scenario.called_function() {
            refs.push((format!("scenarios.{}.when.call", name), call));
        }
    }
    for (name, event) in &spec.events {
        for (i, f) in event.emitted_by.iter().enumerate() {
            refs.push((format!("events.{}.emittedBy[{}]", name, i), f));
        }
    }
    for (name, sub) in &spec.subscriptions {
        refs.push((format!("subscriptions.{}.handler", name), &sub.handler));
    }
    for (name, saga) in &spec.sagas {
        for (i, step) in saga.steps.iter().enumerate() {
            refs.push((format!("sagas.{}.steps[{}].action", name, i), &step.action));
            if let Some(comp) = &step.compensation {
                refs.push((format!("sagas.{}.steps[{}].compensation", name, i), comp));
            }
        }
    }
    for (name, schedule) in &spec.schedules {
        refs.push((format!("schedules.{}.action", name), &schedule.action));
    }
    for (name, deadline) in &spec.deadlines {
        if let Some(action) = deadline.on_expire.as_ref().and_then(|o| o.action.as_deref()) {
            refs.push((format!("deadlines.{}.onExpire.action", name), action));
        }
    }

    for (path, function) in refs {
        if !spec.commands.contains_key(function) {
            diags.push(unknown(
                "REF-002",
                "function",
                path,
                function,
                spec.commands.keys(),
            ));
        }
    }
}

/// REF-003
fn event_refs(spec: &Spec, diags: &mut Vec<Diagnostic>) {
    let mut refs: Vec<(String, &str)> = Vec::new();

    for (name, sub) in &spec.subscriptions {
        refs.push((format!("subscriptions.{}.event", name), &sub.event));
    }
    for (name, deadline) in &spec.deadlines {
        if let Some(event) = deadline.on_expire.as_ref().and_then(|o| o.event.as_deref()) {
            refs.push((format!("deadlines.{}.onExpire.event", name), event));
        }
    }
    for (name, cmd) in &spec.commands {
        for (i, post) in cmd.post.iter().enumerate() {
            if let Some(event) = &post.action.emit {
                refs.push((format!("commands.{}.post[{}].action.emit", name, i), event));
            }
        }
    }

    for (path, event) in refs {
        if !spec.events.contains_key(event) {
            diags.push(unknown("REF-003", "event", path, event, spec.events.keys()));
        }
    }
}

/// REF-004, with a patch dropping the dangling parent
fn role_refs(spec: &Spec, diags: &mut Vec<Diagnostic>) {
    for (name, role) in &spec.roles {
        for (i, parent) in role.inherits.iter().enumerate() {
            if spec.roles.contains_key(parent) {
                continue;
            }
            let path = format!("roles.{}.inherits[{}]", name, i);
            diags.push(
                unknown("REF-004", "role", path.clone(), parent, spec.roles.keys())
                    .with_fix(FixPatch::Remove { path }, true),
            );
        }
    }
}
