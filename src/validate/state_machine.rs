//! State machine checks: declared states, reachability, dead ends and
//! conflicting transitions

use super::{Category, Diagnostic, FixPatch};
use crate::spec::{Spec, StateMachine};
use std::collections::{BTreeMap, BTreeSet};

/// States reachable from `initial` by following transitions. Empty when the
/// machine has no initial state.
pub fn reachable_states(sm: &StateMachine) -> BTreeSet<&str> {
    let mut reachable = BTreeSet::new();
    let Some(initial) = sm.initial.as_deref() else {
        return reachable;
    };
    reachable.insert(initial);

    let mut changed = true;
    while changed {
        changed = false;
        for t in &sm.transitions {
            if reachable.contains(t.from.as_str()) && reachable.insert(t.to.as_str()) {
                changed = true;
            }
        }
    }

    reachable
}

/// FSM-001..004 and VAL-003
pub(super) fn check(spec: &Spec) -> Vec<Diagnostic> {
    let mut diags = Vec::new();

    for (name, sm) in &spec.state_machines {
        let base = format!("stateMachines.{}", name);
        let state_names: Vec<&str> = sm.states.keys().map(String::as_str).collect();

        let initial_ok = match sm.initial.as_deref() {
            None => {
                diags.push(
                    Diagnostic::error(
                        "FSM-001",
                        Category::Logic,
                        format!("{}.initial", base),
                        format!("State machine '{}' has no initial state", name),
                    )
                    .with_options(state_names.iter().copied()),
                );
                false
            }
            Some(initial) if !sm.states.contains_key(initial) => {
                diags.push(
                    Diagnostic::error(
                        "FSM-001",
                        Category::Reference,
                        format!("{}.initial", base),
                        format!("Initial state '{}' is not declared", initial),
                    )
                    .with_actual(initial)
                    .with_options(state_names.iter().copied()),
                );
                false
            }
            Some(_) => true,
        };

        for (i, t) in sm.transitions.iter().enumerate() {
            let path = format!("{}.transitions[{}]", base, i);

            for (end, state) in [("from", &t.from), ("to", &t.to)] {
                if !sm.states.contains_key(state) {
                    diags.push(
                        Diagnostic::error(
                            "FSM-002",
                            Category::Reference,
                            format!("{}.{}", path, end),
                            format!("Transition {} state '{}' is not declared", end, state),
                        )
                        .with_actual(state.as_str())
                        .with_options(state_names.iter().copied()),
                    );
                }
            }

            if let Some(trigger) = t.trigger() {
                if !spec.commands.contains_key(trigger) && !spec.events.contains_key(trigger) {
                    diags.push(
                        Diagnostic::error(
                            "VAL-003",
                            Category::Reference,
                            path,
                            format!(
                                "Transition trigger '{}' is neither a function nor an event",
                                trigger
                            ),
                        )
                        .with_actual(trigger),
                    );
                }
            }
        }

        // Reachability is meaningless without a valid starting point
        if initial_ok {
            let reachable = reachable_states(sm);
            for state in sm.states.keys() {
                if !reachable.contains(state.as_str()) {
                    diags.push(Diagnostic::warning(
                        "FSM-003",
                        Category::Logic,
                        format!("{}.states.{}", base, state),
                        format!("State '{}' is unreachable from the initial state", state),
                    ));
                }
            }
        }

        let sources: BTreeSet<&str> = sm.transitions.iter().map(|t| t.from.as_str()).collect();
        for (state, def) in &sm.states {
            if def.is_final || sources.contains(state.as_str()) {
                continue;
            }
            let path = format!("{}.states.{}", base, state);
            diags.push(
                Diagnostic::warning(
                    "FSM-004",
                    Category::Logic,
                    path.clone(),
                    format!(
                        "State '{}' has no outgoing transitions and is not final",
                        state
                    ),
                )
                .with_fix(
                    FixPatch::Add {
                        path: format!("{}.final", path),
                        value: serde_json::Value::Bool(true),
                    },
                    false,
                ),
            );
        }
    }

    diags
}

/// TRANS-001: several transitions leave the same state on the same trigger
/// and at least one of them is unguarded. Fully guarded groups pass since
/// guard exclusivity cannot be decided statically.
pub(super) fn transition_conflicts(spec: &Spec) -> Vec<Diagnostic> {
    let mut diags = Vec::new();

    for (name, sm) in &spec.state_machines {
        let mut groups: BTreeMap<(&str, Option<&str>), Vec<usize>> = BTreeMap::new();
        for (i, t) in sm.transitions.iter().enumerate() {
            groups.entry((t.from.as_str(), t.trigger())).or_default().push(i);
        }

        for ((from, trigger), members) in groups {
            if members.len() < 2 {
                continue;
            }
            let guarded = members
                .iter()
                .filter(|&&i| sm.transitions[i].guard.is_some())
                .count();
            if guarded == members.len() {
                continue;
            }

            diags.push(
                Diagnostic::error(
                    "TRANS-001",
                    Category::Logic,
                    format!("stateMachines.{}.transitions[{}]", name, members[0]),
                    format!(
                        "Conflicting transitions from '{}' on '{}'",
                        from,
                        trigger.unwrap_or("<none>")
                    ),
                )
                .with_expected("mutually exclusive guards or single transition")
                .with_actual(format!("{} transitions, {} guarded", members.len(), guarded)),
            );
        }
    }

    diags
}
