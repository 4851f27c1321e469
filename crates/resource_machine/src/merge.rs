//! Deep merge of a [`DescriptorPatch`] into a [`Descriptor`].
//!
//! Rules:
//! - states merge key by key; states only named by the patch are added;
//! - `entry` actions concatenate, skeleton first;
//! - `on` maps merge per event name, and within one event the candidate
//!   lists merge with [`merge_candidates`];
//! - `invoke.on_done` / `invoke.on_error` merge the same way;
//! - context defaults are an object union where patch keys win;
//! - `initial`, `delays` and `terminal` change only where the patch says so.
//!
//! A patch can therefore add behaviour to a skeleton handler but never drop
//! it by accident. Removing skeleton behaviour needs an explicit edit of the
//! descriptor.

use tracing::debug;

use crate::descriptor::{
    Descriptor, DescriptorPatch, Invoke, InvokePatch, StateNode, StatePatch, Transition,
};

impl Descriptor {
    pub fn merge(mut self, patch: DescriptorPatch) -> Self {
        if let Some(initial) = patch.initial {
            self.initial = initial;
        }
        self.context.extend(patch.context);
        self.delays.extend(patch.delays);

        for (name, state_patch) in patch.states {
            let node = self.states.remove(&name).unwrap_or_default();
            debug!(machine = %self.id, state = %name, "merging state patch");
            self.states.insert(name, merge_state(node, state_patch));
        }
        self
    }
}

fn merge_state(mut node: StateNode, patch: StatePatch) -> StateNode {
    node.entry.extend(patch.entry);
    for (event, candidates) in patch.on {
        let existing = node.on.entry(event).or_default();
        merge_candidates(existing, candidates);
    }
    if let Some(invoke_patch) = patch.invoke {
        node.invoke = merge_invoke(node.invoke, invoke_patch);
    }
    if let Some(terminal) = patch.terminal {
        node.terminal = terminal;
    }
    node
}

fn merge_invoke(existing: Option<Invoke>, patch: InvokePatch) -> Option<Invoke> {
    let mut invoke = match (existing, patch.service) {
        (Some(mut invoke), service) => {
            if let Some(service) = service {
                invoke.service = service;
            }
            invoke
        }
        (None, Some(service)) => Invoke::new(service),
        // Outcome handlers without a service have nothing to attach to.
        (None, None) => return None,
    };
    merge_candidates(&mut invoke.on_done, patch.on_done);
    merge_candidates(&mut invoke.on_error, patch.on_error);
    Some(invoke)
}

/// Merges patch candidates into an existing candidate list.
///
/// A patch candidate with the same guard as an existing one (both unguarded
/// included) extends it: its actions run after the existing ones and its
/// target, when present, replaces the existing target. A candidate with a
/// guard not seen before is inserted ahead of the first unguarded candidate so
/// the fallback keeps catching whatever the guards reject.
pub fn merge_candidates(existing: &mut Vec<Transition>, patch: Vec<Transition>) {
    for candidate in patch {
        if let Some(current) = existing.iter_mut().find(|t| t.guard == candidate.guard) {
            if candidate.target.is_some() {
                current.target = candidate.target;
            }
            current.actions.extend(candidate.actions);
            continue;
        }

        let fallback = existing.iter().position(|t| t.guard.is_none());
        match (fallback, candidate.guard.is_some()) {
            (Some(index), true) => existing.insert(index, candidate),
            _ => existing.push(candidate),
        }
    }
}

#[cfg(test)]
#[path = "tests/merge_tests.rs"]
mod tests;
