//! Declarative description of a machine: states, per-event candidate
//! transitions, service invocations and context defaults.
//!
//! Actions and guards are referenced by name and bound to code when the
//! descriptor is turned into a [`Machine`](crate::Machine) through
//! [`Descriptor::with_config`].

use std::{collections::BTreeMap, time::Duration};

use shared::domain::FieldMap;

use crate::{
    error::EngineError,
    machine::{Implementation, Machine},
    service::ServiceKind,
};

/// One candidate for handling an event in a state.
///
/// A candidate without a target is an internal transition: its actions run
/// and the machine stays put without re-entering the state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Transition {
    pub target: Option<String>,
    pub guard: Option<String>,
    pub actions: Vec<String>,
}

impl Transition {
    pub fn to(target: impl Into<String>) -> Self {
        Self {
            target: Some(target.into()),
            ..Self::default()
        }
    }

    pub fn internal() -> Self {
        Self::default()
    }

    pub fn guard(mut self, guard: impl Into<String>) -> Self {
        self.guard = Some(guard.into());
        self
    }

    pub fn action(mut self, action: impl Into<String>) -> Self {
        self.actions.push(action.into());
        self
    }

    pub fn actions<I, S>(mut self, actions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.actions.extend(actions.into_iter().map(Into::into));
        self
    }
}

/// Service call started on every entry to a state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invoke {
    pub service: ServiceKind,
    pub on_done: Vec<Transition>,
    pub on_error: Vec<Transition>,
}

impl Invoke {
    pub fn new(service: ServiceKind) -> Self {
        Self {
            service,
            on_done: Vec::new(),
            on_error: Vec::new(),
        }
    }

    pub fn on_done(mut self, transition: Transition) -> Self {
        self.on_done.push(transition);
        self
    }

    pub fn on_error(mut self, transition: Transition) -> Self {
        self.on_error.push(transition);
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StateNode {
    pub entry: Vec<String>,
    pub on: BTreeMap<String, Vec<Transition>>,
    pub invoke: Option<Invoke>,
    pub terminal: bool,
}

impl StateNode {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn terminal() -> Self {
        Self {
            terminal: true,
            ..Self::default()
        }
    }

    pub fn on(mut self, event: impl Into<String>, transition: Transition) -> Self {
        self.on.entry(event.into()).or_default().push(transition);
        self
    }

    pub fn entry(mut self, action: impl Into<String>) -> Self {
        self.entry.push(action.into());
        self
    }

    pub fn invoke(mut self, invoke: Invoke) -> Self {
        self.invoke = Some(invoke);
        self
    }

    pub(crate) fn referenced_actions(&self) -> impl Iterator<Item = &str> {
        self.entry
            .iter()
            .chain(self.candidates().flat_map(|t| t.actions.iter()))
            .map(String::as_str)
    }

    pub(crate) fn candidates(&self) -> impl Iterator<Item = &Transition> {
        let invoke = self
            .invoke
            .iter()
            .flat_map(|i| i.on_done.iter().chain(i.on_error.iter()));
        self.on.values().flatten().chain(invoke)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Descriptor {
    pub id: String,
    pub initial: String,
    pub states: BTreeMap<String, StateNode>,
    pub context: FieldMap,
    pub delays: BTreeMap<String, Duration>,
}

impl Descriptor {
    pub fn new(id: impl Into<String>, initial: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            initial: initial.into(),
            states: BTreeMap::new(),
            context: FieldMap::new(),
            delays: BTreeMap::new(),
        }
    }

    pub fn state(mut self, name: impl Into<String>, node: StateNode) -> Self {
        self.states.insert(name.into(), node);
        self
    }

    pub fn delay(mut self, id: impl Into<String>, delay: Duration) -> Self {
        self.delays.insert(id.into(), delay);
        self
    }

    pub fn handlers(&self, state: &str, event: &str) -> &[Transition] {
        self.states
            .get(state)
            .and_then(|node| node.on.get(event))
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Binds actions, guards, validation and services, producing a machine
    /// ready to start. Every name the descriptor references must resolve here.
    pub fn with_config(self, implementation: Implementation) -> Result<Machine, EngineError> {
        Machine::new(self, implementation)
    }
}

/// Partial descriptor combined into a skeleton by [`Descriptor::merge`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DescriptorPatch {
    pub initial: Option<String>,
    pub states: BTreeMap<String, StatePatch>,
    pub context: FieldMap,
    pub delays: BTreeMap<String, Duration>,
}

impl DescriptorPatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn initial(mut self, state: impl Into<String>) -> Self {
        self.initial = Some(state.into());
        self
    }

    pub fn state(mut self, name: impl Into<String>, patch: StatePatch) -> Self {
        self.states.insert(name.into(), patch);
        self
    }

    pub fn context(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.context.insert(key.into(), value);
        self
    }

    pub fn delay(mut self, id: impl Into<String>, delay: Duration) -> Self {
        self.delays.insert(id.into(), delay);
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatePatch {
    pub entry: Vec<String>,
    pub on: BTreeMap<String, Vec<Transition>>,
    pub invoke: Option<InvokePatch>,
    pub terminal: Option<bool>,
}

impl StatePatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(mut self, event: impl Into<String>, transition: Transition) -> Self {
        self.on.entry(event.into()).or_default().push(transition);
        self
    }

    pub fn entry(mut self, action: impl Into<String>) -> Self {
        self.entry.push(action.into());
        self
    }

    pub fn terminal(mut self, terminal: bool) -> Self {
        self.terminal = Some(terminal);
        self
    }

    pub fn on_done(mut self, transition: Transition) -> Self {
        self.invoke
            .get_or_insert_with(InvokePatch::default)
            .on_done
            .push(transition);
        self
    }

    pub fn on_error(mut self, transition: Transition) -> Self {
        self.invoke
            .get_or_insert_with(InvokePatch::default)
            .on_error
            .push(transition);
        self
    }

    pub fn invoke(mut self, service: ServiceKind) -> Self {
        self.invoke.get_or_insert_with(InvokePatch::default).service = Some(service);
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InvokePatch {
    pub service: Option<ServiceKind>,
    pub on_done: Vec<Transition>,
    pub on_error: Vec<Transition>,
}
