//! Synchronous reducer: `(state, event) -> (state', effects)`.
//!
//! A [`Machine`] never performs I/O or waits. Service calls and delayed sends
//! come back as [`Effect`]s for the caller (usually the
//! [`Interpreter`](crate::Interpreter)) to carry out; their outcomes re-enter
//! the machine as events.

use std::{collections::HashMap, fmt, sync::Arc, time::Duration};

use serde::Serialize;
use serde_json::Value;
use shared::domain::{FieldErrors, FieldMap, MachineId};
use tracing::{debug, warn};

use crate::{
    actions::{ActionEnv, Builtin, BuiltinGuard},
    builder::{DELETING, LOADING, SAVING},
    context::Context,
    descriptor::{Descriptor, Transition},
    error::EngineError,
    event::Event,
    service::{ResourceService, ServiceKind},
    validation::ValidateFn,
};

pub type ActionFn = Arc<dyn Fn(&mut Context, &Event) + Send + Sync>;
pub type GuardFn = Arc<dyn Fn(&Context, &Event) -> bool + Send + Sync>;

#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Run `service` against the context captured on state entry.
    Invoke {
        service: ServiceKind,
        invocation: u64,
        context: Box<Context>,
    },
    /// Deliver `event` after `delay`, replacing any pending send with the same id.
    SendAfter {
        id: String,
        event: Event,
        delay: Duration,
    },
    CancelDelayed { id: String },
}

/// Outcome of feeding one event to a machine.
#[derive(Debug, Clone, PartialEq)]
pub struct Step {
    pub from: String,
    pub to: String,
    /// False when no handler accepted the event.
    pub handled: bool,
    pub effects: Vec<Effect>,
}

impl Step {
    fn ignored(state: &str) -> Self {
        Self {
            from: state.to_string(),
            to: state.to_string(),
            handled: false,
            effects: Vec::new(),
        }
    }

    pub fn changed_state(&self) -> bool {
        self.from != self.to
    }
}

/// What hosts render from: the current state name plus context.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Snapshot {
    pub machine: String,
    pub state: String,
    pub context: Context,
}

impl Snapshot {
    pub fn matches(&self, state: &str) -> bool {
        self.state == state
    }

    /// A service call is in flight.
    pub fn is_busy(&self) -> bool {
        matches!(self.state.as_str(), LOADING | SAVING | DELETING)
    }

    /// Submit and delete controls must be disabled.
    pub fn controls_disabled(&self) -> bool {
        matches!(self.state.as_str(), SAVING | DELETING)
    }

    pub fn show_pagination(&self) -> bool {
        self.state != LOADING && self.context.page_count() > 1
    }
}

/// Concrete code bound to a descriptor's symbolic names.
pub struct Implementation {
    service: Arc<dyn ResourceService>,
    validate: Option<ValidateFn>,
    actions: HashMap<String, ActionFn>,
    guards: HashMap<String, GuardFn>,
}

impl Implementation {
    pub fn new(service: Arc<dyn ResourceService>) -> Self {
        Self {
            service,
            validate: None,
            actions: HashMap::new(),
            guards: HashMap::new(),
        }
    }

    pub fn validate<F>(mut self, validate: F) -> Self
    where
        F: Fn(&FieldMap) -> FieldErrors + Send + Sync + 'static,
    {
        self.validate = Some(Arc::new(validate));
        self
    }

    pub fn validator(mut self, validate: ValidateFn) -> Self {
        self.validate = Some(validate);
        self
    }

    pub fn action<F>(mut self, name: impl Into<String>, action: F) -> Self
    where
        F: Fn(&mut Context, &Event) + Send + Sync + 'static,
    {
        self.actions.insert(name.into(), Arc::new(action));
        self
    }

    pub fn guard<F>(mut self, name: impl Into<String>, guard: F) -> Self
    where
        F: Fn(&Context, &Event) -> bool + Send + Sync + 'static,
    {
        self.guards.insert(name.into(), Arc::new(guard));
        self
    }
}

enum BoundAction {
    Builtin(Builtin),
    Custom(ActionFn),
}

enum BoundGuard {
    Builtin(BuiltinGuard),
    Custom(GuardFn),
}

pub struct Machine {
    id: MachineId,
    descriptor: Descriptor,
    state: String,
    context: Context,
    actions: HashMap<String, BoundAction>,
    guards: HashMap<String, BoundGuard>,
    validate: Option<ValidateFn>,
    service: Arc<dyn ResourceService>,
    started: bool,
    next_invocation: u64,
    active_invocation: Option<u64>,
}

impl fmt::Debug for Machine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Machine")
            .field("id", &self.id)
            .field("machine", &self.descriptor.id)
            .field("state", &self.state)
            .field("active_invocation", &self.active_invocation)
            .finish_non_exhaustive()
    }
}

impl Machine {
    /// Resolves every action, guard and target named by `descriptor` and
    /// builds the initial context. Anything unresolved is reported here rather
    /// than when the first event arrives.
    pub fn new(descriptor: Descriptor, implementation: Implementation) -> Result<Self, EngineError> {
        let machine = descriptor.id.clone();
        if !descriptor.states.contains_key(&descriptor.initial) {
            return Err(EngineError::UnknownInitialState {
                machine,
                state: descriptor.initial.clone(),
            });
        }

        let Implementation {
            service,
            validate,
            actions: custom_actions,
            guards: custom_guards,
        } = implementation;

        let mut actions = HashMap::new();
        let mut guards = HashMap::new();
        for (state, node) in &descriptor.states {
            for transition in node.candidates() {
                if let Some(target) = &transition.target {
                    if !descriptor.states.contains_key(target) {
                        return Err(EngineError::UnknownTarget {
                            machine,
                            from: state.clone(),
                            target: target.clone(),
                        });
                    }
                }
                if let Some(guard) = &transition.guard {
                    let bound = match custom_guards.get(guard) {
                        Some(custom) => BoundGuard::Custom(Arc::clone(custom)),
                        None => BuiltinGuard::from_name(guard).map(BoundGuard::Builtin).ok_or_else(
                            || EngineError::MissingGuard {
                                machine: machine.clone(),
                                state: state.clone(),
                                guard: guard.clone(),
                            },
                        )?,
                    };
                    guards.insert(guard.clone(), bound);
                }
            }

            for action in node.referenced_actions() {
                if actions.contains_key(action) {
                    continue;
                }
                let bound = match (custom_actions.get(action), Builtin::from_name(action)) {
                    (Some(custom), _) => BoundAction::Custom(Arc::clone(custom)),
                    (None, Some(Builtin::Validate)) if validate.is_none() => {
                        return Err(EngineError::MissingAction {
                            machine,
                            state: state.clone(),
                            action: action.to_string(),
                        });
                    }
                    (None, Some(builtin)) => BoundAction::Builtin(builtin),
                    (None, None) => {
                        return Err(EngineError::MissingAction {
                            machine,
                            state: state.clone(),
                            action: action.to_string(),
                        });
                    }
                };
                actions.insert(action.to_string(), bound);
            }
        }

        let context: Context = serde_json::from_value(Value::Object(descriptor.context.clone()))
            .map_err(|source| EngineError::InvalidContext {
                machine: machine.clone(),
                source,
            })?;

        Ok(Self {
            id: MachineId::new(),
            state: descriptor.initial.clone(),
            descriptor,
            context,
            actions,
            guards,
            validate,
            service,
            started: false,
            next_invocation: 0,
            active_invocation: None,
        })
    }

    pub fn id(&self) -> MachineId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.descriptor.id
    }

    pub fn state(&self) -> &str {
        &self.state
    }

    pub fn context(&self) -> &Context {
        &self.context
    }

    pub fn descriptor(&self) -> &Descriptor {
        &self.descriptor
    }

    pub fn service(&self) -> Arc<dyn ResourceService> {
        Arc::clone(&self.service)
    }

    pub fn is_terminal(&self) -> bool {
        self.descriptor
            .states
            .get(&self.state)
            .is_some_and(|node| node.terminal)
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            machine: self.descriptor.id.clone(),
            state: self.state.clone(),
            context: self.context.clone(),
        }
    }

    /// Enters the initial state. Calling it again is a no-op.
    pub fn start(&mut self) -> Step {
        if self.started {
            return Step::ignored(&self.state);
        }
        self.started = true;

        let initial = self.descriptor.initial.clone();
        let init = Event::Custom {
            name: "init".to_string(),
            payload: Value::Null,
        };
        let mut effects = Vec::new();
        self.enter(&initial, &init, &mut effects);
        Step {
            from: initial.clone(),
            to: initial,
            handled: true,
            effects,
        }
    }

    pub fn transition(&mut self, event: Event) -> Step {
        let from = self.state.clone();
        let Some(node) = self.descriptor.states.get(&from) else {
            return Step::ignored(&from);
        };
        if node.terminal {
            debug!(machine = %self.descriptor.id, state = %from, event = %event.name(), "event ignored in terminal state");
            return Step::ignored(&from);
        }

        let candidates: Vec<Transition> = match event.invocation() {
            Some(invocation) => {
                if self.active_invocation != Some(invocation) {
                    debug!(
                        machine = %self.descriptor.id,
                        id = %self.id,
                        invocation,
                        "dropping result of superseded service call"
                    );
                    return Step::ignored(&from);
                }
                let Some(invoke) = &node.invoke else {
                    return Step::ignored(&from);
                };
                if let Event::Failed { error, .. } = &event {
                    warn!(
                        machine = %self.descriptor.id,
                        id = %self.id,
                        service = %invoke.service,
                        code = ?error.code,
                        "service call rejected: {}",
                        error.message
                    );
                }
                match &event {
                    Event::Done { .. } => invoke.on_done.clone(),
                    _ => invoke.on_error.clone(),
                }
            }
            None => node.on.get(event.name().as_ref()).cloned().unwrap_or_default(),
        };

        let Some(chosen) = candidates
            .into_iter()
            .find(|candidate| self.guard_passes(candidate, &event))
        else {
            debug!(machine = %self.descriptor.id, state = %from, event = %event.name(), "no transition accepted event");
            return Step::ignored(&from);
        };

        if event.invocation().is_some() {
            self.active_invocation = None;
        }

        let mut step = Step {
            from: from.clone(),
            to: from.clone(),
            handled: true,
            effects: Vec::new(),
        };
        self.run_actions(&chosen.actions, &event, &mut step.effects);

        if let Some(target) = chosen.target {
            self.active_invocation = None;
            self.enter(&target, &event, &mut step.effects);
            debug!(
                machine = %self.descriptor.id,
                id = %self.id,
                from = %from,
                to = %target,
                event = %event.name(),
                "transition"
            );
            step.to = target;
        }
        step
    }

    fn enter(&mut self, target: &str, event: &Event, effects: &mut Vec<Effect>) {
        self.state = target.to_string();
        let Some(node) = self.descriptor.states.get(target) else {
            return;
        };
        let entry = node.entry.clone();
        let service = node.invoke.as_ref().map(|invoke| invoke.service);

        self.run_actions(&entry, event, effects);
        if let Some(service) = service {
            self.next_invocation += 1;
            self.active_invocation = Some(self.next_invocation);
            effects.push(Effect::Invoke {
                service,
                invocation: self.next_invocation,
                context: Box::new(self.context.clone()),
            });
        }
    }

    fn guard_passes(&self, transition: &Transition, event: &Event) -> bool {
        let Some(name) = &transition.guard else {
            return true;
        };
        match self.guards.get(name) {
            Some(BoundGuard::Builtin(guard)) => guard.check(&self.context, event),
            Some(BoundGuard::Custom(guard)) => guard(&self.context, event),
            None => false,
        }
    }

    fn run_actions(&mut self, names: &[String], event: &Event, effects: &mut Vec<Effect>) {
        let env = ActionEnv {
            validate: self.validate.as_ref(),
            delays: &self.descriptor.delays,
        };
        for name in names {
            match self.actions.get(name) {
                Some(BoundAction::Builtin(builtin)) => {
                    builtin.apply(&mut self.context, event, &env, effects);
                }
                Some(BoundAction::Custom(action)) => action(&mut self.context, event),
                None => debug!(action = %name, "unbound action skipped"),
            }
        }
    }
}

#[cfg(test)]
#[path = "tests/machine_tests.rs"]
mod tests;
