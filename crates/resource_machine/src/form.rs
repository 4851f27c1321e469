//! Create/edit form shape: guarded save, delete confirmation and the
//! post-save state.

use serde_json::Value;
use shared::{domain::FieldMap, error::ApiError};

use crate::{
    actions::{self, CAN_SAVE},
    builder::{
        self, MachineSpec, CONFIRMING_DELETE, DELETED, DELETING, LOADED, SAVE_ERROR, SAVING,
    },
    context::{Context, SaveBlocked},
    descriptor::{Descriptor, DescriptorPatch, Invoke, StateNode, Transition},
    event,
    service::ServiceKind,
};

pub struct FormSpec {
    pub machine: MachineSpec,
    pub state_after_save: String,
}

impl FormSpec {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            machine: MachineSpec::new(id),
            state_after_save: LOADED.to_string(),
        }
    }

    pub fn initial_state(mut self, state: impl Into<String>) -> Self {
        self.machine.initial_state = Some(state.into());
        self
    }

    pub fn context(mut self, key: impl Into<String>, value: Value) -> Self {
        self.machine.context.insert(key.into(), value);
        self
    }

    pub fn data(self, data: FieldMap) -> Self {
        self.context("data", Value::Object(data))
    }

    pub fn state_after_save(mut self, state: impl Into<String>) -> Self {
        self.state_after_save = state.into();
        self
    }

    pub fn config<F>(mut self, config: F) -> Self
    where
        F: FnOnce(&Descriptor) -> DescriptorPatch + Send + 'static,
    {
        self.machine.config = Some(Box::new(config));
        self
    }
}

fn update() -> Transition {
    Transition::internal().actions([
        actions::ASSIGN_FIELD,
        actions::VALIDATE,
        actions::CLEAR_SAVE_BLOCKED,
    ])
}

fn cancel_actions() -> [&'static str; 3] {
    [
        actions::RESET_TO_PRISTINE,
        actions::VALIDATE,
        actions::CLEAR_SAVE_BLOCKED,
    ]
}

fn blur() -> Transition {
    Transition::internal().action(actions::MARK_TOUCHED)
}

/// Builds the form descriptor:
///
/// ```text
/// loading --done--> loaded --SAVE[canSave]--> saving --done--> <state_after_save>
///    |                 |  \--SAVE (blocked, reason noted)         \--error--> saveError --UPDATE/CANCEL--> loaded
///    \--error--> loadError --RETRY--> loading
///                 loaded --DELETE--> confirmingDelete --CONFIRM_DELETE--> deleting --done--> deleted
///                                                                           \--error--> loaded
/// ```
pub fn build_form_machine(spec: FormSpec) -> Descriptor {
    let FormSpec {
        machine,
        state_after_save,
    } = spec;

    let on_done = vec![Transition::to(LOADED).actions([actions::ASSIGN_LOADED, actions::VALIDATE])];
    let mut descriptor = builder::loading_skeleton(&machine.id, on_done);

    let loaded = StateNode::new()
        .on(event::UPDATE, update())
        .on(event::BLUR, blur())
        .on(
            event::SAVE,
            Transition::to(SAVING)
                .guard(CAN_SAVE)
                .actions([actions::MARK_SUBMITTED, actions::CLEAR_SAVE_BLOCKED]),
        )
        .on(
            event::SAVE,
            Transition::internal().actions([actions::MARK_SUBMITTED, actions::NOTE_SAVE_BLOCKED]),
        )
        .on(event::CANCEL, Transition::internal().actions(cancel_actions()))
        .on(
            event::CLEAR_SAVE_ERROR,
            Transition::internal().action(actions::CLEAR_SAVE_ERROR),
        )
        .on(event::DELETE, Transition::to(CONFIRMING_DELETE))
        .on(event::CONFIRM_DELETE, Transition::to(DELETING));

    let saving = StateNode::new().invoke(
        Invoke::new(ServiceKind::Save)
            .on_done(Transition::to(state_after_save.as_str()).actions([
                actions::COMMIT_PRISTINE,
                actions::ASSIGN_RESPONSE,
                actions::CLEAR_SAVE_ERROR,
            ]))
            .on_error(Transition::to(SAVE_ERROR).action(actions::ASSIGN_SAVE_ERROR)),
    );

    let save_error = StateNode::new()
        .on(
            event::UPDATE,
            Transition::to(LOADED).actions([
                actions::ASSIGN_FIELD,
                actions::VALIDATE,
                actions::CLEAR_SAVE_BLOCKED,
            ]),
        )
        .on(event::BLUR, blur())
        .on(event::CANCEL, Transition::to(LOADED).actions(cancel_actions()))
        .on(
            event::CLEAR_SAVE_ERROR,
            Transition::to(LOADED).action(actions::CLEAR_SAVE_ERROR),
        )
        .on(event::DELETE, Transition::to(CONFIRMING_DELETE))
        .on(event::CONFIRM_DELETE, Transition::to(DELETING));

    let confirming_delete = StateNode::new()
        .on(event::CONFIRM_DELETE, Transition::to(DELETING))
        .on(event::CANCEL, Transition::to(LOADED));

    let deleting = StateNode::new().invoke(
        Invoke::new(ServiceKind::Delete)
            .on_done(Transition::to(DELETED))
            .on_error(Transition::to(LOADED).action(actions::ASSIGN_DELETE_ERROR)),
    );

    descriptor = descriptor
        .state(LOADED, loaded)
        .state(SAVING, saving)
        .state(SAVE_ERROR, save_error)
        .state(CONFIRMING_DELETE, confirming_delete)
        .state(DELETING, deleting)
        .state(DELETED, StateNode::terminal());

    if !descriptor.states.contains_key(&state_after_save) {
        descriptor = descriptor.state(state_after_save, StateNode::terminal());
    }

    builder::finish(descriptor, machine)
}

pub fn can_save(ctx: &Context) -> bool {
    !ctx.validation_errors.has_errors() && !ctx.is_pristine()
}

/// Validation problems win over "nothing changed".
pub fn save_blocked_reason(ctx: &Context) -> Option<SaveBlocked> {
    if ctx.validation_errors.has_errors() {
        Some(SaveBlocked::Invalid)
    } else if ctx.is_pristine() {
        Some(SaveBlocked::NoChanges)
    } else {
        None
    }
}

pub(crate) fn assign_loaded(ctx: &mut Context, record: FieldMap) {
    ctx.pristine_data = record.clone();
    ctx.data = record;
    ctx.load_error = None;
}

pub(crate) fn assign_save_error(ctx: &mut Context, error: &ApiError) {
    ctx.save_error = Some(error.message.clone());
    ctx.save_errors = error
        .field_errors
        .iter()
        .map(|(field, message)| (field.as_str(), message.as_str()))
        .collect();
}

pub(crate) fn clear_save_error(ctx: &mut Context) {
    ctx.save_error = None;
    ctx.save_errors = Default::default();
    ctx.delete_error = None;
}

pub(crate) fn reset_to_pristine(ctx: &mut Context) {
    ctx.data = ctx.pristine_data.clone();
    ctx.is_touched.clear();
    ctx.show_validation_errors = false;
}

#[cfg(test)]
#[path = "tests/form_tests.rs"]
mod tests;
