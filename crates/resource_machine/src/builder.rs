//! Shared skeleton assembly for the form and list shapes.

use serde_json::Value;
use shared::domain::FieldMap;

use crate::{
    actions,
    context::Context,
    descriptor::{Descriptor, DescriptorPatch, Invoke, StateNode, Transition},
    event,
    service::ServiceKind,
};

pub const LOADING: &str = "loading";
pub const LOADED: &str = "loaded";
pub const LOAD_ERROR: &str = "loadError";
pub const SAVING: &str = "saving";
pub const SAVE_ERROR: &str = "saveError";
pub const CONFIRMING_DELETE: &str = "confirmingDelete";
pub const DELETING: &str = "deleting";
pub const DELETED: &str = "deleted";

/// Callback receiving the finished skeleton and returning the page's patch.
pub type ConfigFn = Box<dyn FnOnce(&Descriptor) -> DescriptorPatch + Send>;

/// Settings common to every machine shape.
pub struct MachineSpec {
    pub id: String,
    pub initial_state: Option<String>,
    pub context: FieldMap,
    pub config: Option<ConfigFn>,
}

impl MachineSpec {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            initial_state: None,
            context: FieldMap::new(),
            config: None,
        }
    }
}

/// Context keys every machine starts from.
pub(crate) fn default_context() -> FieldMap {
    match serde_json::to_value(Context::default()) {
        Ok(Value::Object(map)) => map,
        _ => FieldMap::new(),
    }
}

/// `loading` with its fetch invocation plus `loadError` with `RETRY`.
pub(crate) fn loading_skeleton(id: &str, on_done: Vec<Transition>) -> Descriptor {
    let mut fetch = Invoke::new(ServiceKind::Fetch).on_error(
        Transition::to(LOAD_ERROR).action(actions::ASSIGN_LOAD_ERROR),
    );
    fetch.on_done = on_done;

    let mut descriptor = Descriptor::new(id, LOADING)
        .state(LOADING, StateNode::new().invoke(fetch))
        .state(
            LOAD_ERROR,
            StateNode::new().on(
                event::RETRY,
                Transition::to(LOADING).action(actions::CLEAR_LOAD_ERROR),
            ),
        );
    descriptor.context = default_context();
    descriptor
}

/// Applies the caller's context defaults, initial state and config patch.
pub(crate) fn finish(mut descriptor: Descriptor, spec: MachineSpec) -> Descriptor {
    descriptor.context.extend(spec.context);
    if let Some(initial) = spec.initial_state {
        descriptor.initial = initial;
    }
    match spec.config {
        Some(config) => {
            let patch = config(&descriptor);
            descriptor.merge(patch)
        }
        None => descriptor,
    }
}
