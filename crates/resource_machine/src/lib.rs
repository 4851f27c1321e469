//! Resource lifecycle engine for admin console pages.
//!
//! A page describes its form or list as a [`Descriptor`] (usually built with
//! [`build_form_machine`] or [`build_list_machine`] and adjusted through a
//! config patch), binds code to it with [`Descriptor::with_config`], and runs
//! the resulting [`Machine`] on an [`Interpreter`]. The host reads
//! [`Snapshot`]s and sends [`Event`]s; loading, saving, deleting, validation,
//! dirty tracking, debounced filtering, sorting and paging happen here.

pub mod actions;
pub mod builder;
pub mod context;
pub mod descriptor;
pub mod error;
pub mod event;
pub mod form;
pub mod interpreter;
pub mod list;
pub mod machine;
mod merge;
pub mod service;
pub mod validation;

pub use context::{Context, SaveBlocked};
pub use descriptor::{Descriptor, DescriptorPatch, Invoke, StateNode, StatePatch, Transition};
pub use error::EngineError;
pub use event::Event;
pub use form::{build_form_machine, FormSpec};
pub use interpreter::{Interpreter, MachineHandle};
pub use list::{build_list_machine, ListSpec};
pub use machine::{Effect, Implementation, Machine, Snapshot, Step};
pub use merge::merge_candidates;
pub use service::{service_fn, FnService, Fetched, LocalDefaults, ResourceService, ServiceKind, ServiceOutput};
