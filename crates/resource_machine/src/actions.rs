//! Built-in actions and guards the form and list skeletons reference by name.
//!
//! Pages may register an action or guard under one of these names to replace
//! the built-in behaviour.

use std::{collections::BTreeMap, time::Duration};

use tracing::debug;

use crate::{
    context::Context,
    event::Event,
    form, list,
    machine::Effect,
    service::{Fetched, ServiceOutput},
    validation::{self, ValidateFn},
};

pub const ASSIGN_FIELD: &str = "assignField";
pub const MARK_TOUCHED: &str = "markTouched";
pub const VALIDATE: &str = "validate";
pub const MARK_SUBMITTED: &str = "markSubmitted";
pub const NOTE_SAVE_BLOCKED: &str = "noteSaveBlocked";
pub const CLEAR_SAVE_BLOCKED: &str = "clearSaveBlocked";
pub const ASSIGN_LOADED: &str = "assignLoaded";
pub const ASSIGN_LOAD_ERROR: &str = "assignLoadError";
pub const CLEAR_LOAD_ERROR: &str = "clearLoadError";
pub const COMMIT_PRISTINE: &str = "commitPristine";
pub const ASSIGN_RESPONSE: &str = "assignResponse";
pub const ASSIGN_SAVE_ERROR: &str = "assignSaveError";
pub const CLEAR_SAVE_ERROR: &str = "clearSaveError";
pub const ASSIGN_DELETE_ERROR: &str = "assignDeleteError";
pub const RESET_TO_PRISTINE: &str = "resetToPristine";
pub const ASSIGN_FILTER: &str = "assignFilter";
pub const RESET_PAGE: &str = "resetPage";
pub const ARM_API_FILTER: &str = "armApiFilter";
pub const CANCEL_API_FILTER: &str = "cancelApiFilter";
pub const CYCLE_SORT: &str = "cycleSort";
pub const ASSIGN_PAGE: &str = "assignPage";
pub const ASSIGN_ITEMS: &str = "assignItems";
pub const CLAMP_PAGE: &str = "clampPage";

pub const CAN_SAVE: &str = "canSave";
pub const PAGE_OUT_OF_RANGE: &str = "pageOutOfRange";

/// Delay key and timer id of the debounced `API_FILTER` send.
pub const API_FILTER_TIMER: &str = "apiFilter";
pub const DEFAULT_FILTER_DEBOUNCE: Duration = Duration::from_millis(400);

pub(crate) struct ActionEnv<'a> {
    pub validate: Option<&'a ValidateFn>,
    pub delays: &'a BTreeMap<String, Duration>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Builtin {
    AssignField,
    MarkTouched,
    Validate,
    MarkSubmitted,
    NoteSaveBlocked,
    ClearSaveBlocked,
    AssignLoaded,
    AssignLoadError,
    ClearLoadError,
    CommitPristine,
    AssignResponse,
    AssignSaveError,
    ClearSaveError,
    AssignDeleteError,
    ResetToPristine,
    AssignFilter,
    ResetPage,
    ArmApiFilter,
    CancelApiFilter,
    CycleSort,
    AssignPage,
    AssignItems,
    ClampPage,
}

impl Builtin {
    pub(crate) fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            ASSIGN_FIELD => Self::AssignField,
            MARK_TOUCHED => Self::MarkTouched,
            VALIDATE => Self::Validate,
            MARK_SUBMITTED => Self::MarkSubmitted,
            NOTE_SAVE_BLOCKED => Self::NoteSaveBlocked,
            CLEAR_SAVE_BLOCKED => Self::ClearSaveBlocked,
            ASSIGN_LOADED => Self::AssignLoaded,
            ASSIGN_LOAD_ERROR => Self::AssignLoadError,
            CLEAR_LOAD_ERROR => Self::ClearLoadError,
            COMMIT_PRISTINE => Self::CommitPristine,
            ASSIGN_RESPONSE => Self::AssignResponse,
            ASSIGN_SAVE_ERROR => Self::AssignSaveError,
            CLEAR_SAVE_ERROR => Self::ClearSaveError,
            ASSIGN_DELETE_ERROR => Self::AssignDeleteError,
            RESET_TO_PRISTINE => Self::ResetToPristine,
            ASSIGN_FILTER => Self::AssignFilter,
            RESET_PAGE => Self::ResetPage,
            ARM_API_FILTER => Self::ArmApiFilter,
            CANCEL_API_FILTER => Self::CancelApiFilter,
            CYCLE_SORT => Self::CycleSort,
            ASSIGN_PAGE => Self::AssignPage,
            ASSIGN_ITEMS => Self::AssignItems,
            CLAMP_PAGE => Self::ClampPage,
            _ => return None,
        })
    }

    pub(crate) fn apply(
        self,
        ctx: &mut Context,
        event: &Event,
        env: &ActionEnv<'_>,
        effects: &mut Vec<Effect>,
    ) {
        match (self, event) {
            (Self::AssignField, Event::Update { field, value }) => {
                ctx.data.insert(field.clone(), value.clone());
            }
            (Self::MarkTouched, Event::Blur { field }) => {
                ctx.is_touched.insert(field.clone(), true);
            }
            (Self::Validate, _) => {
                if let Some(validate) = env.validate {
                    validation::revalidate(ctx, validate);
                }
            }
            (Self::MarkSubmitted, _) => ctx.show_validation_errors = true,
            (Self::NoteSaveBlocked, _) => ctx.save_blocked = form::save_blocked_reason(ctx),
            (Self::ClearSaveBlocked, _) => ctx.save_blocked = None,
            (Self::AssignLoaded, _) => match event.output() {
                Some(ServiceOutput::Loaded(Fetched::Record(record))) => {
                    form::assign_loaded(ctx, record.clone());
                }
                other => debug!(?other, "form load produced no record"),
            },
            (Self::AssignLoadError, Event::Failed { error, .. }) => {
                ctx.load_error = Some(error.message.clone());
            }
            (Self::ClearLoadError, _) => ctx.load_error = None,
            (Self::CommitPristine, _) => ctx.pristine_data = ctx.data.clone(),
            (Self::AssignResponse, Event::Done { output, .. }) => {
                if let ServiceOutput::Saved(response) = output {
                    ctx.response = Some(response.clone());
                }
            }
            (Self::AssignSaveError, Event::Failed { error, .. }) => {
                form::assign_save_error(ctx, error);
            }
            (Self::ClearSaveError, _) => form::clear_save_error(ctx),
            (Self::AssignDeleteError, Event::Failed { error, .. }) => {
                ctx.delete_error = Some(error.message.clone());
            }
            (Self::ResetToPristine, _) => form::reset_to_pristine(ctx),
            (Self::AssignFilter, Event::Filter { value }) => ctx.filter = value.clone(),
            (Self::ResetPage, _) => ctx.current_page = 0,
            (Self::ArmApiFilter, _) => effects.push(Effect::SendAfter {
                id: API_FILTER_TIMER.to_string(),
                event: Event::ApiFilter,
                delay: env
                    .delays
                    .get(API_FILTER_TIMER)
                    .copied()
                    .unwrap_or(DEFAULT_FILTER_DEBOUNCE),
            }),
            (Self::CancelApiFilter, _) => effects.push(Effect::CancelDelayed {
                id: API_FILTER_TIMER.to_string(),
            }),
            (Self::CycleSort, Event::SortBy { field }) => list::cycle_sort(ctx, field),
            (Self::AssignPage, Event::ChangePage { page }) => ctx.current_page = *page,
            (Self::AssignItems, _) => match event.output() {
                Some(ServiceOutput::Loaded(Fetched::Page(page))) => {
                    list::assign_items(ctx, page.clone());
                }
                other => debug!(?other, "list load produced no page"),
            },
            (Self::ClampPage, _) => {
                if let Some(ServiceOutput::Loaded(Fetched::Page(page))) = event.output() {
                    list::clamp_page(ctx, page.total);
                }
            }
            (builtin, event) => {
                debug!(?builtin, event = %event.name(), "action does not apply to event");
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BuiltinGuard {
    CanSave,
    PageOutOfRange,
}

impl BuiltinGuard {
    pub(crate) fn from_name(name: &str) -> Option<Self> {
        match name {
            CAN_SAVE => Some(Self::CanSave),
            PAGE_OUT_OF_RANGE => Some(Self::PageOutOfRange),
            _ => None,
        }
    }

    pub(crate) fn check(self, ctx: &Context, event: &Event) -> bool {
        match self {
            Self::CanSave => form::can_save(ctx),
            Self::PageOutOfRange => match event.output() {
                Some(ServiceOutput::Loaded(Fetched::Page(page))) => {
                    list::page_out_of_range(ctx, page.total)
                }
                _ => false,
            },
        }
    }
}
