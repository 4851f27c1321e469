//! Sortable, filterable, paginated list shape.

use std::time::Duration;

use serde_json::Value;
use shared::domain::{ListPage, SortDirection};
use tracing::debug;

use crate::{
    actions::{self, API_FILTER_TIMER, DEFAULT_FILTER_DEBOUNCE, PAGE_OUT_OF_RANGE},
    builder::{self, MachineSpec, LOADED, LOADING, LOAD_ERROR},
    context::{page_count, Context},
    descriptor::{Descriptor, DescriptorPatch, StateNode, Transition},
    event,
};

pub const DEFAULT_PAGE_SIZE: usize = 25;

pub struct ListSpec {
    pub machine: MachineSpec,
    pub sort_fields: Vec<String>,
    pub page_size: usize,
    pub filter_debounce: Duration,
}

impl ListSpec {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            machine: MachineSpec::new(id),
            sort_fields: Vec::new(),
            page_size: DEFAULT_PAGE_SIZE,
            filter_debounce: DEFAULT_FILTER_DEBOUNCE,
        }
    }

    pub fn sort_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.sort_fields = fields.into_iter().map(Into::into).collect();
        self
    }

    /// Clamped to at least one row.
    pub fn page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn filter_debounce(mut self, delay: Duration) -> Self {
        self.filter_debounce = delay;
        self
    }

    pub fn initial_state(mut self, state: impl Into<String>) -> Self {
        self.machine.initial_state = Some(state.into());
        self
    }

    pub fn context(mut self, key: impl Into<String>, value: Value) -> Self {
        self.machine.context.insert(key.into(), value);
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

fn filter() -> Transition {
    Transition::internal().actions([
        actions::ASSIGN_FILTER,
        actions::RESET_PAGE,
        actions::ARM_API_FILTER,
    ])
}

fn cancel_api_filter() -> Transition {
    Transition::internal().action(actions::CANCEL_API_FILTER)
}

/// Builds the list descriptor. Every entry to `loading` fetches with the
/// current filter, sort and page; `FILTER` only reaches `loading` through the
/// debounced `API_FILTER`, which a page or sort change makes redundant.
pub fn build_list_machine(spec: ListSpec) -> Descriptor {
    let ListSpec {
        machine,
        sort_fields,
        page_size,
        filter_debounce,
    } = spec;

    let on_done = vec![
        Transition::to(LOADING)
            .guard(PAGE_OUT_OF_RANGE)
            .action(actions::CLAMP_PAGE),
        Transition::to(LOADED).action(actions::ASSIGN_ITEMS),
    ];
    let mut descriptor = builder::loading_skeleton(&machine.id, on_done)
        .delay(API_FILTER_TIMER, filter_debounce);
    descriptor
        .context
        .insert("pageSize".to_string(), Value::from(page_size.max(1)));

    let mut loaded = StateNode::new().on(
        event::CHANGE_PAGE,
        Transition::to(LOADING).actions([actions::CANCEL_API_FILTER, actions::ASSIGN_PAGE]),
    );
    for field in &sort_fields {
        loaded = loaded.on(
            event::sort_by(field),
            Transition::to(LOADING).actions([actions::CANCEL_API_FILTER, actions::CYCLE_SORT]),
        );
    }
    descriptor.states.insert(LOADED.to_string(), loaded);

    for state in [LOADING, LOADED, LOAD_ERROR] {
        let node = descriptor.states.entry(state.to_string()).or_default();
        node.on.entry(event::FILTER.to_string()).or_default().push(filter());
        node.on
            .entry(event::API_FILTER.to_string())
            .or_default()
            .push(Transition::to(LOADING));
        node.on
            .entry(event::CANCEL_API_FILTER.to_string())
            .or_default()
            .push(cancel_api_filter());
    }

    builder::finish(descriptor, machine)
}

/// unsorted -> ascending -> descending -> unsorted for the same field; a new
/// field starts ascending and replaces the previous one.
pub fn cycle_sort(ctx: &mut Context, field: &str) {
    if ctx.sort_field.as_deref() != Some(field) {
        ctx.sort_field = Some(field.to_string());
        ctx.sort_direction = Some(SortDirection::Asc);
        return;
    }
    match ctx.sort_direction {
        Some(SortDirection::Asc) => ctx.sort_direction = Some(SortDirection::Desc),
        Some(SortDirection::Desc) => {
            ctx.sort_field = None;
            ctx.sort_direction = None;
        }
        None => ctx.sort_direction = Some(SortDirection::Asc),
    }
}

pub fn sort_indicator(ctx: &Context, field: &str) -> Option<SortDirection> {
    if ctx.sort_field.as_deref() == Some(field) {
        ctx.sort_direction
    } else {
        None
    }
}

pub fn page_out_of_range(ctx: &Context, total: usize) -> bool {
    if total == 0 {
        return ctx.current_page != 0;
    }
    if ctx.page_size == 0 {
        return false;
    }
    ctx.current_page >= page_count(total, ctx.page_size)
}

pub(crate) fn clamp_page(ctx: &mut Context, total: usize) {
    let last = page_count(total, ctx.page_size).saturating_sub(1);
    debug!(requested = ctx.current_page, last, total, "clamping list page");
    ctx.total_count = total;
    ctx.current_page = last;
}

pub(crate) fn assign_items(ctx: &mut Context, page: ListPage) {
    ctx.items = page.items;
    ctx.total_count = page.total;
    ctx.load_error = None;
}

#[cfg(test)]
#[path = "tests/list_tests.rs"]
mod tests;
