use std::{sync::Arc, time::Duration};

use resource_machine::{
    build_list_machine, Context, EngineError, Implementation, ListSpec, Machine, ResourceService,
};
use shared::protocol::PrivilegeSummary;
use tracing::warn;

pub const MACHINE_ID: &str = "privileges";
pub const SORT_FIELDS: [&str; 3] = ["name", "type", "description"];

pub fn privilege_list_machine(
    service: Arc<dyn ResourceService>,
    page_size: usize,
    filter_debounce: Duration,
) -> Result<Machine, EngineError> {
    let spec = ListSpec::new(MACHINE_ID)
        .sort_fields(SORT_FIELDS)
        .page_size(page_size)
        .filter_debounce(filter_debounce);
    build_list_machine(spec).with_config(Implementation::new(service))
}

/// Rows of the current page. Rows that do not look like a privilege are
/// skipped.
pub fn privileges(ctx: &Context) -> Vec<PrivilegeSummary> {
    ctx.items
        .iter()
        .filter_map(|item| match serde_json::from_value(item.clone()) {
            Ok(privilege) => Some(privilege),
            Err(err) => {
                warn!(%err, "skipping malformed privilege row");
                None
            }
        })
        .collect()
}
