use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use shared::domain::{FieldErrors, FieldMap, ListQuery, SortDirection};

use crate::validation;

/// Why a `SAVE` did not leave `loaded`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SaveBlocked {
    Invalid,
    NoChanges,
}

/// Data carried by one running machine.
///
/// Only actions mutate a context; hosts read it through snapshots. Keys that
/// are not modelled here land in `extra`, so pages can keep their own values
/// next to the engine's.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Context {
    pub data: FieldMap,
    pub pristine_data: FieldMap,
    pub validation_errors: FieldErrors,
    pub save_error: Option<String>,
    pub save_errors: FieldErrors,
    pub load_error: Option<String>,
    pub delete_error: Option<String>,
    pub is_touched: BTreeMap<String, bool>,
    pub show_validation_errors: bool,
    pub skip_validation: bool,
    pub save_blocked: Option<SaveBlocked>,
    pub response: Option<Value>,
    pub items: Vec<Value>,
    pub filter: String,
    pub sort_field: Option<String>,
    pub sort_direction: Option<SortDirection>,
    pub current_page: usize,
    pub page_size: usize,
    pub total_count: usize,
    #[serde(flatten)]
    pub extra: FieldMap,
}

impl Context {
    pub fn is_pristine(&self) -> bool {
        validation::is_pristine(&self.data, &self.pristine_data)
    }

    pub fn field(&self, name: &str) -> Option<&Value> {
        self.data.get(name)
    }

    pub fn field_str(&self, name: &str) -> &str {
        self.data
            .get(name)
            .and_then(Value::as_str)
            .unwrap_or_default()
    }

    pub fn is_field_touched(&self, name: &str) -> bool {
        self.is_touched.get(name).copied().unwrap_or(false)
    }

    /// Validation message a host should render for `field`: computed errors
    /// stay hidden until the field was blurred or a save was attempted.
    pub fn visible_error(&self, field: &str) -> Option<&str> {
        if self.show_validation_errors || self.is_field_touched(field) {
            self.validation_errors.get(field)
        } else {
            None
        }
    }

    pub fn page_count(&self) -> usize {
        page_count(self.total_count, self.page_size)
    }

    /// Filter, sort and page exactly as the user left them. An oversized page
    /// saturates the offset; the fetch result clamps it back into range.
    pub fn list_query(&self) -> ListQuery {
        ListQuery {
            offset: self.current_page.saturating_mul(self.page_size),
            limit: self.page_size,
            filter: (!self.filter.is_empty()).then(|| self.filter.clone()),
            sort: self.sort_field.clone(),
            direction: self.sort_field.as_ref().and(self.sort_direction),
        }
    }
}

pub fn page_count(total: usize, page_size: usize) -> usize {
    if page_size == 0 {
        return 0;
    }
    total.div_ceil(page_size)
}
