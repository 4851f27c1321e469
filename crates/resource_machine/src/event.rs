//! Event vocabulary accepted by form and list machines.

use std::borrow::Cow;

use serde_json::Value;
use shared::error::ApiError;

use crate::service::ServiceOutput;

pub const UPDATE: &str = "UPDATE";
pub const BLUR: &str = "BLUR";
pub const SAVE: &str = "SAVE";
pub const CANCEL: &str = "CANCEL";
pub const DELETE: &str = "DELETE";
pub const CONFIRM_DELETE: &str = "CONFIRM_DELETE";
pub const CLEAR_SAVE_ERROR: &str = "CLEAR_SAVE_ERROR";
pub const RETRY: &str = "RETRY";
pub const FILTER: &str = "FILTER";
pub const API_FILTER: &str = "API_FILTER";
pub const CANCEL_API_FILTER: &str = "CANCEL_API_FILTER";
pub const CHANGE_PAGE: &str = "CHANGE_PAGE";
pub const SORT_BY_PREFIX: &str = "SORT_BY_";

/// Name under which `SORT_BY_<field>` handlers are registered.
pub fn sort_by(field: &str) -> String {
    format!("{SORT_BY_PREFIX}{field}")
}

#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Update { field: String, value: Value },
    Blur { field: String },
    Save,
    Cancel,
    Delete,
    ConfirmDelete,
    ClearSaveError,
    Retry,
    Filter { value: String },
    ApiFilter,
    CancelApiFilter,
    SortBy { field: String },
    ChangePage { page: usize },
    /// Page-specific event routed by name through the descriptor.
    Custom { name: String, payload: Value },
    /// A service call resolved. `invocation` identifies the call so results
    /// from superseded calls can be dropped.
    Done {
        invocation: u64,
        output: ServiceOutput,
    },
    Failed { invocation: u64, error: ApiError },
}

impl Event {
    pub fn update(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Update {
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn filter(value: impl Into<String>) -> Self {
        Self::Filter {
            value: value.into(),
        }
    }

    pub fn sort_by(field: impl Into<String>) -> Self {
        Self::SortBy {
            field: field.into(),
        }
    }

    pub fn name(&self) -> Cow<'_, str> {
        match self {
            Self::Update { .. } => Cow::Borrowed(UPDATE),
            Self::Blur { .. } => Cow::Borrowed(BLUR),
            Self::Save => Cow::Borrowed(SAVE),
            Self::Cancel => Cow::Borrowed(CANCEL),
            Self::Delete => Cow::Borrowed(DELETE),
            Self::ConfirmDelete => Cow::Borrowed(CONFIRM_DELETE),
            Self::ClearSaveError => Cow::Borrowed(CLEAR_SAVE_ERROR),
            Self::Retry => Cow::Borrowed(RETRY),
            Self::Filter { .. } => Cow::Borrowed(FILTER),
            Self::ApiFilter => Cow::Borrowed(API_FILTER),
            Self::CancelApiFilter => Cow::Borrowed(CANCEL_API_FILTER),
            Self::SortBy { field } => Cow::Owned(sort_by(field)),
            Self::ChangePage { .. } => Cow::Borrowed(CHANGE_PAGE),
            Self::Custom { name, .. } => Cow::Borrowed(name.as_str()),
            Self::Done { .. } => Cow::Borrowed("done.invoke"),
            Self::Failed { .. } => Cow::Borrowed("error.invoke"),
        }
    }

    pub fn error(&self) -> Option<&ApiError> {
        match self {
            Self::Failed { error, .. } => Some(error),
            _ => None,
        }
    }

    pub fn output(&self) -> Option<&ServiceOutput> {
        match self {
            Self::Done { output, .. } => Some(output),
            _ => None,
        }
    }

    pub(crate) fn invocation(&self) -> Option<u64> {
        match self {
            Self::Done { invocation, .. } | Self::Failed { invocation, .. } => Some(*invocation),
            _ => None,
        }
    }
}
