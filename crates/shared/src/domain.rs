use std::{collections::BTreeMap, fmt};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Field values of one record, keyed by field name.
pub type FieldMap = serde_json::Map<String, Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MachineId(pub Uuid);

impl MachineId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for MachineId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MachineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Per-field messages. A field mapped to `None` (or an empty message) carries
/// no error.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FieldErrors(BTreeMap<String, Option<String>>);

impl FieldErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.0.insert(field.into(), Some(message.into()));
    }

    pub fn clear_field(&mut self, field: &str) {
        self.0.insert(field.to_string(), None);
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.0
            .get(field)
            .and_then(|m| m.as_deref())
            .filter(|m| !m.is_empty())
    }

    pub fn has_errors(&self) -> bool {
        self.0
            .values()
            .any(|m| m.as_deref().is_some_and(|m| !m.is_empty()))
    }

    /// Fields that currently carry a message.
    pub fn fields(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().filter_map(|(field, message)| match message {
            Some(message) if !message.is_empty() => Some((field.as_str(), message.as_str())),
            _ => None,
        })
    }

    pub fn merge(&mut self, other: FieldErrors) {
        self.0.extend(other.0);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for FieldErrors {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), Some(v.into())))
                .collect(),
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Asc => "asc",
            Self::Desc => "desc",
        }
    }
}

/// Parameters a list page hands to its load function verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListQuery {
    pub offset: usize,
    pub limit: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub direction: Option<SortDirection>,
}

/// One page of a server-side list.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ListPage {
    pub items: Vec<Value>,
    pub total: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cleared_and_empty_messages_are_not_errors() {
        let mut errors = FieldErrors::new();
        errors.clear_field("username");
        errors.set("password", "");
        assert!(!errors.has_errors());

        errors.set("password", "required");
        assert!(errors.has_errors());
        assert_eq!(errors.get("password"), Some("required"));
        assert_eq!(errors.fields().count(), 1);
    }

    #[test]
    fn list_query_omits_unset_parameters() {
        let query = ListQuery {
            offset: 25,
            limit: 25,
            filter: None,
            sort: Some("name".into()),
            direction: Some(SortDirection::Desc),
        };
        let json = serde_json::to_value(&query).expect("serialize");
        assert_eq!(
            json,
            serde_json::json!({"offset": 25, "limit": 25, "sort": "name", "direction": "desc"})
        );
    }
}
