//! Field validation and dirty tracking.
//!
//! Pristineness is never stored: it is recomputed as deep structural equality
//! of `data` and `pristine_data`. Objects compare key by key regardless of
//! insertion order, a key holding `null` differs from a missing key, arrays
//! compare element by element in order, and numbers compare as JSON numbers
//! (`1` and `1.0` differ).

use std::sync::Arc;

use serde_json::Value;
use shared::domain::{FieldErrors, FieldMap};
use tracing::debug;

use crate::context::Context;

pub type ValidateFn = Arc<dyn Fn(&FieldMap) -> FieldErrors + Send + Sync>;

pub fn is_pristine(data: &FieldMap, pristine: &FieldMap) -> bool {
    data == pristine
}

/// Recomputes `validation_errors` from `data`, unless a one-shot
/// `skip_validation` flag is set, in which case the flag is consumed and the
/// previous errors stay. Returns whether validation ran.
pub fn revalidate(ctx: &mut Context, validate: &ValidateFn) -> bool {
    if ctx.skip_validation {
        ctx.skip_validation = false;
        debug!("validation pass skipped by one-shot flag");
        return false;
    }
    ctx.validation_errors = validate(&ctx.data);
    true
}

/// True when `value` holds something a user would consider filled in.
pub fn is_present(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::String(s)) => !s.trim().is_empty(),
        Some(Value::Array(items)) => !items.is_empty(),
        Some(_) => true,
    }
}

/// Validator flagging each of `fields` with `message` when it is empty.
pub fn required(fields: &[&str], message: &str) -> ValidateFn {
    let fields: Vec<String> = fields.iter().map(|f| f.to_string()).collect();
    let message = message.to_string();
    Arc::new(move |data: &FieldMap| {
        fields
            .iter()
            .filter(|field| !is_present(data.get(field.as_str())))
            .map(|field| (field.clone(), message.clone()))
            .collect()
    })
}

#[cfg(test)]
#[path = "tests/validation_tests.rs"]
mod tests;
