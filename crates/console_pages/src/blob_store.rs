//! Blob-store configuration form.

use std::sync::Arc;

use resource_machine::{
    actions,
    builder::{SAVE_ERROR, SAVING},
    build_form_machine, Context, DescriptorPatch, EngineError, Event, FormSpec, Implementation,
    Machine, ResourceService, StatePatch, Transition,
};
use serde_json::{json, Value};
use shared::{
    domain::{FieldErrors, FieldMap},
    error::ErrorCode,
    protocol::BlobStoreRecord,
};
use tracing::debug;

pub const MACHINE_ID: &str = "blobStore";

pub const IS_VALIDATION_ERROR: &str = "isValidationError";
pub const MERGE_SERVER_ERRORS: &str = "mergeServerErrors";

pub const FILE: &str = "file";
pub const S3: &str = "s3";

/// Defaults for a store that does not exist yet.
pub fn new_store_defaults(name: &str) -> FieldMap {
    let mut data = FieldMap::new();
    data.insert("name".into(), json!(name));
    data.insert("type".into(), json!(FILE));
    data.insert("path".into(), json!(""));
    data
}

fn text<'a>(data: &'a FieldMap, field: &str) -> &'a str {
    data.get(field)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .trim()
}

pub fn validate_blob_store(data: &FieldMap) -> FieldErrors {
    let mut errors = FieldErrors::new();
    if text(data, "name").is_empty() {
        errors.set("name", "required");
    }
    match text(data, "type") {
        FILE if text(data, "path").is_empty() => errors.set("path", "required"),
        S3 if text(data, "bucket").is_empty() => errors.set("bucket", "required"),
        FILE | S3 => {}
        "" => errors.set("type", "required"),
        _ => errors.set("type", "must be file or s3"),
    }
    match data.get("softQuotaBytes") {
        None | Some(Value::Null) => {}
        Some(value) if value.as_u64().is_some() => {}
        Some(_) => errors.set("softQuotaBytes", "must be a non-negative integer"),
    }
    errors
}

/// `initial_data` is used as-is when the service creates a new store and is
/// replaced by the loaded record otherwise.
pub fn blob_store_machine(
    service: Arc<dyn ResourceService>,
    initial_data: FieldMap,
) -> Result<Machine, EngineError> {
    let spec = FormSpec::new(MACHINE_ID).data(initial_data).config(|_| {
        DescriptorPatch::new().state(
            SAVING,
            StatePatch::new().on_error(
                Transition::to(SAVE_ERROR)
                    .guard(IS_VALIDATION_ERROR)
                    .actions([actions::ASSIGN_SAVE_ERROR, MERGE_SERVER_ERRORS]),
            ),
        )
    });

    build_form_machine(spec).with_config(
        Implementation::new(service)
            .validate(validate_blob_store)
            .guard(IS_VALIDATION_ERROR, |_, event| {
                event
                    .error()
                    .is_some_and(|error| error.code == ErrorCode::Validation)
            })
            .action(MERGE_SERVER_ERRORS, merge_server_errors),
    )
}

fn merge_server_errors(ctx: &mut Context, event: &Event) {
    let Some(error) = event.error() else {
        return;
    };
    debug!(fields = error.field_errors.len(), "merging server field errors");
    let server: FieldErrors = error
        .field_errors
        .iter()
        .map(|(field, message)| (field.as_str(), message.as_str()))
        .collect();
    ctx.validation_errors.merge(server);
    ctx.show_validation_errors = true;
}

/// The form data as a typed record.
pub fn record(ctx: &Context) -> Result<BlobStoreRecord, serde_json::Error> {
    serde_json::from_value(Value::Object(ctx.data.clone()))
}

#[cfg(test)]
#[path = "tests/blob_store_tests.rs"]
mod tests;
