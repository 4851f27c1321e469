//! Login form: two required fields, credentials posted on save.
//!
//! A rejected login keeps the username, clears the password and flags both
//! fields as invalid. The cleared password must not immediately show a
//! "required" message, so validation is skipped for the next edit.

use std::sync::Arc;

use resource_machine::{
    builder::{LOADED, SAVING},
    build_form_machine, validation, Context, DescriptorPatch, EngineError, Event, FormSpec,
    Implementation, Machine, ResourceService, StatePatch, Transition,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use shared::{
    domain::{FieldErrors, FieldMap},
    protocol::AuthResponse,
};
use tracing::{debug, info};

pub const MACHINE_ID: &str = "login";
pub const AUTHENTICATED: &str = "authenticated";

pub const IS_CREDENTIALS_ERROR: &str = "isCredentialsError";
pub const MAP_CREDENTIALS_ERROR: &str = "mapCredentialsError";
pub const EXPOSE_AUTHENTICATION: &str = "exposeAuthentication";

/// Context key holding [`Authentication`] once the login succeeded.
pub const AUTHENTICATION_KEY: &str = "authentication";

const FIELDS: [&str; 2] = ["username", "password"];
const INVALID: &str = "invalid";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Authentication {
    pub response: Value,
    pub username: String,
}

impl Authentication {
    pub fn auth_response(&self) -> Result<AuthResponse, serde_json::Error> {
        serde_json::from_value(self.response.clone())
    }
}

pub fn login_spec() -> FormSpec {
    let data: FieldMap = FIELDS
        .iter()
        .map(|field| (field.to_string(), json!("")))
        .collect();

    FormSpec::new(MACHINE_ID)
        .data(data)
        .context(AUTHENTICATION_KEY, Value::Null)
        .state_after_save(AUTHENTICATED)
        .config(|_| {
            DescriptorPatch::new().state(
                SAVING,
                StatePatch::new()
                    .on_error(
                        Transition::to(LOADED)
                            .guard(IS_CREDENTIALS_ERROR)
                            .action(MAP_CREDENTIALS_ERROR),
                    )
                    .on_done(Transition::internal().action(EXPOSE_AUTHENTICATION)),
            )
        })
}

/// Binds the login form to `service`, whose save call posts the credentials.
pub fn login_machine(service: Arc<dyn ResourceService>) -> Result<Machine, EngineError> {
    build_form_machine(login_spec()).with_config(
        Implementation::new(service)
            .validator(validation::required(&FIELDS, "required"))
            .guard(IS_CREDENTIALS_ERROR, |_, event| is_credentials_error(event))
            .action(MAP_CREDENTIALS_ERROR, map_credentials_error)
            .action(EXPOSE_AUTHENTICATION, expose_authentication),
    )
}

fn is_credentials_error(event: &Event) -> bool {
    event.error().is_some_and(|error| error.is_auth())
}

fn map_credentials_error(ctx: &mut Context, _event: &Event) {
    debug!("login rejected, clearing password");
    ctx.save_errors = FIELDS.iter().map(|field| (*field, INVALID)).collect();
    ctx.data.insert("password".into(), json!(""));
    ctx.validation_errors = FieldErrors::new();
    ctx.skip_validation = true;
}

fn expose_authentication(ctx: &mut Context, _event: &Event) {
    let authentication = Authentication {
        response: ctx.response.clone().unwrap_or_default(),
        username: ctx.field_str("username").to_string(),
    };
    info!(username = %authentication.username, "login succeeded");
    match serde_json::to_value(&authentication) {
        Ok(value) => {
            ctx.extra.insert(AUTHENTICATION_KEY.into(), value);
        }
        Err(err) => debug!(%err, "authentication not serializable"),
    }
}

/// Reads what [`expose_authentication`] stored, if the login finished.
pub fn authentication(ctx: &Context) -> Option<Authentication> {
    ctx.extra
        .get(AUTHENTICATION_KEY)
        .filter(|value| !value.is_null())
        .and_then(|value| serde_json::from_value(value.clone()).ok())
}

#[cfg(test)]
#[path = "tests/login_tests.rs"]
mod tests;
