use std::sync::Arc;

use resource_machine::{
    build_form_machine, build_list_machine,
    builder::{LOADED, SAVING},
    service_fn, validation, DescriptorPatch, Event, Fetched, FormSpec, Implementation,
    Interpreter, ListSpec, SaveBlocked, StatePatch, Transition,
};
use serde_json::json;
use shared::{
    domain::{FieldErrors, FieldMap, ListPage},
    error::{ApiError, ErrorCode},
};

fn login_machine() -> resource_machine::Machine {
    let mut data = FieldMap::new();
    data.insert("username".into(), json!(""));
    data.insert("password".into(), json!(""));

    let spec = FormSpec::new("login")
        .data(data)
        .state_after_save("authenticated")
        .config(|_| {
            DescriptorPatch::new().state(
                SAVING,
                StatePatch::new().on_error(
                    Transition::to(LOADED)
                        .guard("isCredentialsError")
                        .action("mapCredentialsError"),
                ),
            )
        });

    let service = service_fn(|ctx| async move { Ok(Fetched::Record(ctx.data)) }).with_save(
        |ctx| async move {
            if ctx.field_str("password") == "hunter2" {
                Ok(json!({ "token": "t-1", "username": ctx.field_str("username") }))
            } else {
                Err(ApiError::new(ErrorCode::Unauthorized, "invalid credentials").with_status(401))
            }
        },
    );

    build_form_machine(spec)
        .with_config(
            Implementation::new(Arc::new(service))
                .validator(validation::required(&["username", "password"], "required"))
                .guard("isCredentialsError", |_, event| {
                    event.error().is_some_and(ApiError::is_auth)
                })
                .action("mapCredentialsError", |ctx, _| {
                    ctx.save_errors = [("username", "invalid"), ("password", "invalid")]
                        .into_iter()
                        .collect();
                    ctx.data.insert("password".into(), json!(""));
                    ctx.validation_errors = FieldErrors::new();
                    ctx.skip_validation = true;
                }),
        )
        .expect("login machine")
}

#[tokio::test]
async fn rejected_login_clears_password_without_required_error() {
    let handle = Interpreter::spawn(login_machine());
    handle
        .wait_until(|snapshot| snapshot.matches(LOADED))
        .await
        .expect("loaded");

    handle
        .send(Event::update("username", "admin"))
        .await
        .expect("username");
    handle
        .send(Event::update("password", "wrong"))
        .await
        .expect("password");
    let submitted = handle.send(Event::Save).await.expect("save");
    assert!(submitted.matches(SAVING));
    assert!(submitted.controls_disabled());

    let rejected = handle
        .wait_until(|snapshot| snapshot.matches(LOADED) && snapshot.context.save_errors.has_errors())
        .await
        .expect("rejected");
    let ctx = &rejected.context;
    assert_eq!(ctx.field_str("username"), "admin");
    assert_eq!(ctx.field_str("password"), "");
    assert_eq!(ctx.save_errors.get("password"), Some("invalid"));
    assert_eq!(ctx.visible_error("password"), None);
    assert!(ctx.skip_validation);

    // The first edit after the rejection skips validation once.
    let edited = handle
        .send(Event::update("password", "hunter2"))
        .await
        .expect("retype");
    assert!(!edited.context.skip_validation);
    assert!(!edited.context.validation_errors.has_errors());

    handle.send(Event::Save).await.expect("save again");
    let done = handle
        .wait_until(|snapshot| snapshot.matches("authenticated"))
        .await
        .expect("authenticated");
    assert_eq!(
        done.context.response,
        Some(json!({"token": "t-1", "username": "admin"}))
    );

    let after = handle.send(Event::Cancel).await.expect("ignored");
    assert!(after.matches("authenticated"));
    handle.stop().await;
}

#[test]
fn empty_login_submit_is_blocked_locally() {
    let mut machine = login_machine();
    machine.start();
    let record = machine.context().data.clone();
    machine.transition(Event::Done {
        invocation: 1,
        output: resource_machine::ServiceOutput::Loaded(Fetched::Record(record)),
    });
    assert_eq!(machine.state(), LOADED);

    let step = machine.transition(Event::Save);
    assert!(step.effects.is_empty());
    let ctx = machine.context();
    assert_eq!(ctx.save_blocked, Some(SaveBlocked::Invalid));
    assert_eq!(ctx.visible_error("username"), Some("required"));
    assert_eq!(ctx.visible_error("password"), Some("required"));
}

#[tokio::test]
async fn list_walks_pages_of_server_results() {
    let service = service_fn(|ctx| async move {
        let query = ctx.list_query();
        let total = 60;
        let items = (query.offset..total.min(query.offset + query.limit))
            .map(|i| json!({ "name": format!("privilege-{i:02}") }))
            .collect();
        Ok(Fetched::Page(ListPage { items, total }))
    });
    let machine = build_list_machine(ListSpec::new("privileges").sort_fields(["name"]))
        .with_config(Implementation::new(Arc::new(service)))
        .expect("list machine");
    let handle = Interpreter::spawn(machine);

    let first = handle
        .wait_until(|snapshot| snapshot.matches(LOADED))
        .await
        .expect("first page");
    assert_eq!(first.context.items.len(), 25);
    assert_eq!(first.context.page_count(), 3);
    assert!(first.show_pagination());

    handle
        .send(Event::ChangePage { page: 2 })
        .await
        .expect("last page");
    let last = handle
        .wait_until(|snapshot| snapshot.matches(LOADED))
        .await
        .expect("last page loaded");
    assert_eq!(last.context.items.len(), 10);
    assert_eq!(last.context.items[0], json!({"name": "privilege-50"}));
    handle.stop().await;
}
