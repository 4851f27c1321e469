use serde_json::json;
use shared::error::{ApiError, ErrorCode};

use super::*;
use crate::{
    descriptor::{Invoke, StateNode},
    service::{Fetched, LocalDefaults, ServiceOutput},
};

fn implementation() -> Implementation {
    Implementation::new(Arc::new(LocalDefaults))
}

fn toggle() -> Descriptor {
    Descriptor::new("toggle", "loading")
        .state(
            "loading",
            StateNode::new().invoke(
                Invoke::new(ServiceKind::Fetch)
                    .on_done(Transition::to("off"))
                    .on_error(Transition::to("broken")),
            ),
        )
        .state(
            "off",
            StateNode::new().on("TOGGLE", Transition::to("on").action("count")),
        )
        .state(
            "on",
            StateNode::new()
                .on("TOGGLE", Transition::to("off").action("count"))
                .on("RELOAD", Transition::to("loading")),
        )
        .state("broken", StateNode::terminal())
}

fn toggle_event() -> Event {
    Event::Custom {
        name: "TOGGLE".into(),
        payload: Value::Null,
    }
}

fn counting() -> Implementation {
    implementation().action("count", |ctx, _| {
        let count = ctx.extra.get("count").and_then(Value::as_u64).unwrap_or(0);
        ctx.extra.insert("count".into(), json!(count + 1));
    })
}

fn loaded(invocation: u64) -> Event {
    Event::Done {
        invocation,
        output: ServiceOutput::Loaded(Fetched::Record(FieldMap::new())),
    }
}

fn invocation(step: &Step) -> u64 {
    step.effects
        .iter()
        .find_map(|effect| match effect {
            Effect::Invoke { invocation, .. } => Some(*invocation),
            _ => None,
        })
        .expect("invoke effect")
}

#[test]
fn unbound_action_fails_at_construction() {
    let err = toggle().with_config(implementation()).expect_err("should fail");
    assert!(matches!(
        err,
        EngineError::MissingAction { ref action, .. } if action == "count"
    ));
}

#[test]
fn unbound_guard_fails_at_construction() {
    let descriptor = toggle().state(
        "off",
        StateNode::new().on("TOGGLE", Transition::to("on").guard("isAllowed")),
    );
    let err = descriptor.with_config(implementation()).expect_err("should fail");
    assert!(matches!(err, EngineError::MissingGuard { ref guard, .. } if guard == "isAllowed"));
}

#[test]
fn unknown_target_and_initial_are_rejected() {
    let descriptor = toggle().state("off", StateNode::new().on("TOGGLE", Transition::to("nowhere")));
    let err = descriptor.with_config(counting()).expect_err("should fail");
    assert!(matches!(err, EngineError::UnknownTarget { ref target, .. } if target == "nowhere"));

    let mut descriptor = toggle();
    descriptor.initial = "missing".into();
    let err = descriptor.with_config(counting()).expect_err("should fail");
    assert!(matches!(err, EngineError::UnknownInitialState { .. }));
}

#[test]
fn validate_needs_a_validator() {
    let descriptor = toggle().state(
        "off",
        StateNode::new().on("TOGGLE", Transition::internal().action("validate")),
    );
    let err = descriptor
        .clone()
        .with_config(counting())
        .expect_err("should fail");
    assert!(matches!(err, EngineError::MissingAction { ref action, .. } if action == "validate"));

    descriptor
        .with_config(counting().validate(|_| Default::default()))
        .expect("validator bound");
}

#[test]
fn malformed_context_defaults_are_rejected() {
    let mut descriptor = toggle();
    descriptor.context.insert("pageSize".into(), json!("many"));
    let err = descriptor.with_config(counting()).expect_err("should fail");
    assert!(matches!(err, EngineError::InvalidContext { .. }));
}

#[test]
fn start_enters_initial_state_and_invokes() {
    let mut machine = toggle().with_config(counting()).expect("machine");
    let step = machine.start();
    assert_eq!(machine.state(), "loading");
    assert!(matches!(
        step.effects.as_slice(),
        [Effect::Invoke { service: ServiceKind::Fetch, .. }]
    ));
    assert!(machine.start().effects.is_empty());
}

#[test]
fn transitions_run_actions_in_order() {
    let mut machine = toggle().with_config(counting()).expect("machine");
    let step = machine.start();
    machine.transition(loaded(invocation(&step)));
    assert_eq!(machine.state(), "off");

    let step = machine.transition(toggle_event());
    assert!(step.handled && step.changed_state());
    machine.transition(toggle_event());
    assert_eq!(machine.state(), "off");
    assert_eq!(machine.context().extra["count"], json!(2));
}

#[test]
fn unknown_events_are_ignored() {
    let mut machine = toggle().with_config(counting()).expect("machine");
    let step = machine.start();
    machine.transition(loaded(invocation(&step)));

    let step = machine.transition(Event::Save);
    assert!(!step.handled);
    assert_eq!(machine.state(), "off");
}

#[test]
fn superseded_results_are_dropped() {
    let mut machine = toggle().with_config(counting()).expect("machine");
    let first = invocation(&machine.start());
    machine.transition(loaded(first));
    machine.transition(toggle_event());

    let reload = machine.transition(Event::Custom {
        name: "RELOAD".into(),
        payload: Value::Null,
    });
    let second = invocation(&reload);
    assert!(second > first);

    let stale = machine.transition(Event::Failed {
        invocation: first,
        error: ApiError::new(ErrorCode::Unavailable, "late"),
    });
    assert!(!stale.handled);
    assert_eq!(machine.state(), "loading");

    machine.transition(loaded(second));
    assert_eq!(machine.state(), "off");

    // A result is consumed once.
    assert!(!machine.transition(loaded(second)).handled);
}

#[test]
fn terminal_states_ignore_events() {
    let mut machine = toggle().with_config(counting()).expect("machine");
    let invocation = invocation(&machine.start());
    machine.transition(Event::Failed {
        invocation,
        error: ApiError::new(ErrorCode::Internal, "boom"),
    });
    assert!(machine.is_terminal());
    assert!(!machine.transition(toggle_event()).handled);
}

#[test]
fn custom_action_replaces_builtin_of_same_name() {
    let descriptor = toggle().state(
        "off",
        StateNode::new().on("TOGGLE", Transition::internal().action("resetPage")),
    );
    let mut machine = descriptor
        .with_config(counting().action("resetPage", |ctx, _| ctx.current_page = 7))
        .expect("machine");
    let invocation = invocation(&machine.start());
    machine.transition(loaded(invocation));
    machine.transition(toggle_event());
    assert_eq!(machine.context().current_page, 7);
}

#[test]
fn snapshot_reports_busy_states() {
    let mut machine = toggle().with_config(counting()).expect("machine");
    let invocation = invocation(&machine.start());
    assert!(machine.snapshot().is_busy());
    assert!(!machine.snapshot().controls_disabled());
    machine.transition(loaded(invocation));
    assert!(!machine.snapshot().is_busy());
    assert!(machine.snapshot().matches("off"));
}
