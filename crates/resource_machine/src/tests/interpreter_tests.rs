use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use futures::StreamExt;
use serde_json::json;
use shared::domain::{FieldMap, ListPage, ListQuery};
use tokio::{sync::Mutex, time::Instant};

use super::*;
use crate::{
    builder::{LOADED, LOADING, LOAD_ERROR},
    context::Context,
    form::{build_form_machine, FormSpec},
    list::{build_list_machine, ListSpec},
    machine::Implementation,
    service::{service_fn, FnService, Fetched},
};

type Calls = Arc<Mutex<Vec<(Instant, ListQuery)>>>;

/// List service that records every query and answers with one row echoing
/// the filter it was called with.
fn recording(latency: Duration) -> (FnService, Calls) {
    let calls: Calls = Arc::default();
    let recorded = Arc::clone(&calls);
    let service = service_fn(move |ctx: Context| {
        let calls = Arc::clone(&recorded);
        async move {
            let query = ctx.list_query();
            calls.lock().await.push((Instant::now(), query.clone()));
            if !latency.is_zero() {
                time::sleep(latency).await;
            }
            Ok(Fetched::Page(ListPage {
                items: vec![json!({ "filter": query.filter })],
                total: 60,
            }))
        }
    });
    (service, calls)
}

fn list(service: FnService) -> MachineHandle {
    let machine = build_list_machine(ListSpec::new("privileges").sort_fields(["name"]))
        .with_config(Implementation::new(Arc::new(service)))
        .expect("machine");
    Interpreter::spawn(machine)
}

async fn filters(calls: &Calls) -> Vec<Option<String>> {
    calls
        .lock()
        .await
        .iter()
        .map(|(_, query)| query.filter.clone())
        .collect()
}

#[tokio::test(start_paused = true)]
async fn typing_burst_fetches_once_after_quiet_period() {
    let (service, calls) = recording(Duration::ZERO);
    let started = Instant::now();
    let handle = list(service);
    handle
        .wait_until(|snapshot| snapshot.matches(LOADED))
        .await
        .expect("initial load");

    for value in ["a", "ab", "abc"] {
        handle.send(Event::filter(value)).await.expect("filter");
        time::sleep(Duration::from_millis(100)).await;
    }
    time::sleep(Duration::from_secs(2)).await;

    let calls = calls.lock().await.clone();
    assert_eq!(calls.len(), 2, "initial fetch plus one filtered fetch");
    let (at, query) = &calls[1];
    assert_eq!(query.filter.as_deref(), Some("abc"));
    assert_eq!(query.offset, 0);
    let elapsed = at.duration_since(started);
    assert!(
        elapsed >= Duration::from_millis(600) && elapsed < Duration::from_millis(610),
        "filtered fetch ran at {elapsed:?}"
    );
    assert_eq!(handle.snapshot().context.items, vec![json!({"filter": "abc"})]);
}

#[tokio::test(start_paused = true)]
async fn rapid_edits_keep_only_the_last_value() {
    let (service, calls) = recording(Duration::ZERO);
    let handle = list(service);
    handle
        .wait_until(|snapshot| snapshot.matches(LOADED))
        .await
        .expect("initial load");

    handle.send(Event::filter("x")).await.expect("filter");
    time::sleep(Duration::from_millis(50)).await;
    handle.send(Event::filter("xy")).await.expect("filter");
    time::sleep(Duration::from_secs(1)).await;

    assert_eq!(filters(&calls).await, vec![None, Some("xy".to_string())]);
}

#[tokio::test(start_paused = true)]
async fn cancelled_filter_never_fetches() {
    let (service, calls) = recording(Duration::ZERO);
    let handle = list(service);
    handle
        .wait_until(|snapshot| snapshot.matches(LOADED))
        .await
        .expect("initial load");

    handle.send(Event::filter("x")).await.expect("filter");
    handle.send(Event::CancelApiFilter).await.expect("cancel");
    time::sleep(Duration::from_secs(1)).await;

    assert_eq!(calls.lock().await.len(), 1);
    assert_eq!(handle.snapshot().context.filter, "x");
}

#[tokio::test(start_paused = true)]
async fn page_changes_fetch_matching_offsets() {
    let (service, calls) = recording(Duration::ZERO);
    let handle = list(service);
    handle
        .wait_until(|snapshot| snapshot.matches(LOADED))
        .await
        .expect("initial load");

    handle
        .send(Event::ChangePage { page: 2 })
        .await
        .expect("page");
    let snapshot = handle
        .wait_until(|snapshot| snapshot.matches(LOADED))
        .await
        .expect("page load");
    assert_eq!(snapshot.context.current_page, 2);
    assert_eq!(snapshot.context.page_count(), 3);

    let offsets: Vec<usize> = calls
        .lock()
        .await
        .iter()
        .map(|(_, query)| query.offset)
        .collect();
    assert_eq!(offsets, vec![0, 50]);
}

#[tokio::test(start_paused = true)]
async fn newer_load_supersedes_in_flight_one() {
    let (service, calls) = recording(Duration::from_millis(300));
    let handle = list(service);

    // Still loading: reloading restarts the fetch with the new filter.
    handle.send(Event::filter("q")).await.expect("filter");
    handle.send(Event::CancelApiFilter).await.expect("cancel");
    handle.send(Event::ApiFilter).await.expect("reload");
    let snapshot = handle
        .wait_until(|snapshot| snapshot.matches(LOADED))
        .await
        .expect("load");

    let filters = filters(&calls).await;
    assert_eq!(filters.last(), Some(&Some("q".to_string())));
    assert_eq!(snapshot.context.items, vec![json!({"filter": "q"})]);
    assert_eq!(snapshot.context.filter, "q");
}

#[tokio::test(start_paused = true)]
async fn panicking_service_becomes_load_error() {
    let attempts = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&attempts);
    let service = service_fn(move |_ctx: Context| {
        let attempt = counter.fetch_add(1, Ordering::SeqCst);
        async move {
            if attempt == 0 {
                panic!("list backend blew up");
            }
            Ok(Fetched::Page(ListPage::default()))
        }
    });
    let handle = list(service);

    let failed = time::timeout(
        Duration::from_secs(5),
        handle.wait_until(|snapshot| snapshot.matches(LOAD_ERROR)),
    )
    .await
    .expect("machine left loading")
    .expect("load error");
    assert!(failed.context.load_error.is_some());

    handle.send(Event::Retry).await.expect("retry");
    let loaded = handle
        .wait_until(|snapshot| snapshot.matches(LOADED))
        .await
        .expect("loaded");
    assert_eq!(loaded.context.total_count, 0);
    assert_eq!(attempts.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn stop_cancels_timers_and_rejects_events() {
    let (service, calls) = recording(Duration::ZERO);
    let handle = list(service);
    handle
        .wait_until(|snapshot| snapshot.matches(LOADED))
        .await
        .expect("initial load");

    handle.send(Event::filter("x")).await.expect("filter");
    handle.stop().await;
    time::sleep(Duration::from_secs(1)).await;

    assert_eq!(calls.lock().await.len(), 1);
    assert!(handle.is_stopped());
    let err = handle.send(Event::Retry).await.expect_err("stopped");
    assert!(matches!(err, EngineError::Stopped(ref name) if name == "privileges"));
    assert!(handle.dispatch(Event::Retry).is_err());
}

#[tokio::test(start_paused = true)]
async fn pristine_form_never_reaches_save_service() {
    let saves = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&saves);
    let service = service_fn(|ctx: Context| async move { Ok(Fetched::Record(ctx.data)) })
        .with_save(move |ctx: Context| {
            counter.fetch_add(1, Ordering::SeqCst);
            async move { Ok(json!({ "saved": ctx.data })) }
        });

    let mut data = FieldMap::new();
    data.insert("name".into(), json!("default"));
    let machine = build_form_machine(FormSpec::new("blobstore").data(data))
        .with_config(Implementation::new(Arc::new(service)).validate(|_| Default::default()))
        .expect("machine");
    let handle = Interpreter::spawn(machine);
    handle
        .wait_until(|snapshot| snapshot.matches(LOADED))
        .await
        .expect("load");

    for _ in 0..5 {
        let snapshot = handle.send(Event::Save).await.expect("save");
        assert!(snapshot.matches(LOADED));
    }
    time::sleep(Duration::from_secs(1)).await;
    assert_eq!(saves.load(Ordering::SeqCst), 0);

    handle
        .send(Event::update("name", "archive"))
        .await
        .expect("update");
    handle.send(Event::Save).await.expect("save");
    let snapshot = handle
        .wait_until(|snapshot| snapshot.matches(LOADED) && snapshot.context.response.is_some())
        .await
        .expect("saved");
    assert_eq!(saves.load(Ordering::SeqCst), 1);
    assert!(snapshot.context.is_pristine());
}

#[tokio::test(start_paused = true)]
async fn changes_stream_follows_state() {
    let (service, _calls) = recording(Duration::from_millis(100));
    let handle = list(service);
    let states: Vec<String> = handle
        .changes()
        .map(|snapshot| snapshot.state)
        .take_while(|state| futures::future::ready(state != LOADED))
        .collect()
        .await;
    assert!(!states.is_empty());
    assert!(states.iter().all(|state| state == LOADING));
}
