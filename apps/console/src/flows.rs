//! One function per subcommand: spawn the page's machine, feed it the events a
//! user would produce, wait for it to settle and report the outcome.

use std::sync::Arc;

use anyhow::{bail, Context as _, Result};
use console_pages::{
    blob_store, http_client, login, privileges, HttpResource, ResourceMode,
};
use futures::StreamExt;
use reqwest::Client;
use resource_machine::{
    builder::{DELETED, LOAD_ERROR, SAVE_ERROR},
    Event, Interpreter, MachineHandle, SaveBlocked, Snapshot,
};
use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::info;
use url::Url;

use crate::settings::ConsoleSettings;

pub struct Console {
    http: Client,
    base: Url,
    token: Option<String>,
    trace_snapshots: bool,
    filter_debounce: std::time::Duration,
}

/// A running page plus the optional task printing its snapshots.
struct Page {
    handle: MachineHandle,
    tracer: Option<JoinHandle<()>>,
}

impl Page {
    fn spawn(machine: resource_machine::Machine, trace: bool) -> Self {
        let handle = Interpreter::spawn(machine);
        let tracer = trace.then(|| {
            let mut changes = handle.changes();
            tokio::spawn(async move {
                while let Some(snapshot) = changes.next().await {
                    match serde_json::to_string(&snapshot) {
                        Ok(line) => println!("{line}"),
                        Err(err) => tracing::warn!(%err, "snapshot not serializable"),
                    }
                }
            })
        });
        Self { handle, tracer }
    }

    async fn send(&self, event: Event) -> Result<Snapshot> {
        Ok(self.handle.send(event).await?)
    }

    /// Waits until no service call is in flight.
    async fn settle(&self) -> Result<Snapshot> {
        Ok(self.handle.wait_until(|snapshot| !snapshot.is_busy()).await?)
    }

    async fn finish(self) {
        self.handle.stop().await;
        if let Some(tracer) = self.tracer {
            let _ = tracer.await;
        }
    }
}

fn load_failure(snapshot: &Snapshot) -> Option<String> {
    snapshot
        .matches(LOAD_ERROR)
        .then(|| snapshot.context.load_error.clone().unwrap_or_default())
}

impl Console {
    pub fn new(settings: &ConsoleSettings, token: Option<String>, trace_snapshots: bool) -> Result<Self> {
        Ok(Self {
            http: http_client(settings.request_timeout()).context("failed to build http client")?,
            base: settings.base_url()?,
            token,
            trace_snapshots,
            filter_debounce: settings.filter_debounce(),
        })
    }

    fn resource(&self, path: &str, mode: ResourceMode) -> Result<HttpResource> {
        let resource = HttpResource::new(self.http.clone(), &self.base, path, mode)?;
        Ok(match &self.token {
            Some(token) => resource.with_bearer(token.clone()),
            None => resource,
        })
    }

    pub async fn login(&self, username: &str, password: &str) -> Result<()> {
        let service = self.resource("login", ResourceMode::Create)?;
        let page = Page::spawn(login::login_machine(Arc::new(service))?, self.trace_snapshots);
        page.settle().await?;

        page.send(Event::update("username", username)).await?;
        page.send(Event::update("password", password)).await?;
        page.send(Event::Save).await?;
        let snapshot = page.settle().await?;
        page.finish().await;

        if let Some(authentication) = login::authentication(&snapshot.context) {
            info!(username = %authentication.username, "authenticated");
            println!("{}", serde_json::to_string_pretty(&authentication)?);
            return Ok(());
        }
        if snapshot.context.save_errors.has_errors() {
            bail!("login rejected: invalid username or password");
        }
        bail!(
            "login failed: {}",
            snapshot
                .context
                .save_error
                .as_deref()
                .unwrap_or("username and password are required")
        )
    }

    pub async fn privileges(
        &self,
        filter: Option<&str>,
        sort: &[String],
        page_number: usize,
        page_size: usize,
    ) -> Result<()> {
        let service = self.resource("privileges", ResourceMode::Collection)?;
        let machine =
            privileges::privilege_list_machine(Arc::new(service), page_size, self.filter_debounce)?;
        let page = Page::spawn(machine, self.trace_snapshots);
        let mut snapshot = page.settle().await?;

        if let Some(filter) = filter {
            // Typing would wait out the debounce; a one-shot filter flushes it.
            page.send(Event::filter(filter)).await?;
            page.send(Event::CancelApiFilter).await?;
            page.send(Event::ApiFilter).await?;
            snapshot = page.settle().await?;
        }
        for field in sort {
            page.send(Event::sort_by(field.as_str())).await?;
            snapshot = page.settle().await?;
        }
        if page_number > 0 {
            page.send(Event::ChangePage { page: page_number }).await?;
            snapshot = page.settle().await?;
        }
        page.finish().await;

        if let Some(reason) = load_failure(&snapshot) {
            bail!("failed to load privileges: {reason}");
        }
        let ctx = &snapshot.context;
        for privilege in privileges::privileges(ctx) {
            println!(
                "{:<32} {:<14} {}",
                privilege.name, privilege.kind, privilege.description
            );
        }
        println!(
            "page {} of {} ({} privileges)",
            ctx.current_page + 1,
            ctx.page_count().max(1),
            ctx.total_count
        );
        Ok(())
    }

    pub async fn blob_store(
        &self,
        name: &str,
        assignments: Vec<(String, Value)>,
        delete: bool,
        create: bool,
    ) -> Result<()> {
        let (service, initial) = if create {
            (
                self.resource("blobstores", ResourceMode::Create)?,
                blob_store::new_store_defaults(name),
            )
        } else {
            (
                self.resource(&format!("blobstores/{name}"), ResourceMode::Record)?,
                Default::default(),
            )
        };
        let page = Page::spawn(
            blob_store::blob_store_machine(Arc::new(service), initial)?,
            self.trace_snapshots,
        );
        let loaded = page.settle().await?;
        if let Some(reason) = load_failure(&loaded) {
            page.finish().await;
            bail!("failed to load blob store '{name}': {reason}");
        }

        let edited = !assignments.is_empty();
        for (field, value) in assignments {
            page.send(Event::update(field, value)).await?;
        }

        let snapshot = if delete {
            page.send(Event::Delete).await?;
            page.send(Event::ConfirmDelete).await?;
            page.settle().await?
        } else if edited || create {
            page.send(Event::Save).await?;
            page.settle().await?
        } else {
            loaded
        };
        page.finish().await;

        let ctx = &snapshot.context;
        if delete {
            if snapshot.matches(DELETED) {
                println!("deleted blob store '{name}'");
                return Ok(());
            }
            bail!(
                "failed to delete blob store '{name}': {}",
                ctx.delete_error.as_deref().unwrap_or("unknown error")
            );
        }
        if snapshot.matches(SAVE_ERROR) {
            let fields: Vec<String> = ctx
                .save_errors
                .fields()
                .map(|(field, message)| format!("{field}: {message}"))
                .collect();
            bail!(
                "failed to save blob store '{name}': {} {}",
                ctx.save_error.as_deref().unwrap_or("unknown error"),
                fields.join(", ")
            );
        }
        match ctx.save_blocked {
            Some(SaveBlocked::Invalid) => {
                let fields: Vec<String> = ctx
                    .validation_errors
                    .fields()
                    .map(|(field, message)| format!("{field}: {message}"))
                    .collect();
                bail!("blob store '{name}' is invalid: {}", fields.join(", "));
            }
            Some(SaveBlocked::NoChanges) => info!(store = name, "nothing to save"),
            None => {}
        }

        let record = blob_store::record(ctx).context("blob store record is malformed")?;
        println!("{}", serde_json::to_string_pretty(&record)?);
        Ok(())
    }
}
