//! Async host for a [`Machine`]: a single task owns the machine and drains one
//! command queue, so transitions never run concurrently. Service calls and
//! delayed sends run as side tasks that post their outcome back to the queue.

use std::{collections::HashMap, panic::AssertUnwindSafe};

use futures::FutureExt;
use shared::{
    domain::MachineId,
    error::{ApiError, ErrorCode},
};
use tokio::{
    sync::{mpsc, oneshot, watch},
    task::JoinHandle,
    time,
};
use tokio_stream::wrappers::WatchStream;
use tracing::{debug, error, info};

use crate::{
    error::EngineError,
    event::Event,
    machine::{Effect, Machine, Snapshot, Step},
    service,
};

enum Command {
    Send {
        event: Event,
        ack: Option<oneshot::Sender<Snapshot>>,
    },
    Fire {
        id: String,
        generation: u64,
        event: Event,
    },
    Stop {
        ack: oneshot::Sender<()>,
    },
}

/// Host-side handle to a running machine. Cloning is cheap; the machine stops
/// when [`MachineHandle::stop`] is called or the last handle is dropped.
#[derive(Clone)]
pub struct MachineHandle {
    id: MachineId,
    name: String,
    tx: mpsc::UnboundedSender<Command>,
    snapshots: watch::Receiver<Snapshot>,
}

pub struct Interpreter;

impl Interpreter {
    /// Starts `machine` on the current tokio runtime.
    pub fn spawn(machine: Machine) -> MachineHandle {
        let (tx, commands) = mpsc::unbounded_channel();
        let (snapshots, snapshot_rx) = watch::channel(machine.snapshot());
        let handle = MachineHandle {
            id: machine.id(),
            name: machine.name().to_string(),
            tx: tx.clone(),
            snapshots: snapshot_rx,
        };
        let runtime = Runtime {
            machine,
            commands,
            loopback: tx.downgrade(),
            snapshots,
            timers: HashMap::new(),
            generation: 0,
            inflight: None,
        };
        tokio::spawn(runtime.run());
        handle
    }
}

impl MachineHandle {
    pub fn id(&self) -> MachineId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Queues `event` and resolves once it and its synchronous consequences
    /// have been applied.
    pub async fn send(&self, event: Event) -> Result<Snapshot, EngineError> {
        let (ack, applied) = oneshot::channel();
        self.tx
            .send(Command::Send {
                event,
                ack: Some(ack),
            })
            .map_err(|_| self.stopped())?;
        applied.await.map_err(|_| self.stopped())
    }

    /// Queues `event` without waiting for it to be applied.
    pub fn dispatch(&self, event: Event) -> Result<(), EngineError> {
        self.tx
            .send(Command::Send { event, ack: None })
            .map_err(|_| self.stopped())
    }

    pub fn snapshot(&self) -> Snapshot {
        self.snapshots.borrow().clone()
    }

    pub fn changes(&self) -> WatchStream<Snapshot> {
        WatchStream::new(self.snapshots.clone())
    }

    /// Waits for the first snapshot satisfying `predicate`, current one included.
    pub async fn wait_until<F>(&self, mut predicate: F) -> Result<Snapshot, EngineError>
    where
        F: FnMut(&Snapshot) -> bool,
    {
        let mut snapshots = self.snapshots.clone();
        let snapshot = snapshots
            .wait_for(|snapshot| predicate(snapshot))
            .await
            .map_err(|_| self.stopped())?
            .clone();
        Ok(snapshot)
    }

    /// Stops the machine, cancelling pending delayed sends and in-flight
    /// service calls. Later events are rejected with [`EngineError::Stopped`].
    pub async fn stop(&self) {
        let (ack, stopped) = oneshot::channel();
        if self.tx.send(Command::Stop { ack }).is_ok() {
            let _ = stopped.await;
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.tx.is_closed()
    }

    fn stopped(&self) -> EngineError {
        EngineError::Stopped(self.name.clone())
    }
}

struct DelayedSend {
    generation: u64,
    task: JoinHandle<()>,
}

struct Runtime {
    machine: Machine,
    commands: mpsc::UnboundedReceiver<Command>,
    loopback: mpsc::WeakUnboundedSender<Command>,
    snapshots: watch::Sender<Snapshot>,
    timers: HashMap<String, DelayedSend>,
    generation: u64,
    inflight: Option<JoinHandle<()>>,
}

impl Runtime {
    async fn run(mut self) {
        info!(machine = %self.machine.name(), id = %self.machine.id(), "machine started");
        let step = self.machine.start();
        self.apply(step);

        while let Some(command) = self.commands.recv().await {
            match command {
                Command::Send { event, ack } => {
                    let step = self.machine.transition(event);
                    self.apply(step);
                    if let Some(ack) = ack {
                        let _ = ack.send(self.machine.snapshot());
                    }
                }
                Command::Fire {
                    id,
                    generation,
                    event,
                } => {
                    let current = self
                        .timers
                        .get(&id)
                        .is_some_and(|pending| pending.generation == generation);
                    if !current {
                        debug!(machine = %self.machine.name(), timer = %id, generation, "superseded delayed send ignored");
                        continue;
                    }
                    self.timers.remove(&id);
                    let step = self.machine.transition(event);
                    self.apply(step);
                }
                Command::Stop { ack } => {
                    self.shutdown();
                    let _ = ack.send(());
                    return;
                }
            }
        }
        self.shutdown();
    }

    fn apply(&mut self, step: Step) {
        for effect in step.effects {
            match effect {
                Effect::Invoke {
                    service: kind,
                    invocation,
                    context,
                } => {
                    if let Some(previous) = self.inflight.take() {
                        previous.abort();
                    }
                    let service = self.machine.service();
                    let loopback = self.loopback.clone();
                    debug!(machine = %self.machine.name(), service = %kind, invocation, "invoking service");
                    let machine = self.machine.name().to_string();
                    self.inflight = Some(tokio::spawn(async move {
                        let call = AssertUnwindSafe(service::invoke(service.as_ref(), kind, &context));
                        let event = match call.catch_unwind().await {
                            Ok(Ok(output)) => Event::Done { invocation, output },
                            Ok(Err(error)) => Event::Failed { invocation, error },
                            Err(_) => {
                                error!(machine = %machine, service = %kind, invocation, "service call panicked");
                                Event::Failed {
                                    invocation,
                                    error: ApiError::new(
                                        ErrorCode::Internal,
                                        format!("{kind} call failed unexpectedly"),
                                    ),
                                }
                            }
                        };
                        if let Some(tx) = loopback.upgrade() {
                            let _ = tx.send(Command::Send { event, ack: None });
                        }
                    }));
                }
                Effect::SendAfter { id, event, delay } => {
                    self.generation += 1;
                    let generation = self.generation;
                    let loopback = self.loopback.clone();
                    let timer_id = id.clone();
                    let deadline = time::Instant::now() + delay;
                    let task = tokio::spawn(async move {
                        time::sleep_until(deadline).await;
                        if let Some(tx) = loopback.upgrade() {
                            let _ = tx.send(Command::Fire {
                                id: timer_id,
                                generation,
                                event,
                            });
                        }
                    });
                    if let Some(previous) = self.timers.insert(id.clone(), DelayedSend { generation, task }) {
                        previous.task.abort();
                        debug!(machine = %self.machine.name(), timer = %id, generation, "delayed send re-armed");
                    }
                }
                Effect::CancelDelayed { id } => {
                    if let Some(previous) = self.timers.remove(&id) {
                        previous.task.abort();
                        debug!(machine = %self.machine.name(), timer = %id, "delayed send cancelled");
                    }
                }
            }
        }

        let snapshot = self.machine.snapshot();
        self.snapshots.send_if_modified(|current| {
            if *current == snapshot {
                return false;
            }
            *current = snapshot;
            true
        });
    }

    fn shutdown(&mut self) {
        for (_, pending) in self.timers.drain() {
            pending.task.abort();
        }
        if let Some(task) = self.inflight.take() {
            task.abort();
        }
        self.commands.close();
        info!(machine = %self.machine.name(), id = %self.machine.id(), state = %self.machine.state(), "machine stopped");
    }
}

#[cfg(test)]
#[path = "tests/interpreter_tests.rs"]
mod tests;
