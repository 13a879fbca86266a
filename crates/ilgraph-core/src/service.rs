//! Async owner of a [`TopologyEngine`] with an optional periodic tick.
//!
//! One tokio task owns the engine. Every mutation and query is a command sent
//! over an mpsc channel, so a tick never interleaves with another operation.

use crate::engine::TopologyEngine;
use crate::error::{TopologyError, TopologyResult};
use crate::events::{panic_message, EventEnvelope, TopologyEvent};
use crate::ooda::TickReport;
use crate::types::{ConnectorPatch, Lens, LensConfig, LensConfigPatch, Observation, Route, RouteId};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Duration, Instant, Interval, MissedTickBehavior};

const COMMAND_CHANNEL_CAPACITY: usize = 64;

type Reply<T> = oneshot::Sender<T>;
type QueryFn = Box<dyn FnOnce(&TopologyEngine) + Send>;

enum EngineCommand {
    StartLoop {
        interval_ms: u64,
        reply: Reply<TopologyResult<bool>>,
    },
    StopLoop {
        reply: Reply<bool>,
    },
    LoopInterval {
        reply: Reply<Option<u64>>,
    },
    Tick {
        reply: Reply<TopologyResult<TickReport>>,
    },
    CalculateRoute {
        from: String,
        to: String,
        amount: f64,
        reply: Reply<Option<Route>>,
    },
    ClearRoute {
        reply: Reply<Option<RouteId>>,
    },
    SetActiveLens {
        lens: Lens,
        reply: Reply<()>,
    },
    UpdateLensConfig {
        lens: Lens,
        patch: LensConfigPatch,
        reply: Reply<LensConfig>,
    },
    UpdateConnector {
        connector_id: String,
        patch: ConnectorPatch,
        reply: Reply<TopologyResult<()>>,
    },
    RecordObservation {
        connector_id: String,
        metric: String,
        value: f64,
        confidence: f64,
        reply: Reply<TopologyResult<Observation>>,
    },
    VerifyClaim {
        connector_id: String,
        claim_id: String,
        evidence_ref: Option<String>,
        reply: Reply<TopologyResult<bool>>,
    },
    Query(QueryFn),
    Shutdown {
        reply: Reply<TopologyEngine>,
    },
}

/// Spawns the task that owns the engine.
pub struct EngineService;

impl EngineService {
    /// Must be called inside a tokio runtime.
    pub fn spawn(engine: TopologyEngine) -> EngineHandle {
        let (tx, rx) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);
        let task = tokio::spawn(run(engine, rx));
        tracing::debug!("Engine service spawned");
        EngineHandle {
            tx,
            task: Arc::new(Mutex::new(Some(task))),
        }
    }
}

/// Cloneable client for the engine task.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineCommand>,
    task: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl EngineHandle {
    async fn request<T>(&self, build: impl FnOnce(Reply<T>) -> EngineCommand) -> TopologyResult<T> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(build(reply))
            .await
            .map_err(|_| unavailable())?;
        rx.await.map_err(|_| {
            TopologyError::ServiceUnavailable("request aborted before a reply was sent".to_string())
        })
    }

    /// Arm the periodic tick. Returns `false` when a loop is already running,
    /// in which case nothing changes.
    pub async fn start_loop(&self, interval_ms: u64) -> TopologyResult<bool> {
        self.request(|reply| EngineCommand::StartLoop { interval_ms, reply })
            .await?
    }

    /// Disarm the periodic tick. Returns `false` when none was running.
    pub async fn stop_loop(&self) -> TopologyResult<bool> {
        self.request(|reply| EngineCommand::StopLoop { reply }).await
    }

    pub async fn is_running(&self) -> TopologyResult<bool> {
        Ok(self.loop_interval().await?.is_some())
    }

    /// Period of the running loop in milliseconds.
    pub async fn loop_interval(&self) -> TopologyResult<Option<u64>> {
        self.request(|reply| EngineCommand::LoopInterval { reply })
            .await
    }

    pub async fn tick(&self) -> TopologyResult<TickReport> {
        self.request(|reply| EngineCommand::Tick { reply }).await?
    }

    pub async fn calculate_route(
        &self,
        from: impl Into<String>,
        to: impl Into<String>,
        amount: f64,
    ) -> TopologyResult<Option<Route>> {
        let (from, to) = (from.into(), to.into());
        self.request(|reply| EngineCommand::CalculateRoute {
            from,
            to,
            amount,
            reply,
        })
        .await
    }

    pub async fn clear_route(&self) -> TopologyResult<Option<RouteId>> {
        self.request(|reply| EngineCommand::ClearRoute { reply }).await
    }

    pub async fn set_active_lens(&self, lens: Lens) -> TopologyResult<()> {
        self.request(|reply| EngineCommand::SetActiveLens { lens, reply })
            .await
    }

    pub async fn update_lens_config(
        &self,
        lens: Lens,
        patch: LensConfigPatch,
    ) -> TopologyResult<LensConfig> {
        self.request(|reply| EngineCommand::UpdateLensConfig { lens, patch, reply })
            .await
    }

    pub async fn update_connector(
        &self,
        connector_id: impl Into<String>,
        patch: ConnectorPatch,
    ) -> TopologyResult<()> {
        let connector_id = connector_id.into();
        self.request(|reply| EngineCommand::UpdateConnector {
            connector_id,
            patch,
            reply,
        })
        .await?
    }

    pub async fn record_observation(
        &self,
        connector_id: impl Into<String>,
        metric: impl Into<String>,
        value: f64,
        confidence: f64,
    ) -> TopologyResult<Observation> {
        let (connector_id, metric) = (connector_id.into(), metric.into());
        self.request(|reply| EngineCommand::RecordObservation {
            connector_id,
            metric,
            value,
            confidence,
            reply,
        })
        .await?
    }

    pub async fn verify_claim(
        &self,
        connector_id: impl Into<String>,
        claim_id: impl Into<String>,
        evidence_ref: Option<String>,
    ) -> TopologyResult<bool> {
        let (connector_id, claim_id) = (connector_id.into(), claim_id.into());
        self.request(|reply| EngineCommand::VerifyClaim {
            connector_id,
            claim_id,
            evidence_ref,
            reply,
        })
        .await?
    }

    /// Run `f` against the engine between commands.
    pub async fn query<R, F>(&self, f: F) -> TopologyResult<R>
    where
        R: Send + 'static,
        F: FnOnce(&TopologyEngine) -> R + Send + 'static,
    {
        self.request(|reply| {
            EngineCommand::Query(Box::new(move |engine| {
                let _ = reply.send(f(engine));
            }))
        })
        .await
    }

    pub async fn subscribe(&self) -> TopologyResult<broadcast::Receiver<EventEnvelope>> {
        self.query(|engine| engine.subscribe_stream()).await
    }

    /// Stop the task and take the engine back. Other handles become
    /// unavailable.
    pub async fn shutdown(self) -> TopologyResult<TopologyEngine> {
        let engine = self
            .request(|reply| EngineCommand::Shutdown { reply })
            .await?;
        let task = self
            .task
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(task) = task {
            let _ = task.await;
        }
        Ok(engine)
    }
}

fn unavailable() -> TopologyError {
    TopologyError::ServiceUnavailable("engine task has stopped".to_string())
}

/// A periodic tick and the period it was armed with.
struct LoopTimer {
    interval: Interval,
    interval_ms: u64,
}

enum Step {
    Command(Option<EngineCommand>),
    Tick,
}

async fn next_tick(timer: &mut Option<LoopTimer>) {
    match timer {
        Some(timer) => {
            timer.interval.tick().await;
        }
        None => std::future::pending().await,
    }
}

async fn run(mut engine: TopologyEngine, mut commands: mpsc::Receiver<EngineCommand>) {
    let mut timer: Option<LoopTimer> = None;

    loop {
        // A due tick runs before queued commands.
        let step = tokio::select! {
            biased;
            _ = next_tick(&mut timer) => Step::Tick,
            command = commands.recv() => Step::Command(command),
        };

        match step {
            Step::Tick => match catch_unwind(AssertUnwindSafe(|| engine.tick())) {
                Ok(Ok(_)) => {}
                Ok(Err(e)) => tracing::error!(error = %e, "Scheduled tick failed"),
                Err(payload) => tracing::error!(
                    panic = %panic_message(payload.as_ref()),
                    "Scheduled tick panicked; engine kept"
                ),
            },
            Step::Command(Some(EngineCommand::Shutdown { reply })) => {
                stop(&mut engine, &mut timer);
                tracing::info!("Engine service shut down");
                let _ = reply.send(engine);
                return;
            }
            Step::Command(Some(command)) => {
                // The reply sender is dropped on unwind, so the caller sees an error.
                let dispatched = catch_unwind(AssertUnwindSafe(|| {
                    handle(&mut engine, &mut timer, command)
                }));
                if let Err(payload) = dispatched {
                    tracing::error!(
                        panic = %panic_message(payload.as_ref()),
                        "Engine command panicked; engine kept"
                    );
                }
            }
            Step::Command(None) => break,
        }
    }

    tracing::debug!("All engine handles dropped; service exiting");
}

fn handle(engine: &mut TopologyEngine, timer: &mut Option<LoopTimer>, command: EngineCommand) {
    match command {
        EngineCommand::StartLoop { interval_ms, reply } => {
            let _ = reply.send(start(engine, timer, interval_ms));
        }
        EngineCommand::StopLoop { reply } => {
            let _ = reply.send(stop(engine, timer));
        }
        EngineCommand::LoopInterval { reply } => {
            let _ = reply.send(timer.as_ref().map(|t| t.interval_ms));
        }
        EngineCommand::Tick { reply } => {
            let _ = reply.send(engine.tick());
        }
        EngineCommand::CalculateRoute {
            from,
            to,
            amount,
            reply,
        } => {
            let _ = reply.send(engine.calculate_route(&from, &to, amount));
        }
        EngineCommand::ClearRoute { reply } => {
            let _ = reply.send(engine.clear_route());
        }
        EngineCommand::SetActiveLens { lens, reply } => {
            engine.set_active_lens(lens);
            let _ = reply.send(());
        }
        EngineCommand::UpdateLensConfig { lens, patch, reply } => {
            let _ = reply.send(engine.update_lens_config(lens, patch));
        }
        EngineCommand::UpdateConnector {
            connector_id,
            patch,
            reply,
        } => {
            let _ = reply.send(engine.update_connector(&connector_id, patch));
        }
        EngineCommand::RecordObservation {
            connector_id,
            metric,
            value,
            confidence,
            reply,
        } => {
            let _ = reply.send(engine.record_observation(&connector_id, metric, value, confidence));
        }
        EngineCommand::VerifyClaim {
            connector_id,
            claim_id,
            evidence_ref,
            reply,
        } => {
            let _ = reply.send(engine.verify_claim(&connector_id, &claim_id, evidence_ref));
        }
        EngineCommand::Query(f) => f(engine),
        // Consumed by `run`, which owns the engine.
        EngineCommand::Shutdown { .. } => {}
    }
}

fn start(
    engine: &mut TopologyEngine,
    timer: &mut Option<LoopTimer>,
    interval_ms: u64,
) -> TopologyResult<bool> {
    if interval_ms == 0 {
        return Err(TopologyError::InvalidInterval(interval_ms));
    }
    if timer.is_some() {
        tracing::debug!("Control loop already running");
        return Ok(false);
    }

    let period = Duration::from_millis(interval_ms);
    let mut interval = interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    *timer = Some(LoopTimer {
        interval,
        interval_ms,
    });

    tracing::info!(interval_ms, "Control loop started");
    engine.announce(TopologyEvent::LoopStarted { interval_ms });
    Ok(true)
}

fn stop(engine: &mut TopologyEngine, timer: &mut Option<LoopTimer>) -> bool {
    if timer.take().is_none() {
        return false;
    }
    tracing::info!("Control loop stopped");
    engine.announce(TopologyEvent::LoopStopped);
    true
}
