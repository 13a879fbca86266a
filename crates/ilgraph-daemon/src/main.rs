//! ilgraphd - Interledger topology daemon
//!
//! Hosts a topology engine in an [`EngineService`], runs the OODA control
//! loop on a timer, and logs the events it publishes until interrupted or
//! until a tick budget is spent.

use anyhow::Context;
use clap::Parser;
use ilgraph_core::{EngineService, EventEnvelope, TopologyEngine, TopologyEvent};
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod config;

use config::{DaemonConfig, LoggingConfig};

/// ilgraphd CLI
#[derive(Parser)]
#[command(name = "ilgraphd")]
#[command(about = "Interledger topology daemon - runs the OODA control loop", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "ILGRAPH_CONFIG")]
    config: Option<String>,

    /// Control loop period in milliseconds
    #[arg(short, long)]
    interval_ms: Option<u64>,

    /// Exit after this many ticks
    #[arg(long)]
    ticks: Option<u64>,

    /// Log level
    #[arg(long, env = "ILGRAPH_LOG_LEVEL")]
    log_level: Option<String>,

    /// Enable JSON logging
    #[arg(long, env = "ILGRAPH_LOG_JSON")]
    json: bool,

    /// Seed for the observe phase
    #[arg(long)]
    seed: Option<u64>,
}

impl Cli {
    fn apply(&self, config: &mut DaemonConfig) {
        if let Some(interval_ms) = self.interval_ms {
            config.engine.tick_interval_ms = interval_ms;
        }
        if let Some(ticks) = self.ticks {
            config.control.max_ticks = Some(ticks);
            config.control.autostart = true;
        }
        if let Some(level) = &self.log_level {
            config.logging.level = level.clone();
        }
        if self.json {
            config.logging.json = true;
        }
        if let Some(seed) = self.seed {
            config.engine.rng_seed = Some(seed);
        }
    }
}

fn init_tracing(logging: &LoggingConfig) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| logging.level.clone().into());

    if logging.json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config =
        DaemonConfig::load(cli.config.as_deref()).context("failed to load configuration")?;
    cli.apply(&mut config);

    init_tracing(&config.logging);

    let engine =
        TopologyEngine::new(config.engine.clone()).context("invalid engine configuration")?;
    info!(
        version = env!("CARGO_PKG_VERSION"),
        hub = %config.engine.hub_ledger,
        interval_ms = config.engine.tick_interval_ms,
        ledgers = engine.ledgers().len(),
        corridors = engine.corridors().len(),
        "ilgraphd starting"
    );

    let handle = EngineService::spawn(engine);
    let logger = tokio::spawn(log_events(
        handle.subscribe().await?,
        config.logging.all_events,
    ));
    let budget = handle.subscribe().await?;

    if config.control.autostart {
        handle.start_loop(config.engine.tick_interval_ms).await?;
    } else {
        info!("Control loop not started (control.autostart = false)");
    }

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result.context("failed to listen for interrupt")?;
            info!("Interrupt received");
        }
        _ = wait_for_ticks(budget, config.control.max_ticks) => {
            info!("Tick budget reached");
        }
    }

    handle.stop_loop().await?;
    let engine = handle.shutdown().await?;
    logger.abort();

    info!(
        cycles = engine.ooda().cycles_completed,
        violations = ?engine.violations(),
        narrative = %engine.narrative(),
        "ilgraphd stopped"
    );
    Ok(())
}

/// Resolves once `max_ticks` narrative refreshes have been seen; never when
/// there is no budget.
async fn wait_for_ticks(mut events: broadcast::Receiver<EventEnvelope>, max_ticks: Option<u64>) {
    let Some(max_ticks) = max_ticks else {
        return std::future::pending().await;
    };

    let mut completed = 0;
    while completed < max_ticks {
        match events.recv().await {
            Ok(envelope) => {
                if matches!(envelope.event, TopologyEvent::NarrativeUpdated { .. }) {
                    completed += 1;
                }
            }
            Err(RecvError::Lagged(skipped)) => {
                warn!(skipped, "Tick counter lagged behind the event stream");
            }
            Err(RecvError::Closed) => return,
        }
    }
}

async fn log_events(mut events: broadcast::Receiver<EventEnvelope>, all_events: bool) {
    loop {
        let envelope = match events.recv().await {
            Ok(envelope) => envelope,
            Err(RecvError::Lagged(skipped)) => {
                warn!(skipped, "Event logger lagged");
                continue;
            }
            Err(RecvError::Closed) => return,
        };

        match &envelope.event {
            TopologyEvent::CorridorStatusChanged {
                corridor_id,
                old_status,
                new_status,
                ..
            } => info!(
                sequence = envelope.sequence,
                corridor_id = %corridor_id,
                from = %old_status,
                to = %new_status,
                "Corridor status changed"
            ),
            TopologyEvent::NarrativeUpdated {
                active_corridors,
                total_corridors,
                complexity,
            } => info!(
                sequence = envelope.sequence,
                active_corridors,
                total_corridors,
                complexity = ?complexity,
                "Tick complete"
            ),
            _ if all_events => match envelope.to_json() {
                Ok(payload) => info!(kind = envelope.kind(), %payload, "Topology event"),
                Err(e) => warn!(error = %e, kind = envelope.kind(), "Failed to encode event"),
            },
            _ => debug!(sequence = envelope.sequence, kind = envelope.kind(), "Topology event"),
        }
    }
}
