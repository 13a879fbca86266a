use crate::config::EngineConfig;
use crate::error::{TopologyError, TopologyResult};
use crate::events::{EventBus, EventEnvelope, Subscription, TopologyEvent};
use crate::invariants::{Invariant, InvariantEngine, NewViolation};
use crate::ooda::{self, ControlCycle, TickReport};
use crate::router::TopologyRouter;
use crate::seed::SeedTopology;
use crate::state::GraphState;
use crate::types::{
    Connector, ConnectorPatch, Corridor, Lens, LensConfig, LensConfigPatch, Ledger, Observation,
    OodaPhase, OodaState, Route, RouteId,
};
use chrono::Utc;
use tokio::sync::broadcast;
use tracing::{debug, info};
use uuid::Uuid;

/// Topology engine: graph state, control cycle, router, invariants and bus.
///
/// Owned by the application's composition root and passed by reference;
/// for timer-driven operation hand it to [`crate::service::EngineService`].
pub struct TopologyEngine {
    config: EngineConfig,
    state: GraphState,
    bus: EventBus,
    invariants: InvariantEngine,
    router: TopologyRouter,
    cycle: ControlCycle,
}

impl TopologyEngine {
    /// Engine over the built-in interledger topology.
    pub fn new(config: EngineConfig) -> TopologyResult<Self> {
        Self::with_seed(config, SeedTopology::interledger())
    }

    /// Create an engine over a custom topology.
    pub fn with_seed(config: EngineConfig, seed: SeedTopology) -> TopologyResult<Self> {
        config.validate()?;
        let state = GraphState::from_seed(seed, &config)?;
        if state.ledger(&config.hub_ledger).is_none() {
            return Err(TopologyError::LedgerNotFound(config.hub_ledger.clone()));
        }

        info!(
            ledgers = state.ledger_count(),
            connectors = state.connector_count(),
            hub = %config.hub_ledger,
            "Topology engine initialized"
        );

        Ok(Self {
            bus: EventBus::new(config.event_history_limit),
            invariants: InvariantEngine::with_builtins(),
            router: TopologyRouter::new(config.hub_ledger.clone()),
            cycle: ControlCycle::new(config.rng_seed),
            state,
            config,
        })
    }

    /// Get the engine configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Get the underlying graph state.
    pub fn state(&self) -> &GraphState {
        &self.state
    }

    // ---- queries -------------------------------------------------------

    /// Get all ledgers.
    pub fn ledgers(&self) -> Vec<&Ledger> {
        self.state.ledgers().collect()
    }

    /// Get a ledger by id.
    pub fn ledger(&self, id: &str) -> Option<&Ledger> {
        self.state.ledger(id)
    }

    /// Get all connectors.
    pub fn connectors(&self) -> Vec<&Connector> {
        self.state.connectors().collect()
    }

    /// Get a connector by id.
    pub fn connector(&self, id: &str) -> Option<&Connector> {
        self.state.connector(id)
    }

    /// Get all corridors.
    pub fn corridors(&self) -> Vec<&Corridor> {
        self.state.corridors().collect()
    }

    /// Get a corridor by id.
    pub fn corridor(&self, id: &str) -> Option<&Corridor> {
        self.state.corridor(id)
    }

    /// Get the corridor derived from a connector.
    pub fn corridor_for_connector(&self, connector_id: &str) -> Option<&Corridor> {
        self.state.corridor_for_connector(connector_id)
    }

    /// Get the control cycle state.
    pub fn ooda(&self) -> &OodaState {
        self.state.ooda()
    }

    /// Get the current OODA phase.
    pub fn phase(&self) -> OodaPhase {
        self.state.ooda().phase
    }

    /// Get the latest summary written by a phase.
    pub fn phase_summary(&self, phase: OodaPhase) -> &str {
        self.state.ooda().summary(phase)
    }

    /// Get the plain-language network summary.
    pub fn narrative(&self) -> &str {
        &self.state.ooda().feynman_summary
    }

    /// Get registered invariants.
    pub fn invariants(&self) -> &[Invariant] {
        self.invariants.invariants()
    }

    /// Names of invariants currently violated.
    pub fn violations(&self) -> Vec<String> {
        self.invariants.violations()
    }

    /// Get retained routes, oldest first.
    pub fn routes(&self) -> Vec<&Route> {
        self.state.routes().collect()
    }

    /// Get a retained route by id.
    pub fn route(&self, id: &str) -> Option<&Route> {
        self.state.route(id)
    }

    /// Get the selected route, if any.
    pub fn active_route(&self) -> Option<&Route> {
        self.state.active_route()
    }

    /// Get the active lens.
    pub fn active_lens(&self) -> Lens {
        self.state.active_lens()
    }

    /// Get the configuration for a lens.
    pub fn lens_config(&self, lens: Lens) -> Option<&LensConfig> {
        self.state.lens_config(lens)
    }

    /// Get retained event envelopes, oldest first.
    pub fn event_history(&self) -> Vec<EventEnvelope> {
        self.bus.history().cloned().collect()
    }

    /// Get retained envelopes from `sequence` on.
    pub fn events_since(&self, sequence: u64) -> Vec<EventEnvelope> {
        self.bus.events_since(sequence)
    }

    /// Feed retained history to `handler`. Returns the count replayed.
    pub fn replay<F>(&self, handler: F) -> usize
    where
        F: FnMut(&EventEnvelope),
    {
        self.bus.replay(handler)
    }

    /// Get the event bus.
    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    // ---- subscriptions -------------------------------------------------

    /// Register a synchronous event handler.
    pub fn subscribe<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&EventEnvelope) + Send + Sync + 'static,
    {
        self.bus.subscribe(handler)
    }

    /// Create a broadcast receiver for future events.
    pub fn subscribe_stream(&self) -> broadcast::Receiver<EventEnvelope> {
        self.bus.stream()
    }

    // ---- mutations -----------------------------------------------------

    /// Run one full control cycle.
    pub fn tick(&mut self) -> TopologyResult<TickReport> {
        self.cycle.run(
            &mut self.state,
            &mut self.bus,
            &mut self.invariants,
            &self.config,
            Utc::now(),
        )
    }

    /// Compute, store, and announce a route. `None` when no path exists.
    pub fn calculate_route(&mut self, from: &str, to: &str, amount: f64) -> Option<Route> {
        let Some(route) = self
            .router
            .calculate(&self.state, from, to, amount, Utc::now())
        else {
            debug!(from, to, "No route available");
            return None;
        };

        info!(
            route_id = %route.id,
            from,
            to,
            hops = route.hops.len(),
            fee_bps = route.total_fee_bps,
            "Route calculated"
        );
        if let Some(evicted) = self
            .state
            .insert_route(route.clone(), self.config.max_routes_retained)
        {
            debug!(route_id = %evicted.id, "Oldest route evicted");
        }
        self.bus.publish(TopologyEvent::RouteCalculated {
            route_id: route.id.clone(),
            from: route.from.clone(),
            to: route.to.clone(),
            hops: route.hops.len(),
            total_fee_bps: route.total_fee_bps,
            risk_score: route.risk_score,
        });
        Some(route)
    }

    /// Deselect the active route. History is kept.
    pub fn clear_route(&mut self) -> Option<RouteId> {
        let cleared = self.state.clear_active_route()?;
        self.bus.publish(TopologyEvent::RouteCleared {
            route_id: cleared.clone(),
        });
        Some(cleared)
    }

    /// Switch lenses; announced only on change.
    pub fn set_active_lens(&mut self, lens: Lens) {
        let previous = self.state.set_active_lens(lens);
        if previous != lens {
            self.bus
                .publish(TopologyEvent::LensChanged { lens, previous });
        }
    }

    /// Patch a lens configuration and return the result.
    pub fn update_lens_config(&mut self, lens: Lens, patch: LensConfigPatch) -> LensConfig {
        let updated = self.state.patch_lens_config(lens, &patch);
        self.bus.publish(TopologyEvent::LensConfigUpdated { lens });
        updated
    }

    /// Adjust a seeded connector. Its corridor follows on the next tick.
    pub fn update_connector(
        &mut self,
        connector_id: &str,
        patch: ConnectorPatch,
    ) -> TopologyResult<()> {
        let connector = self.state.apply_connector_patch(connector_id, &patch)?;
        let event = TopologyEvent::ConnectorUpdated {
            connector_id: connector.id.clone(),
            trust_score: connector.trust_score,
            liquidity: connector.liquidity,
        };
        self.bus.publish(event);
        Ok(())
    }

    /// Record externally sourced telemetry for a connector.
    pub fn record_observation(
        &mut self,
        connector_id: &str,
        metric: impl Into<String>,
        value: f64,
        confidence: f64,
    ) -> TopologyResult<Observation> {
        if !(0.0..=1.0).contains(&confidence) {
            return Err(TopologyError::invalid_value(
                "confidence",
                format!("{confidence} is outside [0, 1]"),
            ));
        }
        let observation = Observation {
            id: Uuid::new_v4().to_string(),
            metric: metric.into(),
            value,
            confidence,
            observed_at: Utc::now(),
        };
        ooda::record_observation(
            &mut self.state,
            &mut self.bus,
            connector_id,
            observation.clone(),
            &self.config,
        )?;
        Ok(observation)
    }

    /// Returns `false` when the claim was already verified.
    pub fn verify_claim(
        &mut self,
        connector_id: &str,
        claim_id: &str,
        evidence_ref: Option<String>,
    ) -> TopologyResult<bool> {
        let changed = self
            .state
            .verify_claim(connector_id, claim_id, evidence_ref, Utc::now())?;
        if changed {
            self.bus.publish(TopologyEvent::ClaimVerified {
                connector_id: connector_id.to_string(),
                claim_id: claim_id.to_string(),
            });
        }
        Ok(changed)
    }

    /// Evaluate invariants outside the loop.
    pub fn check_invariants(&mut self) -> Vec<NewViolation> {
        let fired = self.invariants.evaluate(&self.state, Utc::now());
        for violation in &fired {
            self.bus.publish(TopologyEvent::InvariantViolated {
                invariant_id: violation.invariant_id.clone(),
                name: violation.name.clone(),
            });
        }
        fired
    }

    /// Add an invariant, replacing one with the same id.
    pub fn register_invariant(&mut self, invariant: Invariant) {
        self.invariants.register(invariant);
    }

    pub(crate) fn announce(&mut self, event: TopologyEvent) {
        self.bus.publish(event);
    }
}
