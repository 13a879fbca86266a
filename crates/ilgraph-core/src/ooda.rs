//! The observe → orient → decide → act cycle.
//!
//! One call to [`ControlCycle::run`] is one tick. It always runs all four
//! phases, then the invariant check, then the narrative refresh, publishing
//! events in that order.

use crate::config::EngineConfig;
use crate::derivation::{self, complexity_for, glow, is_healthy, ledger_mass, thickness};
use crate::error::TopologyResult;
use crate::events::{EventBus, TopologyEvent};
use crate::invariants::{InvariantEngine, NewViolation};
use crate::state::GraphState;
use crate::types::{Complexity, CorridorStatus, LedgerDomain, Observation, OodaPhase};
use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::BTreeMap;
use tracing::debug;
use uuid::Uuid;

pub const LATENCY_METRIC: &str = "latency_ms";

/// A corridor status transition made by the decide phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusChange {
    pub corridor_id: String,
    pub connector_id: String,
    pub old_status: CorridorStatus,
    pub new_status: CorridorStatus,
}

/// What one tick did.
#[derive(Debug, Clone, Default)]
pub struct TickReport {
    pub cycle: u64,
    pub observations: usize,
    pub status_changes: Vec<StatusChange>,
    pub new_violations: Vec<NewViolation>,
}

pub struct ControlCycle {
    rng: StdRng,
}

impl ControlCycle {
    pub fn new(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self { rng }
    }

    pub fn run(
        &mut self,
        state: &mut GraphState,
        bus: &mut EventBus,
        invariants: &mut InvariantEngine,
        config: &EngineConfig,
        now: DateTime<Utc>,
    ) -> TopologyResult<TickReport> {
        let observations = self.observe(state, bus, config, now)?;
        orient(state, bus);
        let status_changes = decide(state, bus);
        act(state, bus, config);

        let new_violations = invariants.evaluate(state, now);
        for violation in &new_violations {
            bus.publish(TopologyEvent::InvariantViolated {
                invariant_id: violation.invariant_id.clone(),
                name: violation.name.clone(),
            });
        }

        let violated = invariants.violations().len();
        refresh_narrative(state, bus, violated, now);

        let cycle = state.ooda().cycles_completed;
        debug!(
            cycle,
            observations,
            status_changes = status_changes.len(),
            new_violations = new_violations.len(),
            "Control cycle complete"
        );

        Ok(TickReport {
            cycle,
            observations,
            status_changes,
            new_violations,
        })
    }

    fn observe(
        &mut self,
        state: &mut GraphState,
        bus: &mut EventBus,
        config: &EngineConfig,
        now: DateTime<Utc>,
    ) -> TopologyResult<usize> {
        // A tick always starts at observe, even after an aborted one.
        enter_phase(state, bus, OodaPhase::Observe);

        let mut recorded = Vec::new();
        for connector_id in state.connector_ids() {
            if !self.rng.gen_bool(config.observation_probability) {
                continue;
            }
            let Some(connector) = state.connector(&connector_id) else {
                continue;
            };

            let base = connector.latency_ms as f64;
            let observation = Observation {
                id: Uuid::new_v4().to_string(),
                metric: LATENCY_METRIC.to_string(),
                value: (base * self.rng.gen_range(0.8..=1.2)).round(),
                confidence: self.rng.gen_range(0.7..=1.0),
                observed_at: now,
            };

            record_observation(state, bus, &connector_id, observation.clone(), config)?;
            recorded.push(format!("{} {}ms", connector_id, observation.value));
        }

        let summary = if recorded.is_empty() {
            "No new observations".to_string()
        } else {
            format!(
                "Recorded {} latency observation(s): {}",
                recorded.len(),
                recorded.join(", ")
            )
        };
        state.ooda_mut().observe_summary = summary;
        Ok(recorded.len())
    }
}

/// Store an observation and announce it.
pub(crate) fn record_observation(
    state: &mut GraphState,
    bus: &mut EventBus,
    connector_id: &str,
    observation: Observation,
    config: &EngineConfig,
) -> TopologyResult<()> {
    let event = TopologyEvent::ObservationRecorded {
        connector_id: connector_id.to_string(),
        observation_id: observation.id.clone(),
        metric: observation.metric.clone(),
        value: observation.value,
    };
    state.push_observation(
        connector_id,
        observation,
        config.max_observations_per_connector,
    )?;
    bus.publish(event);
    Ok(())
}

fn enter_phase(state: &mut GraphState, bus: &mut EventBus, phase: OodaPhase) {
    state.ooda_mut().phase = phase;
    debug!(phase = phase.name(), "OODA phase");
    bus.publish(TopologyEvent::OodaPhaseChanged { phase });
}

/// Step to the successor of the current phase.
fn advance_phase(state: &mut GraphState, bus: &mut EventBus) {
    let phase = state.ooda().phase.next();
    enter_phase(state, bus, phase);
}

fn orient(state: &mut GraphState, bus: &mut EventBus) {
    advance_phase(state, bus);

    let mut by_domain: BTreeMap<LedgerDomain, usize> = BTreeMap::new();
    for ledger in state.ledgers() {
        *by_domain.entry(ledger.domain).or_insert(0) += 1;
    }
    let domains = by_domain
        .iter()
        .map(|(domain, count)| format!("{} {}", domain.name(), count))
        .collect::<Vec<_>>()
        .join(", ");

    let healthy = state.connectors().filter(|c| is_healthy(c)).count();
    let risky = state.connector_count() - healthy;

    state.ooda_mut().orient_summary = format!(
        "Ledgers by domain: {domains}. Connectors: {healthy} healthy, {risky} risky."
    );
}

fn decide(state: &mut GraphState, bus: &mut EventBus) -> Vec<StatusChange> {
    advance_phase(state, bus);

    let decisions: BTreeMap<String, Option<CorridorStatus>> = state
        .connectors()
        .map(|connector| (connector.id.clone(), derivation::decide_status(connector)))
        .collect();

    let mut changes = Vec::new();
    for corridor in state.corridors_mut() {
        let Some(Some(next)) = decisions.get(&corridor.connector_id) else {
            continue;
        };
        if corridor.status != *next {
            changes.push(StatusChange {
                corridor_id: corridor.id.clone(),
                connector_id: corridor.connector_id.clone(),
                old_status: corridor.status,
                new_status: *next,
            });
            corridor.status = *next;
        }
    }

    for change in &changes {
        bus.publish(TopologyEvent::CorridorStatusChanged {
            corridor_id: change.corridor_id.clone(),
            connector_id: change.connector_id.clone(),
            old_status: change.old_status,
            new_status: change.new_status,
        });
    }

    state.ooda_mut().decide_summary = if changes.is_empty() {
        "All corridor statuses unchanged".to_string()
    } else {
        let described = changes
            .iter()
            .map(|c| format!("{} {}→{}", c.connector_id, c.old_status, c.new_status))
            .collect::<Vec<_>>()
            .join(", ");
        format!("{} corridor status change(s): {described}", changes.len())
    };
    changes
}

fn act(state: &mut GraphState, bus: &mut EventBus, config: &EngineConfig) {
    advance_phase(state, bus);

    let visuals: BTreeMap<String, _> = state
        .connectors()
        .map(|connector| {
            (
                connector.id.clone(),
                (
                    thickness(connector.liquidity_depth, config.thickness_reference_depth),
                    glow(
                        connector.trust_score,
                        connector.success_rate,
                        config.default_success_rate,
                    ),
                    connector.risk_tags.clone(),
                    connector.success_rate,
                ),
            )
        })
        .collect();

    let mut corridors_refreshed = 0;
    for corridor in state.corridors_mut() {
        if let Some((thickness, glow, risk_fog, success_rate)) = visuals.get(&corridor.connector_id)
        {
            corridor.thickness = *thickness;
            corridor.glow = *glow;
            corridor.risk_fog = risk_fog.clone();
            corridor.success_rate = *success_rate;
            corridors_refreshed += 1;
        }
    }

    let masses: BTreeMap<String, f64> = state
        .ledgers()
        .map(|ledger| {
            (
                ledger.id.clone(),
                ledger_mass(
                    config.mass_base,
                    config.mass_per_connector,
                    state.incident_connectors(&ledger.id),
                ),
            )
        })
        .collect();

    let mut mass_changes = Vec::new();
    for ledger in state.ledgers_mut() {
        if let Some(mass) = masses.get(&ledger.id) {
            if (ledger.mass - mass).abs() > f64::EPSILON {
                ledger.mass = *mass;
                mass_changes.push((ledger.id.clone(), *mass));
            }
        }
    }

    for (ledger_id, mass) in &mass_changes {
        bus.publish(TopologyEvent::LedgerUpdated {
            ledger_id: ledger_id.clone(),
            mass: *mass,
        });
    }

    state.ooda_mut().act_summary = format!(
        "Refreshed {corridors_refreshed} corridor(s); {} ledger mass update(s)",
        mass_changes.len()
    );
}

fn refresh_narrative(
    state: &mut GraphState,
    bus: &mut EventBus,
    violated_invariants: usize,
    now: DateTime<Utc>,
) {
    let total = state.corridor_count();
    let active = state
        .corridors()
        .filter(|c| c.status == CorridorStatus::Active)
        .count();
    let average_trust = state.average_trust();
    let complexity = complexity_for(average_trust);

    let mut summary = format!(
        "{active} of {total} corridors can carry value right now. \
         Average connector trust is {average_trust:.2}, so the network is {} to reason about.",
        match complexity {
            Complexity::Simple => "simple",
            Complexity::Moderate => "moderately hard",
            Complexity::Complex => "complex",
        }
    );
    if violated_invariants > 0 {
        summary.push_str(&format!(
            " {violated_invariants} invariant(s) are currently violated."
        ));
    }

    let ooda = state.ooda_mut();
    ooda.feynman_summary = summary;
    ooda.complexity = complexity;
    ooda.cycles_completed += 1;
    ooda.last_cycle_at = Some(now);

    bus.publish(TopologyEvent::NarrativeUpdated {
        active_corridors: active,
        total_corridors: total,
        complexity,
    });
}
