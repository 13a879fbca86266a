//! Declarative graph invariants with edge-triggered violation detection.
//!
//! A predicate returns the ids of the entities breaking it; an empty list
//! means the invariant holds. `violated` is sticky: it only flips back once
//! the predicate holds again, and only the not-violated -> violated edge is
//! reported.

use crate::state::GraphState;
use crate::types::{CorridorStatus, LiquidityStatus, RiskTag, SettlementMechanism};
use chrono::{DateTime, Utc};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{error, info, warn};

pub type Predicate = Arc<dyn Fn(&GraphState) -> Vec<String> + Send + Sync>;

pub const CUSTODIAL_API: &str = "custodial-api";
pub const BRIDGE_EVIDENCE: &str = "bridge-evidence";
pub const LOW_TRUST_TAGGED: &str = "low-trust-tagged";
pub const ACTIVE_SUCCESS_RATE: &str = "active-success-rate";

/// Trust below which a connector must disclose at least one risk.
pub const RISK_DISCLOSURE_TRUST: f64 = 0.8;

#[derive(Clone)]
pub struct Invariant {
    pub id: String,
    pub name: String,
    pub description: String,
    predicate: Predicate,
    pub violated: bool,
    pub last_checked: Option<DateTime<Utc>>,
    /// Offending entity ids from the last successful evaluation
    pub offenders: Vec<String>,
}

impl Invariant {
    pub fn new<F>(
        id: impl Into<String>,
        name: impl Into<String>,
        description: impl Into<String>,
        predicate: F,
    ) -> Self
    where
        F: Fn(&GraphState) -> Vec<String> + Send + Sync + 'static,
    {
        Self {
            id: id.into(),
            name: name.into(),
            description: description.into(),
            predicate: Arc::new(predicate),
            violated: false,
            last_checked: None,
            offenders: Vec::new(),
        }
    }
}

impl std::fmt::Debug for Invariant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Invariant")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("violated", &self.violated)
            .field("last_checked", &self.last_checked)
            .field("offenders", &self.offenders)
            .finish()
    }
}

/// Reported when an invariant goes from holding to violated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewViolation {
    pub invariant_id: String,
    pub name: String,
    pub offenders: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct InvariantEngine {
    invariants: Vec<Invariant>,
}

impl InvariantEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Engine preloaded with the four topology invariants.
    pub fn with_builtins() -> Self {
        let mut engine = Self::new();
        for invariant in builtin_invariants() {
            engine.register(invariant);
        }
        engine
    }

    /// Add an invariant, replacing any with the same id.
    pub fn register(&mut self, invariant: Invariant) {
        if let Some(existing) = self.invariants.iter_mut().find(|i| i.id == invariant.id) {
            *existing = invariant;
        } else {
            self.invariants.push(invariant);
        }
    }

    pub fn invariants(&self) -> &[Invariant] {
        &self.invariants
    }

    pub fn get(&self, id: &str) -> Option<&Invariant> {
        self.invariants.iter().find(|i| i.id == id)
    }

    /// Names of currently violated invariants.
    pub fn violations(&self) -> Vec<String> {
        self.invariants
            .iter()
            .filter(|i| i.violated)
            .map(|i| i.name.clone())
            .collect()
    }

    /// Evaluate every invariant and return the ones that just became violated.
    ///
    /// A panicking predicate is logged and skipped: its flag keeps its previous
    /// value, `last_checked` still advances, and the others are evaluated.
    pub fn evaluate(&mut self, state: &GraphState, now: DateTime<Utc>) -> Vec<NewViolation> {
        let mut newly_violated = Vec::new();

        for invariant in &mut self.invariants {
            invariant.last_checked = Some(now);

            let predicate = invariant.predicate.clone();
            let offenders = match panic::catch_unwind(AssertUnwindSafe(|| predicate(state))) {
                Ok(offenders) => offenders,
                Err(_) => {
                    error!(
                        invariant_id = %invariant.id,
                        "Invariant predicate panicked; keeping previous verdict"
                    );
                    continue;
                }
            };

            let violated = !offenders.is_empty();
            if violated && !invariant.violated {
                warn!(
                    invariant_id = %invariant.id,
                    offenders = ?offenders,
                    "Invariant violated"
                );
                newly_violated.push(NewViolation {
                    invariant_id: invariant.id.clone(),
                    name: invariant.name.clone(),
                    offenders: offenders.clone(),
                });
            } else if !violated && invariant.violated {
                info!(invariant_id = %invariant.id, "Invariant restored");
            }

            invariant.violated = violated;
            invariant.offenders = offenders;
        }

        newly_violated
    }
}

pub fn builtin_invariants() -> Vec<Invariant> {
    vec![
        Invariant::new(
            CUSTODIAL_API,
            "API settlement is custodial",
            "Every connector settling through an API must carry the custodial risk tag.",
            |state| {
                state
                    .connectors()
                    .filter(|c| c.settlement == SettlementMechanism::Api)
                    .filter(|c| !c.has_risk(RiskTag::Custodial))
                    .map(|c| c.id.clone())
                    .collect()
            },
        ),
        Invariant::new(
            BRIDGE_EVIDENCE,
            "Live bridges are evidenced",
            "Every live bridge connector must have a verified claim or a recorded observation.",
            |state| {
                state
                    .connectors()
                    .filter(|c| {
                        c.settlement == SettlementMechanism::Bridge
                            && c.liquidity == LiquidityStatus::Live
                    })
                    .filter(|c| !c.has_verified_claim() && c.observations.is_empty())
                    .map(|c| c.id.clone())
                    .collect()
            },
        ),
        Invariant::new(
            LOW_TRUST_TAGGED,
            "Low trust discloses risk",
            "Every connector with trust below 0.8 must carry at least one risk tag.",
            |state| {
                state
                    .connectors()
                    .filter(|c| c.trust_score < RISK_DISCLOSURE_TRUST && c.risk_tags.is_empty())
                    .map(|c| c.id.clone())
                    .collect()
            },
        ),
        Invariant::new(
            ACTIVE_SUCCESS_RATE,
            "Active corridors are falsifiable",
            "Every active corridor must expose a defined success rate.",
            |state| {
                state
                    .corridors()
                    .filter(|c| c.status == CorridorStatus::Active && c.success_rate.is_none())
                    .map(|c| c.id.clone())
                    .collect()
            },
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::seed::SeedTopology;
    use crate::types::ConnectorPatch;

    fn seeded() -> GraphState {
        GraphState::from_seed(SeedTopology::interledger(), &EngineConfig::default()).unwrap()
    }

    #[test]
    fn seed_topology_satisfies_builtins() {
        let state = seeded();
        let mut engine = InvariantEngine::with_builtins();
        assert!(engine.evaluate(&state, Utc::now()).is_empty());
        assert!(engine.violations().is_empty());
        assert_eq!(engine.invariants().len(), 4);
    }

    #[test]
    fn violation_fires_once_while_it_persists() {
        let mut state = seeded();
        state
            .apply_connector_patch(
                "xrpl-xlm",
                &ConnectorPatch {
                    trust_score: Some(0.6),
                    ..Default::default()
                },
            )
            .unwrap();

        let mut engine = InvariantEngine::with_builtins();
        let first = engine.evaluate(&state, Utc::now());
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].invariant_id, LOW_TRUST_TAGGED);
        assert_eq!(first[0].offenders, vec!["xrpl-xlm".to_string()]);

        for _ in 0..4 {
            assert!(engine.evaluate(&state, Utc::now()).is_empty());
        }
        assert!(engine.get(LOW_TRUST_TAGGED).unwrap().violated);
        assert_eq!(engine.violations(), vec!["Low trust discloses risk".to_string()]);
    }

    #[test]
    fn restored_invariant_can_fire_again() {
        let mut state = seeded();
        let mut engine = InvariantEngine::with_builtins();

        state
            .apply_connector_patch("xrpl-xlm", &ConnectorPatch::trust(0.6))
            .unwrap();
        assert_eq!(engine.evaluate(&state, Utc::now()).len(), 1);

        state
            .apply_connector_patch("xrpl-xlm", &ConnectorPatch::trust(0.9))
            .unwrap();
        assert!(engine.evaluate(&state, Utc::now()).is_empty());
        assert!(!engine.get(LOW_TRUST_TAGGED).unwrap().violated);

        state
            .apply_connector_patch("xrpl-xlm", &ConnectorPatch::trust(0.6))
            .unwrap();
        assert_eq!(engine.evaluate(&state, Utc::now()).len(), 1);
    }

    #[test]
    fn custodial_tag_required_for_api_settlement() {
        let mut state = seeded();
        state
            .apply_connector_patch(
                "ach-xrpl",
                &ConnectorPatch {
                    risk_tags: Some([RiskTag::Regulatory].into_iter().collect()),
                    ..Default::default()
                },
            )
            .unwrap();
        let mut engine = InvariantEngine::with_builtins();
        let fired = engine.evaluate(&state, Utc::now());
        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].invariant_id, CUSTODIAL_API);
    }

    #[test]
    fn panicking_predicate_is_isolated() {
        let state = seeded();
        let mut engine = InvariantEngine::with_builtins();
        engine.register(Invariant::new("broken", "Broken", "always panics", |_| {
            panic!("predicate bug")
        }));
        engine.register(Invariant::new("always", "Always violated", "", |_| {
            vec!["graph".to_string()]
        }));

        let checked_at = Utc::now();
        let fired = engine.evaluate(&state, checked_at);
        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].invariant_id, "always");

        let broken = engine.get("broken").unwrap();
        assert!(!broken.violated);
        assert_eq!(broken.last_checked, Some(checked_at));
    }

    #[test]
    fn last_checked_advances_every_evaluation() {
        let state = seeded();
        let mut engine = InvariantEngine::with_builtins();
        let first = Utc::now();
        engine.evaluate(&state, first);
        let second = first + chrono::Duration::seconds(10);
        engine.evaluate(&state, second);
        assert!(engine
            .invariants()
            .iter()
            .all(|i| i.last_checked == Some(second)));
    }
}
