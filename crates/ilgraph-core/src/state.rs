//! Graph state container: the single owner of every entity.
//!
//! Collections are keyed by string handle and ordered, so iteration (and
//! therefore event emission) is deterministic. Relationships are id
//! references only.

use crate::config::EngineConfig;
use crate::derivation::{corridor_for, corridor_id};
use crate::error::{TopologyError, TopologyResult};
use crate::seed::SeedTopology;
use crate::types::{
    Connector, ConnectorPatch, Corridor, CorridorStatus, Lens, LensConfig, LensConfigPatch,
    Ledger, Observation, OodaState, Route, RouteId,
};
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap, VecDeque};

/// Highest fee a connector may charge: the whole amount.
pub const MAX_FEE_BPS: u32 = 10_000;

/// Longest settlement latency a connector may report: one day.
pub const MAX_LATENCY_MS: u64 = 86_400_000;

#[derive(Debug, Clone)]
pub struct GraphState {
    ledgers: BTreeMap<String, Ledger>,
    connectors: BTreeMap<String, Connector>,
    corridors: BTreeMap<String, Corridor>,
    routes: HashMap<RouteId, Route>,
    route_order: VecDeque<RouteId>,
    active_route: Option<RouteId>,
    ooda: OodaState,
    active_lens: Lens,
    lens_configs: BTreeMap<Lens, LensConfig>,
}

impl GraphState {
    /// Load a topology and derive one corridor per connector.
    pub fn from_seed(seed: SeedTopology, config: &EngineConfig) -> TopologyResult<Self> {
        let mut ledgers = BTreeMap::new();
        for ledger in seed.ledgers {
            if ledgers.contains_key(&ledger.id) {
                return Err(TopologyError::InvalidConfig(format!(
                    "duplicate ledger id '{}'",
                    ledger.id
                )));
            }
            ledgers.insert(ledger.id.clone(), ledger);
        }

        let mut connectors = BTreeMap::new();
        let mut corridors = BTreeMap::new();
        for connector in seed.connectors {
            for endpoint in [&connector.from_ledger, &connector.to_ledger] {
                if !ledgers.contains_key(endpoint) {
                    return Err(TopologyError::LedgerNotFound(endpoint.clone()));
                }
            }
            if connectors.contains_key(&connector.id) {
                return Err(TopologyError::InvalidConfig(format!(
                    "duplicate connector id '{}'",
                    connector.id
                )));
            }
            check_fee_bps(connector.fee_bps)?;
            check_latency_ms(connector.latency_ms)?;
            let corridor = corridor_for(&connector, config);
            corridors.insert(corridor.id.clone(), corridor);
            connectors.insert(connector.id.clone(), connector);
        }

        let lens_configs = Lens::ALL
            .iter()
            .map(|lens| (*lens, LensConfig::for_lens(*lens)))
            .collect();

        Ok(Self {
            ledgers,
            connectors,
            corridors,
            routes: HashMap::new(),
            route_order: VecDeque::new(),
            active_route: None,
            ooda: OodaState::default(),
            active_lens: Lens::Domain,
            lens_configs,
        })
    }

    // ---- queries -------------------------------------------------------

    /// Get all ledgers in id order.
    pub fn ledgers(&self) -> impl Iterator<Item = &Ledger> {
        self.ledgers.values()
    }

    /// Get a ledger by id.
    pub fn ledger(&self, id: &str) -> Option<&Ledger> {
        self.ledgers.get(id)
    }

    /// Get all connectors in id order.
    pub fn connectors(&self) -> impl Iterator<Item = &Connector> {
        self.connectors.values()
    }

    /// Get a connector by id.
    pub fn connector(&self, id: &str) -> Option<&Connector> {
        self.connectors.get(id)
    }

    /// Get all corridors in id order.
    pub fn corridors(&self) -> impl Iterator<Item = &Corridor> {
        self.corridors.values()
    }

    /// Get a corridor by id.
    pub fn corridor(&self, id: &str) -> Option<&Corridor> {
        self.corridors.get(id)
    }

    /// Get the corridor derived from a connector.
    pub fn corridor_for_connector(&self, connector_id: &str) -> Option<&Corridor> {
        self.corridors.get(&corridor_id(connector_id))
    }

    /// First active corridor from `from` to `to`, in id order.
    pub fn active_corridor(&self, from: &str, to: &str) -> Option<&Corridor> {
        self.corridors.values().find(|corridor| {
            corridor.status == CorridorStatus::Active
                && corridor.from_ledger == from
                && corridor.to_ledger == to
        })
    }

    /// Count connectors with `ledger_id` at either end.
    pub fn incident_connectors(&self, ledger_id: &str) -> usize {
        self.connectors
            .values()
            .filter(|connector| connector.is_incident_to(ledger_id))
            .count()
    }

    /// Get the number of ledgers.
    pub fn ledger_count(&self) -> usize {
        self.ledgers.len()
    }

    /// Get the number of connectors.
    pub fn connector_count(&self) -> usize {
        self.connectors.len()
    }

    /// Get the number of corridors.
    pub fn corridor_count(&self) -> usize {
        self.corridors.len()
    }

    /// Mean connector trust; 0 with no connectors.
    pub fn average_trust(&self) -> f64 {
        if self.connectors.is_empty() {
            return 0.0;
        }
        self.connectors.values().map(|c| c.trust_score).sum::<f64>() / self.connectors.len() as f64
    }

    /// Get retained routes, oldest first.
    pub fn routes(&self) -> impl Iterator<Item = &Route> {
        self.route_order.iter().filter_map(|id| self.routes.get(id))
    }

    /// Get the number of retained routes.
    pub fn route_count(&self) -> usize {
        self.routes.len()
    }

    /// Get a retained route by id.
    pub fn route(&self, id: &str) -> Option<&Route> {
        self.routes.get(id)
    }

    /// Get the selected route, if any.
    pub fn active_route(&self) -> Option<&Route> {
        self.active_route
            .as_deref()
            .and_then(|id| self.route(id))
    }

    /// Get the control cycle state.
    pub fn ooda(&self) -> &OodaState {
        &self.ooda
    }

    /// Get the active lens.
    pub fn active_lens(&self) -> Lens {
        self.active_lens
    }

    /// Get the configuration for a lens.
    pub fn lens_config(&self, lens: Lens) -> Option<&LensConfig> {
        self.lens_configs.get(&lens)
    }

    /// Get connector ids in order.
    pub fn connector_ids(&self) -> Vec<String> {
        self.connectors.keys().cloned().collect()
    }

    // ---- mutation (crate-internal) -------------------------------------

    pub(crate) fn apply_connector_patch(
        &mut self,
        connector_id: &str,
        patch: &ConnectorPatch,
    ) -> TopologyResult<&Connector> {
        if let Some(trust) = patch.trust_score {
            if !(0.0..=1.0).contains(&trust) {
                return Err(TopologyError::invalid_value(
                    "trust_score",
                    format!("{trust} is outside [0, 1]"),
                ));
            }
        }
        if let Some(Some(rate)) = patch.success_rate {
            if !(0.0..=1.0).contains(&rate) {
                return Err(TopologyError::invalid_value(
                    "success_rate",
                    format!("{rate} is outside [0, 1]"),
                ));
            }
        }
        if let Some(depth) = patch.liquidity_depth {
            if !depth.is_finite() || depth < 0.0 {
                return Err(TopologyError::invalid_value(
                    "liquidity_depth",
                    format!("{depth} is not a non-negative amount"),
                ));
            }
        }
        if let Some(fee) = patch.fee_bps {
            check_fee_bps(fee)?;
        }
        if let Some(latency) = patch.latency_ms {
            check_latency_ms(latency)?;
        }

        let connector = self
            .connectors
            .get_mut(connector_id)
            .ok_or_else(|| TopologyError::ConnectorNotFound(connector_id.to_string()))?;

        if let Some(trust) = patch.trust_score {
            connector.trust_score = trust;
        }
        if let Some(liquidity) = patch.liquidity {
            connector.liquidity = liquidity;
        }
        if let Some(depth) = patch.liquidity_depth {
            connector.liquidity_depth = depth;
        }
        if let Some(rate) = patch.success_rate {
            connector.success_rate = rate;
        }
        if let Some(tags) = &patch.risk_tags {
            connector.risk_tags = tags.clone();
        }
        if let Some(latency) = patch.latency_ms {
            connector.latency_ms = latency;
        }
        if let Some(fee) = patch.fee_bps {
            connector.fee_bps = fee;
        }
        Ok(connector)
    }

    /// Append an observation, dropping the oldest beyond `cap`.
    pub(crate) fn push_observation(
        &mut self,
        connector_id: &str,
        observation: Observation,
        cap: usize,
    ) -> TopologyResult<()> {
        let connector = self
            .connectors
            .get_mut(connector_id)
            .ok_or_else(|| TopologyError::ConnectorNotFound(connector_id.to_string()))?;
        connector.observations.push(observation);
        if cap > 0 && connector.observations.len() > cap {
            let excess = connector.observations.len() - cap;
            connector.observations.drain(..excess);
        }
        Ok(())
    }

    /// Mark a claim verified. Returns `false` when it already was.
    pub(crate) fn verify_claim(
        &mut self,
        connector_id: &str,
        claim_id: &str,
        evidence_ref: Option<String>,
        at: DateTime<Utc>,
    ) -> TopologyResult<bool> {
        let connector = self
            .connectors
            .get_mut(connector_id)
            .ok_or_else(|| TopologyError::ConnectorNotFound(connector_id.to_string()))?;
        let claim = connector
            .claims
            .iter_mut()
            .find(|claim| claim.id == claim_id)
            .ok_or_else(|| TopologyError::ClaimNotFound {
                connector: connector_id.to_string(),
                claim: claim_id.to_string(),
            })?;
        if claim.verified {
            return Ok(false);
        }
        claim.verified = true;
        if evidence_ref.is_some() {
            claim.evidence_ref = evidence_ref;
        }
        claim.verified_at = Some(at);
        Ok(true)
    }

    pub(crate) fn corridors_mut(&mut self) -> impl Iterator<Item = &mut Corridor> {
        self.corridors.values_mut()
    }

    pub(crate) fn ledgers_mut(&mut self) -> impl Iterator<Item = &mut Ledger> {
        self.ledgers.values_mut()
    }

    /// Store a route and select it. Beyond `cap` the oldest route is
    /// evicted and returned.
    pub(crate) fn insert_route(&mut self, route: Route, cap: usize) -> Option<Route> {
        self.active_route = Some(route.id.clone());
        self.route_order.push_back(route.id.clone());
        self.routes.insert(route.id.clone(), route);

        if self.route_order.len() <= cap.max(1) {
            return None;
        }
        let oldest = self.route_order.pop_front()?;
        self.routes.remove(&oldest)
    }

    pub(crate) fn clear_active_route(&mut self) -> Option<RouteId> {
        self.active_route.take()
    }

    pub(crate) fn set_active_lens(&mut self, lens: Lens) -> Lens {
        std::mem::replace(&mut self.active_lens, lens)
    }

    pub(crate) fn patch_lens_config(&mut self, lens: Lens, patch: &LensConfigPatch) -> LensConfig {
        let config = self
            .lens_configs
            .entry(lens)
            .or_insert_with(|| LensConfig::for_lens(lens));
        config.apply(patch);
        config.clone()
    }

    pub(crate) fn ooda_mut(&mut self) -> &mut OodaState {
        &mut self.ooda
    }
}

fn check_fee_bps(fee_bps: u32) -> TopologyResult<()> {
    if fee_bps > MAX_FEE_BPS {
        return Err(TopologyError::invalid_value(
            "fee_bps",
            format!("{fee_bps} exceeds {MAX_FEE_BPS}"),
        ));
    }
    Ok(())
}

fn check_latency_ms(latency_ms: u64) -> TopologyResult<()> {
    if latency_ms > MAX_LATENCY_MS {
        return Err(TopologyError::invalid_value(
            "latency_ms",
            format!("{latency_ms} exceeds {MAX_LATENCY_MS}"),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::derivation::tests::connector;
    use crate::types::{LiquidityStatus, RiskTag};

    fn seeded() -> GraphState {
        GraphState::from_seed(SeedTopology::interledger(), &EngineConfig::default()).unwrap()
    }

    #[test]
    fn one_corridor_per_connector() {
        let state = seeded();
        assert_eq!(state.corridor_count(), state.connector_count());
        for connector in state.connectors() {
            let corridor = state.corridor_for_connector(&connector.id).unwrap();
            assert_eq!(corridor.from_ledger, connector.from_ledger);
            assert_eq!(corridor.to_ledger, connector.to_ledger);
        }
    }

    #[test]
    fn rejects_connector_with_unknown_endpoint() {
        let seed = SeedTopology::new(Vec::new(), vec![connector(0.9, LiquidityStatus::Live)]);
        let err = GraphState::from_seed(seed, &EngineConfig::default()).unwrap_err();
        assert_eq!(err, TopologyError::LedgerNotFound("x".to_string()));
    }

    #[test]
    fn missing_ids_are_absent_not_errors() {
        let state = seeded();
        assert!(state.ledger("nope").is_none());
        assert!(state.connector("nope").is_none());
        assert!(state.corridor("nope").is_none());
        assert!(state.route("nope").is_none());
        assert!(state.active_route().is_none());
    }

    #[test]
    fn patch_rejects_out_of_range_trust() {
        let mut state = seeded();
        let err = state
            .apply_connector_patch("btc-xrpl", &ConnectorPatch::trust(1.4))
            .unwrap_err();
        assert!(matches!(err, TopologyError::InvalidValue { field: "trust_score", .. }));
        assert_eq!(state.connector("btc-xrpl").unwrap().trust_score, 0.86);
    }

    #[test]
    fn patch_rejects_unbounded_fee_and_latency() {
        let mut state = seeded();
        let fee = ConnectorPatch {
            fee_bps: Some(u32::MAX),
            ..Default::default()
        };
        let err = state.apply_connector_patch("eth-xrpl", &fee).unwrap_err();
        assert!(matches!(err, TopologyError::InvalidValue { field: "fee_bps", .. }));

        let latency = ConnectorPatch {
            latency_ms: Some(MAX_LATENCY_MS + 1),
            ..Default::default()
        };
        let err = state.apply_connector_patch("eth-xrpl", &latency).unwrap_err();
        assert!(matches!(err, TopologyError::InvalidValue { field: "latency_ms", .. }));

        let connector = state.connector("eth-xrpl").unwrap();
        assert_eq!((connector.fee_bps, connector.latency_ms), (10, 900));

        let at_limit = ConnectorPatch {
            fee_bps: Some(MAX_FEE_BPS),
            ..Default::default()
        };
        assert!(state.apply_connector_patch("eth-xrpl", &at_limit).is_ok());
    }

    #[test]
    fn seed_with_unbounded_fee_is_rejected() {
        let mut seed = SeedTopology::interledger();
        seed.connectors[0].fee_bps = MAX_FEE_BPS + 1;
        let err = GraphState::from_seed(seed, &EngineConfig::default()).unwrap_err();
        assert!(matches!(err, TopologyError::InvalidValue { field: "fee_bps", .. }));
    }

    #[test]
    fn route_history_evicts_oldest() {
        let mut state = seeded();
        let router = crate::router::TopologyRouter::new(crate::seed::SEED_HUB);
        let mut ids = Vec::new();
        for _ in 0..4 {
            let route = router
                .calculate(&state, "ach", "sepa", 1.0, Utc::now())
                .unwrap();
            ids.push(route.id.clone());
            let evicted = state.insert_route(route, 3);
            if ids.len() <= 3 {
                assert!(evicted.is_none());
            } else {
                assert_eq!(evicted.unwrap().id, ids[0]);
            }
        }

        assert_eq!(state.route_count(), 3);
        assert!(state.route(&ids[0]).is_none());
        let retained: Vec<_> = state.routes().map(|route| route.id.clone()).collect();
        assert_eq!(retained, &ids[1..]);
        assert_eq!(state.active_route().unwrap().id, ids[3]);
    }

    #[test]
    fn patch_replaces_risk_tags() {
        let mut state = seeded();
        let patch = ConnectorPatch {
            risk_tags: Some([RiskTag::Experimental].into_iter().collect()),
            ..Default::default()
        };
        let updated = state.apply_connector_patch("xrpl-xlm", &patch).unwrap();
        assert!(updated.has_risk(RiskTag::Experimental));
    }

    #[test]
    fn observations_are_bounded() {
        let mut state = seeded();
        for i in 0..5 {
            let observation = Observation {
                id: format!("obs-{i}"),
                metric: "latency_ms".to_string(),
                value: i as f64,
                confidence: 0.9,
                observed_at: Utc::now(),
            };
            state.push_observation("btc-xrpl", observation, 3).unwrap();
        }
        let observations = &state.connector("btc-xrpl").unwrap().observations;
        assert_eq!(observations.len(), 3);
        assert_eq!(observations[0].id, "obs-2");
    }

    #[test]
    fn verifying_twice_is_a_no_op() {
        let mut state = seeded();
        let now = Utc::now();
        assert!(state
            .verify_claim("btc-eth", "btc-eth-peg", Some("proof:1".into()), now)
            .unwrap());
        assert!(!state
            .verify_claim("btc-eth", "btc-eth-peg", None, now)
            .unwrap());
        let err = state.verify_claim("btc-eth", "ghost", None, now).unwrap_err();
        assert!(matches!(err, TopologyError::ClaimNotFound { .. }));
    }
}
