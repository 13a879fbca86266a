use crate::state::GraphState;
use crate::types::{Corridor, LedgerId, Route, RouteHop};
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Two-tier router: a direct active corridor, else a relay through the hub.
///
/// There is no general graph search. Only corridors whose status is `active`
/// are considered, and the amount does not influence path selection.
#[derive(Debug, Clone)]
pub struct TopologyRouter {
    hub: LedgerId,
}

impl TopologyRouter {
    pub fn new(hub: impl Into<LedgerId>) -> Self {
        Self { hub: hub.into() }
    }

    /// `None` means no route exists right now. Unknown ledger ids behave the
    /// same as ledgers without active corridors.
    pub fn calculate(
        &self,
        state: &GraphState,
        from: &str,
        to: &str,
        amount: f64,
        now: DateTime<Utc>,
    ) -> Option<Route> {
        if from == to {
            return None;
        }

        if let Some(direct) = state.active_corridor(from, to) {
            let hop = hop_for(state, direct)?;
            return Some(assemble(from, to, amount, vec![hop], false, now));
        }

        if from == self.hub || to == self.hub {
            return None;
        }

        let inbound = state.active_corridor(from, &self.hub)?;
        let outbound = state.active_corridor(&self.hub, to)?;
        let hops = vec![hop_for(state, inbound)?, hop_for(state, outbound)?];
        Some(assemble(from, to, amount, hops, true, now))
    }
}

fn hop_for(state: &GraphState, corridor: &Corridor) -> Option<RouteHop> {
    let connector = state.connector(&corridor.connector_id)?;
    Some(RouteHop {
        corridor_id: corridor.id.clone(),
        connector_id: connector.id.clone(),
        from_ledger: corridor.from_ledger.clone(),
        to_ledger: corridor.to_ledger.clone(),
        fee_bps: connector.fee_bps,
        latency_ms: connector.latency_ms,
        trust_score: connector.trust_score,
        liquidity_depth: connector.liquidity_depth,
    })
}

fn assemble(
    from: &str,
    to: &str,
    amount: f64,
    hops: Vec<RouteHop>,
    via_hub: bool,
    now: DateTime<Utc>,
) -> Route {
    let total_fee_bps = hops
        .iter()
        .fold(0u32, |total, hop| total.saturating_add(hop.fee_bps));
    let total_latency_ms = hops
        .iter()
        .fold(0u64, |total, hop| total.saturating_add(hop.latency_ms));
    let joint_trust: f64 = hops.iter().map(|hop| hop.trust_score).product();
    let liquidity_available = hops
        .iter()
        .map(|hop| hop.liquidity_depth)
        .fold(f64::INFINITY, f64::min);

    Route {
        id: Uuid::new_v4().to_string(),
        from: from.to_string(),
        to: to.to_string(),
        amount,
        hops,
        total_fee_bps,
        total_latency_ms,
        risk_score: (1.0 - joint_trust).clamp(0.0, 1.0),
        liquidity_available,
        via_hub,
        computed_at: now,
    }
}
