//! Pure functions mapping connector state to corridor and ledger visuals.
//!
//! The control loop's decide and act phases call nothing else, so a corridor
//! can always be reproduced from its connector.

use crate::config::EngineConfig;
use crate::types::{
    Complexity, Connector, Corridor, CorridorId, CorridorStatus, LiquidityStatus, RiskTag,
};

/// Trust below this fogs a corridor regardless of anything else.
pub const FOG_TRUST_THRESHOLD: f64 = 0.3;
/// Trust at or above this (with live liquidity) activates a corridor.
pub const ACTIVE_TRUST_THRESHOLD: f64 = 0.7;
/// Trust at or above this (with at most one risk tag) counts as healthy.
pub const HEALTHY_TRUST_THRESHOLD: f64 = 0.7;

pub fn corridor_id(connector_id: &str) -> CorridorId {
    format!("corridor:{connector_id}")
}

/// Status decision with fixed precedence. `None` means "leave unchanged".
pub fn decide_status(connector: &Connector) -> Option<CorridorStatus> {
    if connector.trust_score < FOG_TRUST_THRESHOLD {
        return Some(CorridorStatus::Fogged);
    }
    if connector.liquidity == LiquidityStatus::Depleted {
        return Some(CorridorStatus::Inactive);
    }
    if connector.has_risk(RiskTag::Experimental) {
        return Some(CorridorStatus::Experimental);
    }
    if connector.trust_score >= ACTIVE_TRUST_THRESHOLD
        && connector.liquidity == LiquidityStatus::Live
    {
        return Some(CorridorStatus::Active);
    }
    None
}

pub fn derive_status(connector: &Connector, current: CorridorStatus) -> CorridorStatus {
    decide_status(connector).unwrap_or(current)
}

/// Status at construction, when there is no previous value to keep.
pub fn initial_status(connector: &Connector) -> CorridorStatus {
    derive_status(connector, CorridorStatus::Inactive)
}

pub fn thickness(liquidity_depth: f64, reference_depth: f64) -> f64 {
    if !liquidity_depth.is_finite() || reference_depth <= 0.0 {
        return 0.0;
    }
    (liquidity_depth / reference_depth).clamp(0.0, 1.0)
}

pub fn glow(trust_score: f64, success_rate: Option<f64>, default_success_rate: f64) -> f64 {
    (trust_score * success_rate.unwrap_or(default_success_rate)).clamp(0.0, 1.0)
}

pub fn ledger_mass(base: f64, per_connector: f64, incident_connectors: usize) -> f64 {
    base + per_connector * incident_connectors as f64
}

pub fn is_healthy(connector: &Connector) -> bool {
    connector.trust_score >= HEALTHY_TRUST_THRESHOLD && connector.risk_tags.len() <= 1
}

pub fn complexity_for(average_trust: f64) -> Complexity {
    if average_trust >= 0.75 {
        Complexity::Simple
    } else if average_trust >= 0.5 {
        Complexity::Moderate
    } else {
        Complexity::Complex
    }
}

/// Build the corridor for a connector at construction time.
pub fn corridor_for(connector: &Connector, config: &EngineConfig) -> Corridor {
    let depth = connector.liquidity_depth.max(0.0);
    Corridor {
        id: corridor_id(&connector.id),
        connector_id: connector.id.clone(),
        from_ledger: connector.from_ledger.clone(),
        to_ledger: connector.to_ledger.clone(),
        status: initial_status(connector),
        thickness: thickness(depth, config.thickness_reference_depth),
        glow: glow(
            connector.trust_score,
            connector.success_rate,
            config.default_success_rate,
        ),
        risk_fog: connector.risk_tags.clone(),
        success_rate: connector.success_rate,
        volume_24h: (depth * 0.05).round(),
        tx_count_24h: (depth / 2_500.0).round() as u64,
    }
}
