//! Control cycle behaviour observed through the public engine API.

mod common;

use common::*;
use ilgraph_core::invariants::LOW_TRUST_TAGGED;
use ilgraph_core::{
    Complexity, ConnectorPatch, CorridorStatus, EngineConfig, LiquidityStatus, OodaPhase,
    TopologyEngine, TopologyEvent,
};

fn status_changes_since(
    engine: &TopologyEngine,
    sequence: u64,
) -> Vec<(String, CorridorStatus, CorridorStatus)> {
    engine
        .events_since(sequence)
        .into_iter()
        .filter_map(|envelope| match envelope.event {
            TopologyEvent::CorridorStatusChanged {
                corridor_id,
                old_status,
                new_status,
                ..
            } => Some((corridor_id, old_status, new_status)),
            _ => None,
        })
        .collect()
}

#[test]
fn trust_collapse_fogs_corridor_once() {
    let mut engine = engine_over(
        &["x", "y"],
        vec![connector("x", "y", 0.9, LiquidityStatus::Live)],
        "x",
    );
    let before = next_sequence(&engine);
    let report = engine.tick().unwrap();
    assert!(report.status_changes.is_empty());
    assert!(status_changes_since(&engine, before).is_empty());
    assert_eq!(
        engine.corridor("corridor:x-y").unwrap().status,
        CorridorStatus::Active
    );

    engine
        .update_connector("x-y", ConnectorPatch::trust(0.2))
        .unwrap();
    // Corridors follow connectors only on a tick.
    assert_eq!(
        engine.corridor("corridor:x-y").unwrap().status,
        CorridorStatus::Active
    );

    let before = next_sequence(&engine);
    let report = engine.tick().unwrap();
    assert_eq!(
        status_changes_since(&engine, before),
        vec![(
            "corridor:x-y".to_string(),
            CorridorStatus::Active,
            CorridorStatus::Fogged
        )]
    );
    assert_eq!(report.status_changes.len(), 1);
    assert_eq!(
        engine.corridor("corridor:x-y").unwrap().status,
        CorridorStatus::Fogged
    );

    let before = next_sequence(&engine);
    engine.tick().unwrap();
    assert!(status_changes_since(&engine, before).is_empty());
}

#[test]
fn ambiguous_connector_keeps_previous_status() {
    let mut engine = engine_over(
        &["x", "y"],
        vec![connector("x", "y", 0.9, LiquidityStatus::Live)],
        "x",
    );
    // 0.5 trust with live liquidity matches no rule.
    engine
        .update_connector("x-y", ConnectorPatch::trust(0.5))
        .unwrap();
    engine.tick().unwrap();
    assert_eq!(
        engine.corridor("corridor:x-y").unwrap().status,
        CorridorStatus::Active
    );
}

#[test]
fn tick_publishes_in_phase_order() {
    let config = EngineConfig {
        observation_probability: 1.0,
        rng_seed: Some(5),
        ..Default::default()
    };
    let mut engine = TopologyEngine::new(config).unwrap();
    engine
        .update_connector("xrpl-xlm", ConnectorPatch::trust(0.2))
        .unwrap();

    let before = next_sequence(&engine);
    engine.tick().unwrap();
    let labels = labels_since(&engine, before);

    let first = |label: &str| labels.iter().position(|l| l == label).unwrap();
    let last = |label: &str| labels.iter().rposition(|l| l == label).unwrap();

    assert_eq!(labels.first().map(String::as_str), Some("phase:observe"));
    assert!(last("OBSERVATION_RECORDED") < first("phase:orient"));
    assert!(first("phase:orient") < first("phase:decide"));
    assert!(first("phase:decide") < first("CORRIDOR_STATUS_CHANGED"));
    assert!(last("CORRIDOR_STATUS_CHANGED") < first("phase:act"));
    assert!(first("phase:act") < first("LEDGER_UPDATED"));
    assert!(last("LEDGER_UPDATED") < first("INVARIANT_VIOLATED"));
    assert_eq!(labels.last().map(String::as_str), Some("NARRATIVE_UPDATED"));

    assert_eq!(engine.phase(), OodaPhase::Act);
    assert_eq!(engine.ooda().cycles_completed, 1);
}

#[test]
fn sequences_strictly_increase() {
    let mut engine = seeded_engine();
    for _ in 0..3 {
        engine.tick().unwrap();
    }
    let sequences: Vec<u64> = engine.event_history().iter().map(|e| e.sequence).collect();
    assert!(sequences.windows(2).all(|pair| pair[0] < pair[1]));
}

#[test]
fn persistent_violation_is_reported_once() {
    let mut engine = seeded_engine();
    engine
        .update_connector("xrpl-xlm", ConnectorPatch::trust(0.6))
        .unwrap();

    let before = next_sequence(&engine);
    for _ in 0..5 {
        engine.tick().unwrap();
    }
    let violations: Vec<String> = engine
        .events_since(before)
        .into_iter()
        .filter_map(|envelope| match envelope.event {
            TopologyEvent::InvariantViolated { invariant_id, .. } => Some(invariant_id),
            _ => None,
        })
        .collect();
    assert_eq!(violations, vec![LOW_TRUST_TAGGED.to_string()]);
    assert_eq!(engine.violations(), vec!["Low trust discloses risk".to_string()]);

    engine
        .update_connector("xrpl-xlm", ConnectorPatch::trust(0.9))
        .unwrap();
    engine.tick().unwrap();
    assert!(engine.violations().is_empty());

    engine
        .update_connector("xrpl-xlm", ConnectorPatch::trust(0.6))
        .unwrap();
    engine.tick().unwrap();
    assert_eq!(engine.bus().event_count("INVARIANT_VIOLATED"), 2);
}

#[test]
fn ledger_mass_settles_after_first_tick() {
    let mut engine = seeded_engine();
    engine.tick().unwrap();
    assert_eq!(engine.bus().event_count("LEDGER_UPDATED"), 9);
    assert_eq!(engine.ledger("xrpl").unwrap().mass, 1.0 + 0.5 * 9.0);

    engine.tick().unwrap();
    assert_eq!(engine.bus().event_count("LEDGER_UPDATED"), 9);
}

#[test]
fn narrative_describes_seed_network() {
    let mut engine = seeded_engine();
    engine.tick().unwrap();

    let narrative = engine.narrative();
    assert!(narrative.starts_with("9 of 13 corridors"), "{narrative}");
    assert_eq!(engine.ooda().complexity, Complexity::Moderate);
    assert!(engine.ooda().last_cycle_at.is_some());
    assert_eq!(
        engine.phase_summary(OodaPhase::Decide),
        "All corridor statuses unchanged"
    );
}

#[test]
fn act_refreshes_corridor_visuals() {
    let mut engine = seeded_engine();
    engine
        .update_connector(
            "xrpl-xlm",
            ConnectorPatch {
                liquidity_depth: Some(5_000_000.0),
                success_rate: Some(None),
                ..Default::default()
            },
        )
        .unwrap();
    engine.tick().unwrap();

    let corridor = engine.corridor("corridor:xrpl-xlm").unwrap();
    assert!((corridor.thickness - 0.5).abs() < 1e-9);
    assert!((corridor.glow - 0.9 * 0.9).abs() < 1e-9);
    assert_eq!(corridor.success_rate, None);
    // The active corridor now has no success rate.
    assert_eq!(engine.violations(), vec!["Active corridors are falsifiable".to_string()]);
}
