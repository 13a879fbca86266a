//! Small hand-built topologies shared by the integration tests.

#![allow(dead_code)]

use ilgraph_core::{
    Connector, EngineConfig, Ledger, LiquidityStatus, SeedTopology, TopologyEngine, TopologyEvent,
};

/// A plain public ledger with the given id.
pub fn ledger(id: &str) -> Ledger {
    let mut ledger = SeedTopology::interledger()
        .ledgers
        .into_iter()
        .find(|l| l.id == "xlm")
        .expect("seed contains xlm");
    ledger.id = id.to_string();
    ledger.name = id.to_uppercase();
    ledger.risk_tags.clear();
    ledger
}

/// An untagged atomic-swap connector `from -> to`.
pub fn connector(from: &str, to: &str, trust: f64, liquidity: LiquidityStatus) -> Connector {
    let mut connector = SeedTopology::interledger()
        .connectors
        .into_iter()
        .find(|c| c.id == "xrpl-xlm")
        .expect("seed contains xrpl-xlm");
    connector.id = format!("{from}-{to}");
    connector.name = format!("{from} to {to}");
    connector.from_ledger = from.to_string();
    connector.to_ledger = to.to_string();
    connector.trust_score = trust;
    connector.liquidity = liquidity;
    connector.risk_tags.clear();
    connector.claims.clear();
    connector.observations.clear();
    connector
}

pub fn engine_over(ledgers: &[&str], connectors: Vec<Connector>, hub: &str) -> TopologyEngine {
    let seed = SeedTopology::new(ledgers.iter().map(|id| ledger(id)).collect(), connectors);
    TopologyEngine::with_seed(EngineConfig::deterministic(42).with_hub(hub), seed)
        .expect("valid topology")
}

pub fn seeded_engine() -> TopologyEngine {
    TopologyEngine::new(EngineConfig::deterministic(42)).expect("seed topology is valid")
}

/// Sequence number the next published event will get.
pub fn next_sequence(engine: &TopologyEngine) -> u64 {
    engine.bus().last_sequence().map_or(0, |s| s + 1)
}

/// Event kinds since `sequence`, with phase changes spelled out.
pub fn labels_since(engine: &TopologyEngine, sequence: u64) -> Vec<String> {
    engine
        .events_since(sequence)
        .iter()
        .map(|envelope| match &envelope.event {
            TopologyEvent::OodaPhaseChanged { phase } => format!("phase:{}", phase.name()),
            other => other.kind().to_string(),
        })
        .collect()
}
