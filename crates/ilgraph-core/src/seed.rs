//! Fixed seed topology loaded at engine construction.
//!
//! Nine ledgers around the XRP Ledger hub and thirteen directed connectors.
//! Values are representative, not live market data.

use crate::types::{
    Claim, Connector, Ledger, LedgerClass, LedgerDomain, LiquidityStatus, Position, Quote,
    RiskTag, SettlementKind, SettlementMechanism,
};
use std::collections::BTreeSet;

/// Hub ledger of the seed topology.
pub const SEED_HUB: &str = "xrpl";

/// Ledgers and connectors forming a topology.
#[derive(Debug, Clone, Default)]
pub struct SeedTopology {
    pub ledgers: Vec<Ledger>,
    pub connectors: Vec<Connector>,
}

impl SeedTopology {
    pub fn new(ledgers: Vec<Ledger>, connectors: Vec<Connector>) -> Self {
        Self {
            ledgers,
            connectors,
        }
    }

    /// The built-in interledger topology.
    pub fn interledger() -> Self {
        Self::new(seed_ledgers(), seed_connectors())
    }
}

fn tags(list: &[RiskTag]) -> BTreeSet<RiskTag> {
    list.iter().copied().collect()
}

#[allow(clippy::too_many_arguments)]
fn ledger(
    id: &str,
    name: &str,
    symbol: &str,
    class: LedgerClass,
    domain: LedgerDomain,
    settlement: SettlementKind,
    ilp_enabled: bool,
    consensus: &str,
    finality_secs: f64,
    throughput_tps: u32,
    risk_tags: &[RiskTag],
    position: (f64, f64),
) -> Ledger {
    Ledger {
        id: id.to_string(),
        name: name.to_string(),
        symbol: symbol.to_string(),
        class,
        domain,
        settlement,
        ilp_enabled,
        native_asset: symbol.to_string(),
        consensus: consensus.to_string(),
        finality_secs,
        throughput_tps,
        risk_tags: tags(risk_tags),
        position: Position {
            x: position.0,
            y: position.1,
        },
        mass: 1.0,
    }
}

#[rustfmt::skip]
fn seed_ledgers() -> Vec<Ledger> {
    use LedgerClass::*;
    use LedgerDomain::*;
    use SettlementKind::*;

    vec![
        ledger(
            "btc", "Bitcoin", "BTC", Public, OnLedger, Probabilistic, false,
            "Nakamoto proof-of-work", 3_600.0, 7, &[], (-320.0, -160.0),
        ),
        ledger(
            "eth", "Ethereum", "ETH", Public, OnLedger, Deterministic, false,
            "Gasper proof-of-stake", 768.0, 30, &[RiskTag::SmartContract], (-320.0, 160.0),
        ),
        ledger(
            "xrpl", "XRP Ledger", "XRP", Public, OnLedger, Deterministic, true,
            "XRP Ledger consensus protocol", 4.0, 1_500, &[], (0.0, 0.0),
        ),
        ledger(
            "xlm", "Stellar", "XLM", Public, OnLedger, Deterministic, true,
            "Stellar consensus protocol", 5.0, 1_000, &[], (320.0, -160.0),
        ),
        ledger(
            "lightning", "Lightning Network", "BTC", Public, Hybrid, Channel, true,
            "Channel state anchored to Bitcoin", 1.0, 10_000,
            &[RiskTag::LowLiquidity], (-480.0, -320.0),
        ),
        ledger(
            "fabric", "Hyperledger Fabric", "FAB", Permissioned, OnLedger, Deterministic, false,
            "Raft ordering service", 2.0, 3_000,
            &[RiskTag::Centralized], (0.0, 320.0),
        ),
        ledger(
            "ach", "ACH Network", "USD", Private, OffLedger, Batch, false,
            "Operator-run batch clearing", 86_400.0, 100,
            &[RiskTag::Regulatory], (320.0, 160.0),
        ),
        ledger(
            "sepa", "SEPA Instant", "EUR", Private, OffLedger, RealTimeGross, false,
            "TIPS central settlement", 10.0, 2_000,
            &[RiskTag::Regulatory], (480.0, 0.0),
        ),
        ledger(
            "custody", "Custodial Bank Ledger", "USD", Private, OffLedger, RealTimeGross, true,
            "Internal double-entry book", 1.0, 500,
            &[RiskTag::Custodial, RiskTag::Centralized], (-160.0, 320.0),
        ),
    ]
}

#[allow(clippy::too_many_arguments)]
fn connector(
    from: &str,
    to: &str,
    settlement: SettlementMechanism,
    liquidity: LiquidityStatus,
    liquidity_depth: f64,
    trust_score: f64,
    latency_ms: u64,
    fee_bps: u32,
    success_rate: Option<f64>,
    risk_tags: &[RiskTag],
    quotes: Vec<Quote>,
    claims: Vec<Claim>,
) -> Connector {
    Connector {
        id: format!("{from}-{to}"),
        name: format!("{from} to {to}"),
        from_ledger: from.to_string(),
        to_ledger: to.to_string(),
        quotes,
        liquidity,
        liquidity_depth,
        trust_score,
        latency_ms,
        settlement,
        risk_tags: tags(risk_tags),
        claims,
        observations: Vec::new(),
        fee_bps,
        uptime_percent: success_rate.map(|rate| 90.0 + rate * 10.0).unwrap_or(97.5),
        success_rate,
    }
}

fn quote(base: &str, quote: &str, rate: f64, spread_bps: u32) -> Quote {
    Quote {
        base: base.to_string(),
        quote: quote.to_string(),
        rate,
        spread_bps,
    }
}

#[rustfmt::skip]
fn seed_connectors() -> Vec<Connector> {
    use LiquidityStatus::*;
    use SettlementMechanism::*;

    vec![
        connector(
            "btc", "xrpl", Htlc, Live, 4_000_000.0, 0.86, 1_800, 15, Some(0.97), &[],
            vec![quote("BTC", "XRP", 112_400.0, 18)],
            vec![Claim::verified("btc-xrpl-htlc", "HTLC timeouts enforced on both legs", "audit:htlc-2025-03")],
        ),
        connector(
            "xrpl", "btc", Htlc, Live, 3_500_000.0, 0.84, 1_700, 15, Some(0.96), &[],
            vec![quote("XRP", "BTC", 0.0000089, 18)],
            Vec::new(),
        ),
        connector(
            "eth", "xrpl", Bridge, Live, 6_000_000.0, 0.82, 900, 10, Some(0.95),
            &[RiskTag::Bridge, RiskTag::SmartContract],
            vec![quote("ETH", "XRP", 5_420.0, 12), quote("USDC", "XRP", 1.62, 8)],
            vec![Claim::verified("eth-xrpl-audit", "Bridge contracts audited", "audit:bridge-2025-01")],
        ),
        connector(
            "xrpl", "eth", Bridge, Live, 5_500_000.0, 0.81, 950, 11, Some(0.94),
            &[RiskTag::Bridge],
            vec![quote("XRP", "ETH", 0.000184, 12)],
            vec![Claim::verified("xrpl-eth-reserves", "Reserves attested monthly", "attestation:2025-06")],
        ),
        connector(
            "xrpl", "xlm", AtomicSwap, Live, 3_000_000.0, 0.90, 400, 5, Some(0.99), &[],
            vec![quote("XRP", "XLM", 5.31, 6)],
            Vec::new(),
        ),
        connector(
            "xlm", "xrpl", AtomicSwap, Live, 2_800_000.0, 0.88, 420, 5, Some(0.98), &[],
            vec![quote("XLM", "XRP", 0.188, 6)],
            Vec::new(),
        ),
        connector(
            "ach", "xrpl", Api, Live, 8_000_000.0, 0.78, 3_600_000, 25, Some(0.93),
            &[RiskTag::Custodial, RiskTag::Regulatory],
            vec![quote("USD", "XRP", 1.61, 20)],
            vec![Claim::unverified("ach-xrpl-license", "Operator holds money transmitter licenses")],
        ),
        connector(
            "xrpl", "sepa", Api, Live, 7_000_000.0, 0.80, 1_800_000, 20, Some(0.94),
            &[RiskTag::Custodial, RiskTag::Regulatory],
            vec![quote("XRP", "EUR", 0.57, 16)],
            Vec::new(),
        ),
        connector(
            "lightning", "btc", Htlc, Live, 900_000.0, 0.75, 200, 3, Some(0.91),
            &[RiskTag::LowLiquidity],
            vec![quote("BTC", "BTC", 1.0, 2)],
            Vec::new(),
        ),
        connector(
            "fabric", "xrpl", Escrow, Simulated, 1_500_000.0, 0.65, 1_200, 18, None,
            &[RiskTag::Experimental, RiskTag::Counterparty],
            vec![quote("FAB", "XRP", 0.92, 30)],
            vec![Claim::unverified("fabric-xrpl-escrow", "Escrow notary operated by consortium")],
        ),
        connector(
            "custody", "eth", Multisig, Depleted, 0.0, 0.55, 2_400, 30, Some(0.80),
            &[RiskTag::Custodial, RiskTag::Centralized],
            vec![quote("USD", "ETH", 0.00031, 35)],
            Vec::new(),
        ),
        connector(
            "btc", "eth", Bridge, Unknown, 250_000.0, 0.25, 5_400, 40, None,
            &[RiskTag::Bridge, RiskTag::Experimental],
            vec![quote("BTC", "ETH", 20.7, 55)],
            vec![Claim::unverified("btc-eth-peg", "Wrapped supply fully backed")],
        ),
        connector(
            "sepa", "ach", Api, Simulated, 5_000_000.0, 0.72, 7_200_000, 22, Some(0.90),
            &[RiskTag::Custodial],
            vec![quote("EUR", "USD", 1.08, 14)],
            Vec::new(),
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn every_connector_endpoint_is_a_seeded_ledger() {
        let seed = SeedTopology::interledger();
        let ids: HashSet<_> = seed.ledgers.iter().map(|l| l.id.as_str()).collect();
        for connector in &seed.connectors {
            assert!(ids.contains(connector.from_ledger.as_str()), "{}", connector.id);
            assert!(ids.contains(connector.to_ledger.as_str()), "{}", connector.id);
        }
        assert!(ids.contains(SEED_HUB));
    }

    #[test]
    fn connector_ids_are_unique() {
        let seed = SeedTopology::interledger();
        let ids: HashSet<_> = seed.connectors.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids.len(), seed.connectors.len());
    }
}
