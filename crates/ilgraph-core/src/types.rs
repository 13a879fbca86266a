use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

pub type LedgerId = String;
pub type ConnectorId = String;
pub type CorridorId = String;
pub type RouteId = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LedgerClass {
    Public,
    Permissioned,
    Private,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LedgerDomain {
    OnLedger,
    OffLedger,
    Hybrid,
}

impl LedgerDomain {
    pub fn name(self) -> &'static str {
        match self {
            Self::OnLedger => "on-ledger",
            Self::OffLedger => "off-ledger",
            Self::Hybrid => "hybrid",
        }
    }
}

/// How a ledger reaches finality for the value it carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SettlementKind {
    /// Irreversible once included (BFT style consensus)
    Deterministic,
    /// Finality grows with confirmations
    Probabilistic,
    /// Netted and settled in scheduled batches
    Batch,
    /// Gross settlement through a central operator
    RealTimeGross,
    /// Off-chain channel state anchored to a base ledger
    Channel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskTag {
    Custodial,
    Experimental,
    Bridge,
    Regulatory,
    Counterparty,
    SmartContract,
    Centralized,
    LowLiquidity,
}

impl RiskTag {
    pub fn name(self) -> &'static str {
        match self {
            Self::Custodial => "custodial",
            Self::Experimental => "experimental",
            Self::Bridge => "bridge",
            Self::Regulatory => "regulatory",
            Self::Counterparty => "counterparty",
            Self::SmartContract => "smart_contract",
            Self::Centralized => "centralized",
            Self::LowLiquidity => "low_liquidity",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

/// A value-settlement network.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ledger {
    pub id: LedgerId,
    pub name: String,
    pub symbol: String,
    pub class: LedgerClass,
    pub domain: LedgerDomain,
    pub settlement: SettlementKind,
    /// Speaks the Interledger connector protocol natively
    pub ilp_enabled: bool,
    pub native_asset: String,
    pub consensus: String,
    pub finality_secs: f64,
    pub throughput_tps: u32,
    pub risk_tags: BTreeSet<RiskTag>,
    pub position: Position,
    /// Written only by the control loop's act phase.
    pub mass: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LiquidityStatus {
    Live,
    Simulated,
    Unknown,
    Depleted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SettlementMechanism {
    Escrow,
    Htlc,
    AtomicSwap,
    Api,
    Bridge,
    Multisig,
}

/// One asset-pair price offered by a connector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub base: String,
    pub quote: String,
    pub rate: f64,
    pub spread_bps: u32,
}

/// An asserted fact about a connector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claim {
    pub id: String,
    pub statement: String,
    pub verified: bool,
    pub evidence_ref: Option<String>,
    pub verified_at: Option<DateTime<Utc>>,
}

impl Claim {
    pub fn unverified(id: impl Into<String>, statement: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            statement: statement.into(),
            verified: false,
            evidence_ref: None,
            verified_at: None,
        }
    }

    pub fn verified(
        id: impl Into<String>,
        statement: impl Into<String>,
        evidence_ref: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            statement: statement.into(),
            verified: true,
            evidence_ref: Some(evidence_ref.into()),
            verified_at: None,
        }
    }
}

/// A sampled telemetry datum about a connector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub id: String,
    pub metric: String,
    pub value: f64,
    /// 0.0..1.0
    pub confidence: f64,
    pub observed_at: DateTime<Utc>,
}

/// Directed, trust- and liquidity-bearing edge between two ledgers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Connector {
    pub id: ConnectorId,
    pub name: String,
    pub from_ledger: LedgerId,
    pub to_ledger: LedgerId,
    pub quotes: Vec<Quote>,
    pub liquidity: LiquidityStatus,
    pub liquidity_depth: f64,
    /// 0.0..1.0
    pub trust_score: f64,
    pub latency_ms: u64,
    pub settlement: SettlementMechanism,
    pub risk_tags: BTreeSet<RiskTag>,
    pub claims: Vec<Claim>,
    pub observations: Vec<Observation>,
    pub fee_bps: u32,
    pub uptime_percent: f64,
    pub success_rate: Option<f64>,
}

impl Connector {
    pub fn has_risk(&self, tag: RiskTag) -> bool {
        self.risk_tags.contains(&tag)
    }

    pub fn has_verified_claim(&self) -> bool {
        self.claims.iter().any(|claim| claim.verified)
    }

    pub fn is_incident_to(&self, ledger_id: &str) -> bool {
        self.from_ledger == ledger_id || self.to_ledger == ledger_id
    }
}

/// Partial update for a seeded connector. Topology shape cannot change.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConnectorPatch {
    pub trust_score: Option<f64>,
    pub liquidity: Option<LiquidityStatus>,
    pub liquidity_depth: Option<f64>,
    pub success_rate: Option<Option<f64>>,
    pub risk_tags: Option<BTreeSet<RiskTag>>,
    pub latency_ms: Option<u64>,
    pub fee_bps: Option<u32>,
}

impl ConnectorPatch {
    pub fn trust(trust_score: f64) -> Self {
        Self {
            trust_score: Some(trust_score),
            ..Default::default()
        }
    }

    pub fn liquidity(liquidity: LiquidityStatus) -> Self {
        Self {
            liquidity: Some(liquidity),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CorridorStatus {
    Active,
    Experimental,
    Fogged,
    Inactive,
    Deprecated,
}

impl CorridorStatus {
    pub fn name(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Experimental => "experimental",
            Self::Fogged => "fogged",
            Self::Inactive => "inactive",
            Self::Deprecated => "deprecated",
        }
    }
}

impl fmt::Display for CorridorStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Display-oriented projection of one connector's health. Derived only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Corridor {
    pub id: CorridorId,
    pub connector_id: ConnectorId,
    pub from_ledger: LedgerId,
    pub to_ledger: LedgerId,
    pub status: CorridorStatus,
    /// 0.0..1.0
    pub thickness: f64,
    /// 0.0..1.0
    pub glow: f64,
    pub risk_fog: BTreeSet<RiskTag>,
    pub success_rate: Option<f64>,
    pub volume_24h: f64,
    pub tx_count_24h: u64,
}

/// One traversal in a route.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteHop {
    pub corridor_id: CorridorId,
    pub connector_id: ConnectorId,
    pub from_ledger: LedgerId,
    pub to_ledger: LedgerId,
    pub fee_bps: u32,
    pub latency_ms: u64,
    pub trust_score: f64,
    pub liquidity_depth: f64,
}

/// Immutable routing result. Not re-validated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Route {
    pub id: RouteId,
    pub from: LedgerId,
    pub to: LedgerId,
    pub amount: f64,
    pub hops: Vec<RouteHop>,
    pub total_fee_bps: u32,
    pub total_latency_ms: u64,
    /// 1 - product of hop trust scores
    pub risk_score: f64,
    /// Minimum liquidity depth across hops
    pub liquidity_available: f64,
    pub via_hub: bool,
    pub computed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Lens {
    Domain,
    Trust,
    Heat,
    Fog,
    Flow,
}

impl Lens {
    pub const ALL: [Lens; 5] = [Lens::Domain, Lens::Trust, Lens::Heat, Lens::Fog, Lens::Flow];

    pub fn name(self) -> &'static str {
        match self {
            Self::Domain => "domain",
            Self::Trust => "trust",
            Self::Heat => "heat",
            Self::Fog => "fog",
            Self::Flow => "flow",
        }
    }
}

/// Rendering hints for one lens. Never read by graph computation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LensConfig {
    pub opacity: f64,
    pub show_labels: bool,
    pub highlight_threshold: f64,
    pub animate: bool,
}

impl LensConfig {
    pub fn for_lens(lens: Lens) -> Self {
        match lens {
            Lens::Domain => Self {
                opacity: 1.0,
                show_labels: true,
                highlight_threshold: 0.0,
                animate: false,
            },
            Lens::Trust => Self {
                opacity: 0.9,
                show_labels: true,
                highlight_threshold: 0.7,
                animate: false,
            },
            Lens::Heat => Self {
                opacity: 0.8,
                show_labels: false,
                highlight_threshold: 0.5,
                animate: true,
            },
            Lens::Fog => Self {
                opacity: 0.6,
                show_labels: false,
                highlight_threshold: 0.3,
                animate: true,
            },
            Lens::Flow => Self {
                opacity: 0.85,
                show_labels: false,
                highlight_threshold: 0.0,
                animate: true,
            },
        }
    }

    pub fn apply(&mut self, patch: &LensConfigPatch) {
        if let Some(opacity) = patch.opacity {
            self.opacity = opacity.clamp(0.0, 1.0);
        }
        if let Some(show_labels) = patch.show_labels {
            self.show_labels = show_labels;
        }
        if let Some(threshold) = patch.highlight_threshold {
            self.highlight_threshold = threshold.clamp(0.0, 1.0);
        }
        if let Some(animate) = patch.animate {
            self.animate = animate;
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LensConfigPatch {
    pub opacity: Option<f64>,
    pub show_labels: Option<bool>,
    pub highlight_threshold: Option<f64>,
    pub animate: Option<bool>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OodaPhase {
    Observe,
    Orient,
    Decide,
    Act,
}

impl OodaPhase {
    /// Cyclic successor; there is no terminal phase.
    pub fn next(self) -> Self {
        match self {
            Self::Observe => Self::Orient,
            Self::Orient => Self::Decide,
            Self::Decide => Self::Act,
            Self::Act => Self::Observe,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Observe => "observe",
            Self::Orient => "orient",
            Self::Decide => "decide",
            Self::Act => "act",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Complexity {
    Simple,
    Moderate,
    Complex,
}

/// Per-phase summaries plus the plain-language narrative.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OodaState {
    pub phase: OodaPhase,
    pub observe_summary: String,
    pub orient_summary: String,
    pub decide_summary: String,
    pub act_summary: String,
    pub feynman_summary: String,
    pub complexity: Complexity,
    pub cycles_completed: u64,
    pub last_cycle_at: Option<DateTime<Utc>>,
}

impl Default for OodaState {
    fn default() -> Self {
        Self {
            phase: OodaPhase::Observe,
            observe_summary: String::new(),
            orient_summary: String::new(),
            decide_summary: String::new(),
            act_summary: String::new(),
            feynman_summary: String::new(),
            complexity: Complexity::Simple,
            cycles_completed: 0,
            last_cycle_at: None,
        }
    }
}

impl OodaState {
    pub fn summary(&self, phase: OodaPhase) -> &str {
        match phase {
            OodaPhase::Observe => &self.observe_summary,
            OodaPhase::Orient => &self.orient_summary,
            OodaPhase::Decide => &self.decide_summary,
            OodaPhase::Act => &self.act_summary,
        }
    }
}
