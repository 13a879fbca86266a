use crate::error::{TopologyError, TopologyResult};
use serde::{Deserialize, Serialize};

/// Engine configuration.
///
/// Every field has a default so partial files and environment overlays
/// deserialize cleanly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Control loop period in milliseconds
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,

    /// Per-connector chance of a synthesized latency sample each observe phase
    #[serde(default = "default_observation_probability")]
    pub observation_probability: f64,

    /// Ledger used for two-hop relay routes
    #[serde(default = "default_hub_ledger")]
    pub hub_ledger: String,

    /// Liquidity depth that maps to full corridor thickness
    #[serde(default = "default_thickness_reference_depth")]
    pub thickness_reference_depth: f64,

    /// Success rate assumed for glow when a connector reports none
    #[serde(default = "default_success_rate")]
    pub default_success_rate: f64,

    /// Ledger mass with no incident connectors
    #[serde(default = "default_mass_base")]
    pub mass_base: f64,

    /// Mass added per incident connector
    #[serde(default = "default_mass_per_connector")]
    pub mass_per_connector: f64,

    /// Envelopes retained for replay
    #[serde(default = "default_event_history_limit")]
    pub event_history_limit: usize,

    /// Observations retained per connector (oldest dropped first)
    #[serde(default = "default_max_observations")]
    pub max_observations_per_connector: usize,

    /// Calculated routes retained (oldest evicted first)
    #[serde(default = "default_max_routes_retained")]
    pub max_routes_retained: usize,

    /// Fixed seed for the observe phase; entropy-seeded when absent
    #[serde(default)]
    pub rng_seed: Option<u64>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: default_tick_interval_ms(),
            observation_probability: default_observation_probability(),
            hub_ledger: default_hub_ledger(),
            thickness_reference_depth: default_thickness_reference_depth(),
            default_success_rate: default_success_rate(),
            mass_base: default_mass_base(),
            mass_per_connector: default_mass_per_connector(),
            event_history_limit: default_event_history_limit(),
            max_observations_per_connector: default_max_observations(),
            max_routes_retained: default_max_routes_retained(),
            rng_seed: None,
        }
    }
}

impl EngineConfig {
    /// Deterministic configuration: fixed seed, no synthesized telemetry.
    pub fn deterministic(seed: u64) -> Self {
        Self {
            observation_probability: 0.0,
            rng_seed: Some(seed),
            ..Default::default()
        }
    }

    pub fn with_hub(mut self, hub_ledger: impl Into<String>) -> Self {
        self.hub_ledger = hub_ledger.into();
        self
    }

    pub fn validate(&self) -> TopologyResult<()> {
        if self.tick_interval_ms == 0 {
            return Err(TopologyError::InvalidInterval(0));
        }
        if !(0.0..=1.0).contains(&self.observation_probability) {
            return Err(TopologyError::InvalidConfig(format!(
                "observation_probability must be within [0, 1], got {}",
                self.observation_probability
            )));
        }
        if !(0.0..=1.0).contains(&self.default_success_rate) {
            return Err(TopologyError::InvalidConfig(format!(
                "default_success_rate must be within [0, 1], got {}",
                self.default_success_rate
            )));
        }
        if self.thickness_reference_depth <= 0.0 {
            return Err(TopologyError::InvalidConfig(
                "thickness_reference_depth must be positive".to_string(),
            ));
        }
        if self.event_history_limit == 0 {
            return Err(TopologyError::InvalidConfig(
                "event_history_limit must be at least 1".to_string(),
            ));
        }
        if self.max_routes_retained == 0 {
            return Err(TopologyError::InvalidConfig(
                "max_routes_retained must be at least 1".to_string(),
            ));
        }
        if self.hub_ledger.trim().is_empty() {
            return Err(TopologyError::InvalidConfig(
                "hub_ledger must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

// Default value helpers
fn default_tick_interval_ms() -> u64 {
    10_000
}

fn default_observation_probability() -> f64 {
    0.3
}

fn default_hub_ledger() -> String {
    "xrpl".to_string()
}

fn default_thickness_reference_depth() -> f64 {
    10_000_000.0
}

fn default_success_rate() -> f64 {
    0.9
}

fn default_mass_base() -> f64 {
    1.0
}

fn default_mass_per_connector() -> f64 {
    0.5
}

fn default_event_history_limit() -> usize {
    1_000
}

fn default_max_observations() -> usize {
    100
}

fn default_max_routes_retained() -> usize {
    1_000
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        let config = EngineConfig::default();
        assert_eq!(config.tick_interval_ms, 10_000);
        assert_eq!(config.hub_ledger, "xrpl");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_out_of_range_probability() {
        let config = EngineConfig {
            observation_probability: 1.5,
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("observation_probability"));
    }

    #[test]
    fn rejects_zero_interval() {
        let config = EngineConfig {
            tick_interval_ms: 0,
            ..Default::default()
        };
        assert_eq!(config.validate(), Err(TopologyError::InvalidInterval(0)));
    }

    #[test]
    fn rejects_zero_route_retention() {
        let config = EngineConfig {
            max_routes_retained: 0,
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("max_routes_retained"));
    }

    #[test]
    fn partial_json_fills_defaults() {
        let config: EngineConfig =
            serde_json::from_str(r#"{"hub_ledger":"stellar","rng_seed":7}"#).unwrap();
        assert_eq!(config.hub_ledger, "stellar");
        assert_eq!(config.rng_seed, Some(7));
        assert_eq!(config.max_observations_per_connector, 100);
        assert_eq!(config.max_routes_retained, 1_000);
    }
}
