use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use common::{Error, Result};

/// Top-level strategy config file (TOML).
///
/// Example `config/strategies.toml`:
/// ```toml
/// [[strategy]]
/// type = "statistical_arbitrage"
/// name = "BTC/ETH spread"
/// instruments = ["BTCUSDT", "ETHUSDT"]
/// timeframe = "1h"
///
/// [strategy.params]
/// window = 20
/// z_threshold = 2.0
/// ```
///
/// The same file also carries a `[risk]` table, read by the `risk` crate.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StrategyFileConfig {
    #[serde(rename = "strategy")]
    pub strategies: Vec<StrategyConfig>,
}

/// Which decision rule a strategy instance runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    TrendFollowing,
    DualAssetMomentum,
    StatisticalArbitrage,
}

impl StrategyKind {
    /// Number of instruments the rule reads.
    pub fn instrument_count(self) -> usize {
        match self {
            StrategyKind::TrendFollowing => 1,
            StrategyKind::DualAssetMomentum | StrategyKind::StatisticalArbitrage => 2,
        }
    }
}

impl std::fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StrategyKind::TrendFollowing => write!(f, "trend_following"),
            StrategyKind::DualAssetMomentum => write!(f, "dual_asset_momentum"),
            StrategyKind::StatisticalArbitrage => write!(f, "statistical_arbitrage"),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StrategyConfig {
    #[serde(rename = "type")]
    pub kind: StrategyKind,
    /// Human-readable name shown in logs.
    pub name: String,
    /// Trading pairs, e.g. `["BTCUSDT"]`. The first is the primary leg.
    pub instruments: Vec<String>,
    /// Candle interval used for the rolling window, e.g. "1h".
    #[serde(default = "default_timeframe")]
    pub timeframe: String,
    /// Rule-specific parameters.
    #[serde(default)]
    pub params: HashMap<String, toml::Value>,
}

fn default_timeframe() -> String {
    "1h".to_string()
}

impl StrategyConfig {
    pub const DEFAULT_WINDOW: usize = 20;

    pub fn window(&self) -> Result<usize> {
        param_usize(&self.params, "window", Self::DEFAULT_WINDOW)
    }

    /// Shape checks that don't depend on the rule's own parameters.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::Config("strategy name must not be empty".into()));
        }
        let expected = self.kind.instrument_count();
        if self.instruments.len() != expected {
            return Err(Error::Config(format!(
                "strategy '{}' ({}) needs {expected} instrument(s), got {}",
                self.name,
                self.kind,
                self.instruments.len()
            )));
        }
        if self.instruments.iter().any(|i| i.trim().is_empty()) {
            return Err(Error::Config(format!(
                "strategy '{}' has an empty instrument symbol",
                self.name
            )));
        }
        if expected == 2 && self.instruments[0] == self.instruments[1] {
            return Err(Error::Config(format!(
                "strategy '{}' pairs an instrument with itself",
                self.name
            )));
        }
        if self.timeframe.trim().is_empty() {
            return Err(Error::Config(format!(
                "strategy '{}' has an empty timeframe",
                self.name
            )));
        }
        Ok(())
    }
}

impl StrategyFileConfig {
    /// Load from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Failed to read strategy config at '{path}': {e}"))
        })?;
        Self::parse(&content)
            .map_err(|e| Error::Config(format!("Invalid strategy config at '{path}': {e}")))
    }

    pub fn parse(content: &str) -> Result<Self> {
        let file: Self = toml::from_str(content).map_err(|e| Error::Config(e.to_string()))?;
        if file.strategies.is_empty() {
            return Err(Error::Config("no [[strategy]] entries configured".into()));
        }
        Ok(file)
    }

    /// Unique instruments across all strategies, in first-seen order.
    pub fn instruments(&self) -> Vec<String> {
        let mut seen = std::collections::HashSet::new();
        self.strategies
            .iter()
            .flat_map(|s| s.instruments.iter())
            .filter(|i| seen.insert(i.as_str()))
            .cloned()
            .collect()
    }
}

pub(crate) fn param_f64(params: &HashMap<String, toml::Value>, key: &str, default: f64) -> Result<f64> {
    match params.get(key) {
        None => Ok(default),
        Some(toml::Value::Float(v)) => Ok(*v),
        Some(toml::Value::Integer(v)) => Ok(*v as f64),
        Some(other) => Err(Error::Config(format!("param '{key}' must be a number, got {other}"))),
    }
}

pub(crate) fn param_usize(
    params: &HashMap<String, toml::Value>,
    key: &str,
    default: usize,
) -> Result<usize> {
    match params.get(key) {
        None => Ok(default),
        Some(toml::Value::Integer(v)) => usize::try_from(*v)
            .map_err(|_| Error::Config(format!("param '{key}' must be non-negative, got {v}"))),
        Some(other) => Err(Error::Config(format!("param '{key}' must be an integer, got {other}"))),
    }
}
