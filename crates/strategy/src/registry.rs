use tracing::info;

use common::Result;

use crate::config::{StrategyConfig, StrategyFileConfig, StrategyKind};
use crate::evaluators::{DualAssetMomentum, StatisticalArbitrage, TrendFollowing};
use crate::Strategy;

/// Holds all active strategy instances in configuration order.
pub struct StrategyRegistry {
    strategies: Vec<Box<dyn Strategy>>,
}

impl StrategyRegistry {
    /// Build the registry from config. Any invalid entry fails the whole load.
    pub fn from_config(file_cfg: &StrategyFileConfig) -> Result<Self> {
        let mut strategies: Vec<Box<dyn Strategy>> = Vec::with_capacity(file_cfg.strategies.len());

        for cfg in &file_cfg.strategies {
            let strategy = build_strategy(cfg)?;
            info!(
                name = %strategy.name(),
                kind = %cfg.kind,
                instruments = ?strategy.instruments(),
                window = strategy.window(),
                "Registered strategy"
            );
            strategies.push(strategy);
        }

        Ok(Self { strategies })
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Box<dyn Strategy>> {
        self.strategies.iter_mut()
    }

    pub fn iter(&self) -> impl Iterator<Item = &dyn Strategy> {
        self.strategies.iter().map(|s| s.as_ref())
    }

    pub fn get(&self, name: &str) -> Option<&dyn Strategy> {
        self.iter().find(|s| s.name() == name)
    }

    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }
}

// ─── Strategy builders ────────────────────────────────────────────────────────

pub fn build_strategy(cfg: &StrategyConfig) -> Result<Box<dyn Strategy>> {
    Ok(match cfg.kind {
        StrategyKind::TrendFollowing => Box::new(TrendFollowing::new(cfg.clone())?),
        StrategyKind::DualAssetMomentum => Box::new(DualAssetMomentum::new(cfg.clone())?),
        StrategyKind::StatisticalArbitrage => Box::new(StatisticalArbitrage::new(cfg.clone())?),
    })
}
