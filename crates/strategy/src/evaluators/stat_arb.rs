use common::{Candle, Error, Result, Signal};

use super::expect_series;
use crate::config::{param_f64, StrategyConfig};
use crate::indicators::{spread_series, RollingStatistics, RollingStats, MIN_SAMPLES};
use crate::Strategy;

/// Standard deviations above the mean spread that trigger a buy.
pub const DEFAULT_Z_THRESHOLD: f64 = 2.0;

/// Deviations at or below this fraction of the mean spread's magnitude count as zero.
const NEGLIGIBLE_STD_RATIO: f64 = 1e-9;

/// Distance of `spread` from the historical mean in standard deviations.
///
/// `None` when the deviation is negligible or the result isn't finite.
pub fn z_score(spread: f64, stats: &RollingStats) -> Option<f64> {
    let floor = NEGLIGIBLE_STD_RATIO * stats.mean.abs().max(1.0);
    if !stats.std_dev.is_finite() || stats.std_dev <= floor {
        return None;
    }
    let z = (spread - stats.mean) / stats.std_dev;
    z.is_finite().then_some(z)
}

pub fn stat_arb_signal(spread: f64, stats: &RollingStats, threshold: f64) -> Signal {
    z_score(spread, stats).map_or(Signal::NoAction, |z| Signal::from(z > threshold))
}

/// Mean-reversion on the A − B spread.
pub struct StatisticalArbitrage {
    cfg: StrategyConfig,
    spreads: RollingStatistics,
    threshold: f64,
}

impl StatisticalArbitrage {
    pub fn new(cfg: StrategyConfig) -> Result<Self> {
        cfg.validate()?;
        let threshold = param_f64(&cfg.params, "z_threshold", DEFAULT_Z_THRESHOLD)?;
        if !(threshold.is_finite() && threshold > 0.0) {
            return Err(Error::Config(format!(
                "strategy '{}': z_threshold must be a positive number, got {threshold}",
                cfg.name
            )));
        }
        Ok(Self {
            spreads: RollingStatistics::new(cfg.window()?)?,
            threshold,
            cfg,
        })
    }

    pub fn spread_stats(&self) -> Option<RollingStats> {
        self.spreads.stats()
    }
}

impl Strategy for StatisticalArbitrage {
    fn name(&self) -> &str {
        &self.cfg.name
    }

    fn instruments(&self) -> &[String] {
        &self.cfg.instruments
    }

    fn timeframe(&self) -> &str {
        &self.cfg.timeframe
    }

    fn window(&self) -> usize {
        self.spreads.capacity()
    }

    fn observe(&mut self, history: &[Vec<Candle>]) -> Result<()> {
        expect_series(&self.cfg.name, history, 2)?;
        let spreads = spread_series(&history[0], &history[1])?;
        self.spreads.extend_newer(spreads);
        Ok(())
    }

    fn warming_up(&self) -> Option<(usize, usize)> {
        let have = self.spreads.len();
        (have < MIN_SAMPLES).then_some((have, MIN_SAMPLES))
    }

    fn evaluate(&self, prices: &[f64]) -> Signal {
        let ([price_a, price_b], Some(stats)) = (prices, self.spreads.stats()) else {
            return Signal::NoAction;
        };
        stat_arb_signal(price_a - price_b, &stats, self.threshold)
    }
}
