use common::{Candle, Result, Signal};

use super::{closes, expect_series};
use crate::config::StrategyConfig;
use crate::indicators::{RollingStatistics, MIN_SAMPLES};
use crate::Strategy;

/// Buy while price trades above its moving average.
pub fn trend_signal(price: f64, moving_average: f64) -> Signal {
    Signal::from(price > moving_average)
}

/// Single-instrument trend follower: one simple moving average of closes.
pub struct TrendFollowing {
    cfg: StrategyConfig,
    closes: RollingStatistics,
}

impl TrendFollowing {
    pub fn new(cfg: StrategyConfig) -> Result<Self> {
        cfg.validate()?;
        let closes = RollingStatistics::new(cfg.window()?)?;
        Ok(Self { cfg, closes })
    }

    pub fn moving_average(&self) -> Option<f64> {
        self.closes.moving_average()
    }
}

impl Strategy for TrendFollowing {
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
        self.closes.capacity()
    }

    fn observe(&mut self, history: &[Vec<Candle>]) -> Result<()> {
        expect_series(&self.cfg.name, history, 1)?;
        self.closes.extend_newer(closes(&history[0]));
        Ok(())
    }

    fn warming_up(&self) -> Option<(usize, usize)> {
        let have = self.closes.len();
        (have < MIN_SAMPLES).then_some((have, MIN_SAMPLES))
    }

    fn evaluate(&self, prices: &[f64]) -> Signal {
        if self.warming_up().is_some() {
            return Signal::NoAction;
        }
        match (prices.first(), self.moving_average()) {
            (Some(&price), Some(ma)) => trend_signal(price, ma),
            _ => Signal::NoAction,
        }
    }
}
