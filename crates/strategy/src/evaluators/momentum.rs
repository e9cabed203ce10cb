use common::{Candle, Result, Signal};

use super::{closes, expect_series};
use crate::config::StrategyConfig;
use crate::indicators::{RollingStatistics, MIN_SAMPLES};
use crate::Strategy;

/// Current prices and short-window averages of instruments A and B.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MomentumInputs {
    pub price_a: f64,
    pub price_b: f64,
    pub ma_a: f64,
    pub ma_b: f64,
}

impl MomentumInputs {
    /// Distance of A above its own average.
    pub fn recent_change(&self) -> f64 {
        self.price_a - self.ma_a
    }
}

/// Buy only when A leads B on price and on average, and A is above its average.
pub fn momentum_signal(inputs: &MomentumInputs) -> Signal {
    Signal::from(
        inputs.price_a > inputs.price_b
            && inputs.ma_a > inputs.ma_b
            && inputs.recent_change() > 0.0,
    )
}

/// Long A / short B when A shows stronger momentum than B.
///
/// Never emits an exit; positions are closed by the stop-loss order.
pub struct DualAssetMomentum {
    cfg: StrategyConfig,
    closes_a: RollingStatistics,
    closes_b: RollingStatistics,
}

impl DualAssetMomentum {
    pub fn new(cfg: StrategyConfig) -> Result<Self> {
        cfg.validate()?;
        let window = cfg.window()?;
        Ok(Self {
            closes_a: RollingStatistics::new(window)?,
            closes_b: RollingStatistics::new(window)?,
            cfg,
        })
    }

    fn inputs(&self, prices: &[f64]) -> Option<MomentumInputs> {
        match prices {
            [price_a, price_b] => Some(MomentumInputs {
                price_a: *price_a,
                price_b: *price_b,
                ma_a: self.closes_a.moving_average()?,
                ma_b: self.closes_b.moving_average()?,
            }),
            _ => None,
        }
    }
}

impl Strategy for DualAssetMomentum {
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
        self.closes_a.capacity()
    }

    fn observe(&mut self, history: &[Vec<Candle>]) -> Result<()> {
        expect_series(&self.cfg.name, history, 2)?;
        self.closes_a.extend_newer(closes(&history[0]));
        self.closes_b.extend_newer(closes(&history[1]));
        Ok(())
    }

    fn warming_up(&self) -> Option<(usize, usize)> {
        let (a, b) = (self.closes_a.len(), self.closes_b.len());
        let have = a.min(b);
        if have < MIN_SAMPLES {
            Some((have, MIN_SAMPLES))
        } else if a != b {
            // Averages over different spans aren't comparable yet.
            Some((have, a.max(b)))
        } else {
            None
        }
    }

    fn evaluate(&self, prices: &[f64]) -> Signal {
        if self.warming_up().is_some() {
            return Signal::NoAction;
        }
        self.inputs(prices)
            .map_or(Signal::NoAction, |inputs| momentum_signal(&inputs))
    }
}
