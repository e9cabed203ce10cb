use serde::Serialize;
use tracing::debug;

use common::{Candle, Error, Result};
use strategy::indicators::{RollingStatistics, MIN_SAMPLES};

/// Summary of one replay pass. Counts only grow during the pass.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct BacktestResult {
    pub total_trades: usize,
    pub winning_trades: usize,
    pub losing_trades: usize,
    /// `winning / losing`, or `winning` itself when there were no losses.
    /// Compare runs with `losing_trades == 0` separately.
    pub profit_factor: f64,
    /// Bars whose trailing mean return wasn't finite (zero prior close).
    pub skipped_bars: usize,
}

impl BacktestResult {
    fn record(&mut self, mean_return: f64) {
        if !mean_return.is_finite() {
            self.skipped_bars += 1;
            return;
        }
        if mean_return > 0.0 {
            self.winning_trades += 1;
        } else if mean_return < 0.0 {
            self.losing_trades += 1;
        }
        self.total_trades += 1;
    }

    fn finish(mut self) -> Self {
        self.profit_factor = profit_factor(self.winning_trades, self.losing_trades);
        self
    }
}

impl std::fmt::Display for BacktestResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Total trades:   {}", self.total_trades)?;
        writeln!(f, "Winning trades: {}", self.winning_trades)?;
        writeln!(f, "Losing trades:  {}", self.losing_trades)?;
        write!(f, "Profit factor:  {:.2}", self.profit_factor)?;
        if self.losing_trades == 0 {
            write!(f, " (no losing trades)")?;
        }
        if self.skipped_bars > 0 {
            write!(f, "\nSkipped bars:   {}", self.skipped_bars)?;
        }
        Ok(())
    }
}

/// Ratio of winning to losing counts. With no losses, the win count itself.
pub fn profit_factor(winning: usize, losing: usize) -> f64 {
    if losing > 0 {
        winning as f64 / losing as f64
    } else {
        winning as f64
    }
}

/// Replays a candle series bar by bar and classifies each bar by the mean of
/// its trailing `window` close-to-close returns.
///
/// Places no orders and sizes nothing; it is a statistics pass over history.
#[derive(Debug, Clone)]
pub struct BacktestRunner {
    window: usize,
    returns: RollingStatistics,
}

impl BacktestRunner {
    pub fn new(window: usize) -> Result<Self> {
        if window < MIN_SAMPLES {
            return Err(Error::Config(format!(
                "backtest window must be at least {MIN_SAMPLES}, got {window}"
            )));
        }
        Ok(Self {
            window,
            returns: RollingStatistics::new(window)?,
        })
    }

    pub fn window(&self) -> usize {
        self.window
    }

    /// Bars `window..len` are each classified once; shorter series produce
    /// an empty result.
    pub fn run(&self, candles: &[Candle]) -> BacktestResult {
        let mut returns = self.returns.clone();
        let mut result = BacktestResult::default();

        for pair in candles.windows(2) {
            let (prev, curr) = (pair[0].close, pair[1].close);
            returns.update((curr - prev) / prev);

            if !returns.is_full() {
                continue;
            }
            if let Some(mean_return) = returns.moving_average() {
                if !mean_return.is_finite() {
                    debug!(timestamp = %pair[1].timestamp, "Skipping bar with non-finite mean return");
                }
                result.record(mean_return);
            }
        }

        result.finish()
    }
}
