pub mod config;
pub mod evaluators;
pub mod indicators;
pub mod registry;

pub use config::{StrategyConfig, StrategyFileConfig, StrategyKind};
pub use evaluators::{DualAssetMomentum, StatisticalArbitrage, TrendFollowing};
pub use indicators::{RollingStatistics, RollingStats, MIN_SAMPLES};
pub use registry::StrategyRegistry;

use common::{Candle, Result, Signal};

/// All strategy implementations must satisfy this trait.
///
/// A strategy owns the rolling windows it reads; `evaluate` itself is a pure
/// function of the current prices and that window state.
pub trait Strategy: Send + Sync {
    /// Human-readable name of this strategy instance.
    fn name(&self) -> &str;

    /// Instruments this strategy reads and trades. The first is the primary leg.
    fn instruments(&self) -> &[String];

    /// Candle interval of the rolling window.
    fn timeframe(&self) -> &str;

    /// Window capacity, and how many candles a cycle fetches.
    fn window(&self) -> usize;

    /// Fold candle history into the rolling window(s).
    ///
    /// `history` holds one series per instrument, oldest first, in
    /// `instruments()` order. Bars already seen are ignored.
    fn observe(&mut self, history: &[Vec<Candle>]) -> Result<()>;

    /// `Some((have, needed))` while there are too few samples to evaluate.
    fn warming_up(&self) -> Option<(usize, usize)>;

    /// Decide on current prices, one per instrument in `instruments()` order.
    /// Returns `Signal::NoAction` whenever the inputs are incomplete.
    fn evaluate(&self, prices: &[f64]) -> Signal;
}
