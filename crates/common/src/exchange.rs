use async_trait::async_trait;

use crate::{Candle, OrderConfirmation, OrderIntent, Result};

/// Price source for the decision cycle and the backtest bootstrap.
///
/// `BinanceClient` implements this for live trading, `PaperClient` for
/// simulation and tests. Both fail with `Error::DataUnavailable` when the
/// exchange cannot be reached or the symbol is unknown.
#[async_trait]
pub trait MarketDataSource: Send + Sync {
    /// Latest traded price for an instrument.
    async fn current_price(&self, instrument: &str) -> Result<f64>;

    /// The most recent `count` candles, oldest first.
    async fn historical_candles(
        &self,
        instrument: &str,
        timeframe: &str,
        count: usize,
    ) -> Result<Vec<Candle>>;
}

/// Account balance lookup. Fails with `Error::AccountQueryFailed`.
#[async_trait]
pub trait AccountSource: Send + Sync {
    async fn balance(&self, asset: &str) -> Result<f64>;
}

/// Order submission.
///
/// Only `PlanExecutor` in `crates/engine` should hold a `dyn OrderSink`.
/// Exchange-side rejections surface as `Error::OrderRejected`.
#[async_trait]
pub trait OrderSink: Send + Sync {
    async fn submit(&self, intent: &OrderIntent) -> Result<OrderConfirmation>;
}
