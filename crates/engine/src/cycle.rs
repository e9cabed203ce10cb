use std::sync::Arc;

use tracing::{debug, info, warn};

use common::{AccountSource, CycleEvent, Error, MarketDataSource, Result};
use risk::{Leg, PlanDecision, RiskManager};
use strategy::Strategy;

use crate::executor::PlanExecutor;

/// One evaluation of one strategy: fetch, fold, evaluate, size, execute.
///
/// Holds no per-strategy state; the rolling windows live in the strategy
/// itself, so a single cycle value serves the whole registry.
pub struct DecisionCycle {
    market: Arc<dyn MarketDataSource>,
    account: Arc<dyn AccountSource>,
    risk: RiskManager,
    executor: PlanExecutor,
    quote_asset: String,
}

impl DecisionCycle {
    pub fn new(
        market: Arc<dyn MarketDataSource>,
        account: Arc<dyn AccountSource>,
        risk: RiskManager,
        executor: PlanExecutor,
        quote_asset: impl Into<String>,
    ) -> Self {
        Self {
            market,
            account,
            risk,
            executor,
            quote_asset: quote_asset.into(),
        }
    }

    /// Always yields exactly one event. Errors before a plan exists either
    /// report warm-up, abandon the cycle (missing or inconsistent data) or
    /// fail it.
    pub async fn run(&self, strategy: &mut dyn Strategy) -> CycleEvent {
        let name = strategy.name().to_string();
        match self.evaluate_and_trade(strategy).await {
            Ok(event) => event,
            Err(Error::InsufficientSamples { needed, have }) => {
                debug!(strategy = %name, have, needed, "Strategy warming up");
                CycleEvent::WarmingUp {
                    strategy: name,
                    have,
                    needed,
                }
            }
            Err(e) if e.abandons_cycle() => {
                warn!(strategy = %name, error = %e, "Cycle abandoned");
                CycleEvent::Abandoned {
                    strategy: name,
                    reason: e.to_string(),
                }
            }
            Err(e) => CycleEvent::PlanFailed {
                strategy: name,
                reason: e.to_string(),
            },
        }
    }

    async fn evaluate_and_trade(&self, strategy: &mut dyn Strategy) -> Result<CycleEvent> {
        let name = strategy.name().to_string();
        let instruments = strategy.instruments().to_vec();

        let mut history = Vec::with_capacity(instruments.len());
        for instrument in &instruments {
            let candles = self
                .market
                .historical_candles(instrument, strategy.timeframe(), strategy.window())
                .await
                .map_err(as_data_error)?;
            history.push(candles);
        }
        strategy.observe(&history)?;

        if let Some((have, needed)) = strategy.warming_up() {
            return Err(Error::InsufficientSamples { needed, have });
        }

        let mut prices = Vec::with_capacity(instruments.len());
        for instrument in &instruments {
            let price = self
                .market
                .current_price(instrument)
                .await
                .map_err(as_data_error)?;
            prices.push(price);
        }

        let signal = strategy.evaluate(&prices);
        debug!(strategy = %name, ?prices, ?signal, "Strategy evaluated");
        if !signal.is_buy() {
            return Ok(CycleEvent::NoSignal { strategy: name });
        }

        let balance = self.account.balance(&self.quote_asset).await.map_err(|e| match e {
            Error::AccountQueryFailed(_) => e,
            other => Error::AccountQueryFailed(other.to_string()),
        })?;
        info!(strategy = %name, quote = %self.quote_asset, balance, "Buy signal; sizing against balance");

        let legs = Leg::long_primary(&instruments, &prices);
        let plan = match self.risk.plan(signal, &legs, balance) {
            PlanDecision::Skip => return Ok(CycleEvent::NoSignal { strategy: name }),
            PlanDecision::BelowMinimum {
                position_size,
                min_notional,
            } => {
                info!(strategy = %name, position_size, min_notional, "Position below minimum; no plan");
                return Ok(CycleEvent::BelowMinimum {
                    strategy: name,
                    position_size,
                    min_notional,
                });
            }
            PlanDecision::Plan(plan) => plan,
        };

        match self.executor.execute(&plan).await {
            Ok(execution) => Ok(CycleEvent::PlanExecuted {
                strategy: name,
                entries: execution.entries.len(),
                position_size: plan.sizing.position_size,
                stop_loss_price: plan.stop_loss.reference_price,
            }),
            Err(failure) => Ok(CycleEvent::PlanFailed {
                strategy: name,
                reason: failure.to_string(),
            }),
        }
    }
}

/// Anything that goes wrong while fetching market data abandons the cycle.
fn as_data_error(e: Error) -> Error {
    if e.abandons_cycle() {
        e
    } else {
        Error::DataUnavailable(e.to_string())
    }
}
