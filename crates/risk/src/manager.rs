use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use common::{Error, Result, Signal};

use crate::plan::{Leg, TradePlan};
use crate::sizer::RiskParameters;

/// User-configurable risk parameters, read from the `[risk]` table of the
/// strategy file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskConfig {
    /// Share of the quote balance committed per entry (e.g. 0.02 = 2%).
    pub risk_fraction: f64,
    /// Distance of the stop below a long entry (e.g. 0.05 = 5%).
    pub stop_loss_fraction: f64,
    /// Exchange lot size; quantities are rounded down to a multiple of it.
    pub lot_step: Option<f64>,
    /// Smallest position size worth placing, in quote currency.
    pub min_notional: f64,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            risk_fraction: 0.02,
            stop_loss_fraction: 0.05,
            lot_step: None,
            min_notional: 0.0,
        }
    }
}

#[derive(Deserialize)]
struct RiskFile {
    #[serde(default)]
    risk: RiskConfig,
}

impl RiskConfig {
    /// Read the `[risk]` table from a TOML file. Missing table means defaults.
    pub fn load(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Failed to read risk config at '{path}': {e}")))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        let file: RiskFile = toml::from_str(content).map_err(|e| Error::Config(e.to_string()))?;
        Ok(file.risk)
    }
}

/// What the risk layer made of a signal.
#[derive(Debug, Clone, PartialEq)]
pub enum PlanDecision {
    /// Signal was not a buy; nothing to do.
    Skip,
    /// Buy signal, but the sized position is too small to place.
    BelowMinimum { position_size: f64, min_notional: f64 },
    Plan(TradePlan),
}

/// Gatekeeper between the strategy layer and the plan executor.
///
/// Turns a signal and a balance into a `TradePlan`. Holds only validated,
/// read-only parameters, so one instance serves every cycle.
#[derive(Debug, Clone)]
pub struct RiskManager {
    params: RiskParameters,
    lot_step: Option<f64>,
    min_notional: f64,
}

impl RiskManager {
    /// Validate the config. Any out-of-range value is an `Error::Config`;
    /// the engine must not start with it.
    pub fn new(config: &RiskConfig) -> Result<Self> {
        let params = RiskParameters::new(config.risk_fraction, config.stop_loss_fraction)?;
        if let Some(step) = config.lot_step {
            if !(step.is_finite() && step > 0.0) {
                return Err(Error::Config(format!("lot_step must be positive, got {step}")));
            }
        }
        if !(config.min_notional.is_finite() && config.min_notional >= 0.0) {
            return Err(Error::Config(format!(
                "min_notional must be non-negative, got {}",
                config.min_notional
            )));
        }
        info!(
            risk_fraction = params.risk_fraction(),
            stop_loss_fraction = params.stop_loss_fraction(),
            lot_step = ?config.lot_step,
            min_notional = config.min_notional,
            "RiskManager configured"
        );
        Ok(Self {
            params,
            lot_step: config.lot_step,
            min_notional: config.min_notional,
        })
    }

    /// Size a signal against `balance`. Pure.
    pub fn plan(&self, signal: Signal, legs: &[Leg], balance: f64) -> PlanDecision {
        let Some(plan) = TradePlan::build(signal, legs, &self.params, balance, self.lot_step)
        else {
            return PlanDecision::Skip;
        };

        let size = plan.sizing.position_size;
        let unfillable = plan.entries.iter().any(|e| e.quantity.is_nan() || e.quantity <= 0.0);
        if size < self.min_notional || unfillable {
            debug!(position_size = size, min_notional = self.min_notional, "Plan below minimum");
            return PlanDecision::BelowMinimum {
                position_size: size,
                min_notional: self.min_notional,
            };
        }

        PlanDecision::Plan(plan)
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use common::OrderSide;

    fn btc_leg(price: f64) -> Vec<Leg> {
        vec![Leg::new("BTCUSDT", OrderSide::Buy, price)]
    }

    #[test]
    fn parses_risk_table_alongside_strategies() {
        let raw = r#"
[risk]
risk_fraction = 0.01
stop_loss_fraction = 0.03
lot_step = 0.001
min_notional = 10.0

[[strategy]]
type = "trend_following"
name = "x"
instruments = ["BTCUSDT"]
"#;
        let cfg = RiskConfig::parse(raw).unwrap();
        assert_eq!(cfg.risk_fraction, 0.01);
        assert_eq!(cfg.stop_loss_fraction, 0.03);
        assert_eq!(cfg.lot_step, Some(0.001));
        assert_eq!(cfg.min_notional, 10.0);
    }

    #[test]
    fn missing_risk_table_uses_defaults() {
        let cfg = RiskConfig::parse("").unwrap();
        assert_eq!(cfg.risk_fraction, 0.02);
        assert_eq!(cfg.stop_loss_fraction, 0.05);
    }

    #[test]
    fn refuses_out_of_range_config() {
        let bad_risk = RiskConfig { risk_fraction: 1.5, ..RiskConfig::default() };
        assert!(matches!(RiskManager::new(&bad_risk), Err(Error::Config(_))));

        let bad_stop = RiskConfig { stop_loss_fraction: 0.0, ..RiskConfig::default() };
        assert!(matches!(RiskManager::new(&bad_stop), Err(Error::Config(_))));

        let bad_lot = RiskConfig { lot_step: Some(-1.0), ..RiskConfig::default() };
        assert!(matches!(RiskManager::new(&bad_lot), Err(Error::Config(_))));

        let bad_min = RiskConfig { min_notional: -5.0, ..RiskConfig::default() };
        assert!(matches!(RiskManager::new(&bad_min), Err(Error::Config(_))));
    }

    #[test]
    fn buy_signal_becomes_plan() {
        let manager = RiskManager::new(&RiskConfig::default()).unwrap();
        match manager.plan(Signal::Buy, &btc_leg(100.0), 10_000.0) {
            PlanDecision::Plan(plan) => {
                assert!((plan.sizing.position_size - 200.0).abs() < 1e-9);
                assert!((plan.stop_loss.reference_price - 95.0).abs() < 1e-9);
            }
            other => panic!("expected a plan, got {other:?}"),
        }
    }

    #[test]
    fn no_action_is_skipped() {
        let manager = RiskManager::new(&RiskConfig::default()).unwrap();
        assert_eq!(manager.plan(Signal::NoAction, &btc_leg(100.0), 10_000.0), PlanDecision::Skip);
    }

    #[test]
    fn small_balance_is_below_minimum() {
        let manager = RiskManager::new(&RiskConfig {
            min_notional: 10.0,
            ..RiskConfig::default()
        })
        .unwrap();
        // 2% of 400 = 8 USDT < 10 USDT
        assert_eq!(
            manager.plan(Signal::Buy, &btc_leg(100.0), 400.0),
            PlanDecision::BelowMinimum { position_size: 8.0, min_notional: 10.0 }
        );
    }

    #[test]
    fn quantity_rounding_to_zero_is_below_minimum() {
        let manager = RiskManager::new(&RiskConfig {
            lot_step: Some(1.0),
            ..RiskConfig::default()
        })
        .unwrap();
        // 200 USDT buys 0.0067 of a 30k asset, which rounds to zero lots.
        assert!(matches!(
            manager.plan(Signal::Buy, &btc_leg(30_000.0), 10_000.0),
            PlanDecision::BelowMinimum { .. }
        ));
    }
}
