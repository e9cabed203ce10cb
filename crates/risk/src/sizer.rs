use common::{Error, OrderSide, Result};

/// Validated risk fractions. Read-only once built.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RiskParameters {
    risk_fraction: f64,
    stop_loss_fraction: f64,
}

impl RiskParameters {
    /// Both fractions must lie in (0, 1]. Out-of-range values are rejected,
    /// never clamped.
    pub fn new(risk_fraction: f64, stop_loss_fraction: f64) -> Result<Self> {
        check_fraction("risk_fraction", risk_fraction)?;
        check_fraction("stop_loss_fraction", stop_loss_fraction)?;
        Ok(Self {
            risk_fraction,
            stop_loss_fraction,
        })
    }

    pub fn risk_fraction(&self) -> f64 {
        self.risk_fraction
    }

    pub fn stop_loss_fraction(&self) -> f64 {
        self.stop_loss_fraction
    }
}

fn check_fraction(name: &str, value: f64) -> Result<()> {
    if value > 0.0 && value <= 1.0 {
        Ok(())
    } else {
        Err(Error::Config(format!("{name} must be in (0, 1], got {value}")))
    }
}

/// Quote-currency amount put at risk on one entry.
pub fn position_size(account_balance: f64, risk_fraction: f64) -> f64 {
    account_balance * risk_fraction
}

/// Protective exit price for an entry on `side`: below a long, above a short.
pub fn stop_loss_price(entry_price: f64, stop_loss_fraction: f64, side: OrderSide) -> f64 {
    match side {
        OrderSide::Buy => entry_price * (1.0 - stop_loss_fraction),
        OrderSide::Sell => entry_price * (1.0 + stop_loss_fraction),
    }
}

/// Base-asset quantity buying `position_size` of quote at `price`,
/// rounded down to a multiple of `lot_step` when one is given.
pub fn base_quantity(position_size: f64, price: f64, lot_step: Option<f64>) -> f64 {
    if price.is_nan() || price <= 0.0 {
        return 0.0;
    }
    floor_to_lot(position_size / price, lot_step)
}

/// Round `quantity` down to a multiple of `lot_step` when one is given.
pub fn floor_to_lot(quantity: f64, lot_step: Option<f64>) -> f64 {
    match lot_step {
        // The epsilon keeps exact multiples like 0.3 / 0.1 from flooring a step short.
        Some(step) if step > 0.0 => ((quantity / step) + 1e-9).floor() * step,
        _ => quantity,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fractions_outside_unit_interval_are_rejected() {
        for bad in [0.0, -0.1, 1.01, f64::NAN, f64::INFINITY] {
            assert!(matches!(RiskParameters::new(bad, 0.05), Err(Error::Config(_))), "{bad}");
            assert!(matches!(RiskParameters::new(0.02, bad), Err(Error::Config(_))), "{bad}");
        }
        assert!(RiskParameters::new(1.0, 1.0).is_ok());
    }

    #[test]
    fn position_is_balance_times_fraction() {
        assert!((position_size(10_000.0, 0.02) - 200.0).abs() < 1e-9);
        assert_eq!(position_size(0.0, 0.02), 0.0);
    }

    #[test]
    fn stop_sits_below_long_and_above_short() {
        assert!((stop_loss_price(100.0, 0.05, OrderSide::Buy) - 95.0).abs() < 1e-9);
        assert!((stop_loss_price(100.0, 0.05, OrderSide::Sell) - 105.0).abs() < 1e-9);
    }

    #[test]
    fn quantity_rounds_down_to_lot() {
        // 200 USDT at 30_000 = 0.006666… BTC
        let q = base_quantity(200.0, 30_000.0, Some(0.001));
        assert!((q - 0.006).abs() < 1e-12, "got {q}");
        let exact = base_quantity(30.0, 100.0, Some(0.1));
        assert!((exact - 0.3).abs() < 1e-12, "got {exact}");
        assert!((base_quantity(200.0, 30_000.0, None) - 200.0 / 30_000.0).abs() < 1e-15);
    }

    #[test]
    fn fill_net_of_fees_floors_to_lot() {
        // 0.5 BTC bought, 0.1% fee taken in BTC
        let q = floor_to_lot(0.4995, Some(0.001));
        assert!((q - 0.499).abs() < 1e-12, "got {q}");
        assert_eq!(floor_to_lot(0.4995, None), 0.4995);
    }

    #[test]
    fn zero_price_gives_zero_quantity() {
        assert_eq!(base_quantity(200.0, 0.0, None), 0.0);
        assert_eq!(base_quantity(200.0, f64::NAN, None), 0.0);
    }
}
