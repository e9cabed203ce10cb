use serde::{Deserialize, Serialize};

use common::{OrderIntent, OrderSide, Signal};

use crate::sizer::{base_quantity, floor_to_lot, position_size, stop_loss_price, RiskParameters};

/// One instrument a plan enters, with the price it was evaluated at.
#[derive(Debug, Clone, PartialEq)]
pub struct Leg {
    pub instrument: String,
    pub side: OrderSide,
    pub price: f64,
}

impl Leg {
    pub fn new(instrument: impl Into<String>, side: OrderSide, price: f64) -> Self {
        Self {
            instrument: instrument.into(),
            side,
            price,
        }
    }

    /// Legs for a strategy's instruments: long the primary, short any hedge.
    pub fn long_primary(instruments: &[String], prices: &[f64]) -> Vec<Leg> {
        instruments
            .iter()
            .zip(prices)
            .enumerate()
            .map(|(i, (instrument, &price))| {
                let side = if i == 0 { OrderSide::Buy } else { OrderSide::Sell };
                Leg::new(instrument.clone(), side, price)
            })
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sizing {
    /// Quote-currency amount per leg.
    pub position_size: f64,
}

/// Everything one decision cycle hands to the order sink.
///
/// Built fresh per cycle and never mutated. Entries are submitted in order;
/// the stop-loss only after every entry is confirmed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradePlan {
    pub entries: Vec<OrderIntent>,
    pub stop_loss: OrderIntent,
    pub sizing: Sizing,
    #[serde(default)]
    pub lot_step: Option<f64>,
}

impl TradePlan {
    /// Assemble a plan. `None` unless the signal is `Buy` and there is at
    /// least one leg. Pure: equal inputs give equal plans.
    pub fn build(
        signal: Signal,
        legs: &[Leg],
        params: &RiskParameters,
        balance: f64,
        lot_step: Option<f64>,
    ) -> Option<Self> {
        if !signal.is_buy() {
            return None;
        }
        let primary = legs.first()?;
        let size = position_size(balance, params.risk_fraction());

        let entries: Vec<OrderIntent> = legs
            .iter()
            .map(|leg| {
                OrderIntent::market(
                    leg.instrument.clone(),
                    leg.side,
                    base_quantity(size, leg.price, lot_step),
                    leg.price,
                )
            })
            .collect();

        let stop_loss = OrderIntent::stop_loss(
            primary.instrument.clone(),
            primary.side.opposite(),
            entries[0].quantity,
            stop_loss_price(primary.price, params.stop_loss_fraction(), primary.side),
        );

        Some(Self {
            entries,
            stop_loss,
            sizing: Sizing {
                position_size: size,
            },
            lot_step,
        })
    }

    pub fn primary(&self) -> &OrderIntent {
        &self.entries[0]
    }

    /// The stop-loss resized to what the primary entry actually left in the
    /// account. Never larger than planned.
    pub fn stop_loss_for(&self, filled_quantity: f64) -> OrderIntent {
        let held = floor_to_lot(filled_quantity, self.lot_step);
        let mut stop = self.stop_loss.clone();
        if held.is_finite() && held >= 0.0 && held < stop.quantity {
            stop.quantity = held;
        }
        stop
    }
}
