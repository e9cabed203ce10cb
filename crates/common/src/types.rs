use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One OHLCV bar. Immutable once observed.
///
/// Live prices that arrive without a full bar are represented with
/// `Candle::point`, which sets open/high/low to the close and volume to zero.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Candle {
    pub fn point(timestamp: DateTime<Utc>, price: f64) -> Self {
        Self {
            timestamp,
            open: price,
            high: price,
            low: price,
            close: price,
            volume: 0.0,
        }
    }
}

/// Side of a trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    pub fn opposite(self) -> Self {
        match self {
            OrderSide::Buy => OrderSide::Sell,
            OrderSide::Sell => OrderSide::Buy,
        }
    }
}

impl std::fmt::Display for OrderSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderSide::Buy => write!(f, "BUY"),
            OrderSide::Sell => write!(f, "SELL"),
        }
    }
}

/// How the exchange should treat an intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderKind {
    /// Fill now at market; `reference_price` is the price the plan was sized on.
    Market,
    /// Resting protective exit triggered at `reference_price`.
    StopLoss,
}

/// A request to trade. Not a fill: fulfilment belongs to the `OrderSink`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderIntent {
    pub instrument: String,
    pub side: OrderSide,
    /// Base-asset units.
    pub quantity: f64,
    pub reference_price: f64,
    pub kind: OrderKind,
}

impl OrderIntent {
    pub fn market(
        instrument: impl Into<String>,
        side: OrderSide,
        quantity: f64,
        reference_price: f64,
    ) -> Self {
        Self {
            instrument: instrument.into(),
            side,
            quantity,
            reference_price,
            kind: OrderKind::Market,
        }
    }

    pub fn stop_loss(
        instrument: impl Into<String>,
        side: OrderSide,
        quantity: f64,
        stop_price: f64,
    ) -> Self {
        Self {
            instrument: instrument.into(),
            side,
            quantity,
            reference_price: stop_price,
            kind: OrderKind::StopLoss,
        }
    }
}

/// Confirmation returned by the exchange for an accepted order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderConfirmation {
    pub order_id: String,
    pub instrument: String,
    pub side: OrderSide,
    /// Fill price for market orders, trigger price for resting stops.
    pub price: f64,
    pub quantity: f64,
    pub timestamp: DateTime<Utc>,
}

/// Outcome of one strategy evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum Signal {
    Buy,
    #[default]
    NoAction,
}

impl Signal {
    pub fn is_buy(self) -> bool {
        self == Signal::Buy
    }
}

impl From<bool> for Signal {
    fn from(buy: bool) -> Self {
        if buy {
            Signal::Buy
        } else {
            Signal::NoAction
        }
    }
}

/// Whether the bot is running against the real exchange or simulating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradingMode {
    Live,
    Paper,
}

impl std::fmt::Display for TradingMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TradingMode::Live => write!(f, "live"),
            TradingMode::Paper => write!(f, "paper"),
        }
    }
}

/// Reason an order was refused by the exchange.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RejectionReason {
    InsufficientBalance,
    UnknownInstrument,
    Exchange(String),
    Other(String),
}

impl std::fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RejectionReason::InsufficientBalance => write!(f, "insufficient balance"),
            RejectionReason::UnknownInstrument => write!(f, "unknown instrument"),
            RejectionReason::Exchange(s) => write!(f, "exchange: {s}"),
            RejectionReason::Other(s) => write!(f, "{s}"),
        }
    }
}

/// Current state of the trading engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum EngineState {
    #[default]
    Stopped,
    Running,
    Paused,
}

impl std::fmt::Display for EngineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineState::Stopped => write!(f, "stopped"),
            EngineState::Running => write!(f, "running"),
            EngineState::Paused => write!(f, "paused"),
        }
    }
}

/// Commands sent to the engine via the command channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineCommand {
    Start,
    Stop,
    Pause,
    Resume,
    /// Run one decision cycle for every registered strategy.
    Tick,
}

/// What happened in one decision cycle. Every cycle produces exactly one.
#[derive(Debug, Clone, PartialEq)]
pub enum CycleEvent {
    /// Evaluated cleanly, no trade.
    NoSignal { strategy: String },
    /// Fewer samples than the strategy needs; expected during start-up.
    WarmingUp { strategy: String, have: usize, needed: usize },
    /// Couldn't evaluate: data missing or inconsistent. No plan was built.
    Abandoned { strategy: String, reason: String },
    /// Buy signal, but the sized position is under the exchange minimum.
    BelowMinimum {
        strategy: String,
        position_size: f64,
        min_notional: f64,
    },
    /// Every entry and the stop-loss were accepted.
    PlanExecuted {
        strategy: String,
        entries: usize,
        position_size: f64,
        stop_loss_price: f64,
    },
    /// Balance query or an order submission failed.
    PlanFailed { strategy: String, reason: String },
}

impl CycleEvent {
    pub fn strategy(&self) -> &str {
        match self {
            CycleEvent::NoSignal { strategy }
            | CycleEvent::WarmingUp { strategy, .. }
            | CycleEvent::Abandoned { strategy, .. }
            | CycleEvent::BelowMinimum { strategy, .. }
            | CycleEvent::PlanExecuted { strategy, .. }
            | CycleEvent::PlanFailed { strategy, .. } => strategy,
        }
    }
}

impl std::fmt::Display for CycleEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CycleEvent::NoSignal { strategy } => write!(f, "[{strategy}] no signal"),
            CycleEvent::WarmingUp {
                strategy,
                have,
                needed,
            } => write!(f, "[{strategy}] warming up ({have}/{needed} samples)"),
            CycleEvent::Abandoned { strategy, reason } => {
                write!(f, "[{strategy}] cycle abandoned: {reason}")
            }
            CycleEvent::BelowMinimum {
                strategy,
                position_size,
                min_notional,
            } => write!(
                f,
                "[{strategy}] position size {position_size:.2} below minimum {min_notional:.2}"
            ),
            CycleEvent::PlanExecuted {
                strategy,
                entries,
                position_size,
                stop_loss_price,
            } => write!(
                f,
                "[{strategy}] {entries} entry order(s) placed, size {position_size:.2}, stop at {stop_loss_price:.4}"
            ),
            CycleEvent::PlanFailed { strategy, reason } => {
                write!(f, "[{strategy}] plan failed: {reason}")
            }
        }
    }
}
