pub mod manager;
pub mod plan;
pub mod sizer;

pub use manager::{PlanDecision, RiskConfig, RiskManager};
pub use plan::{Leg, Sizing, TradePlan};
pub use sizer::{base_quantity, floor_to_lot, position_size, stop_loss_price, RiskParameters};
