pub mod binance;
pub mod cycle;
pub mod executor;
pub mod lifecycle;

pub use binance::BinanceClient;
pub use cycle::DecisionCycle;
pub use executor::{Execution, ExecutionFailure, PlanExecutor};
pub use lifecycle::{spawn_ticker, Engine, EngineHandle};
