pub mod csv_source;
pub mod runner;

pub use csv_source::{load_candles, read_candles};
pub use runner::{profit_factor, BacktestResult, BacktestRunner};
