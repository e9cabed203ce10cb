pub mod rolling;
pub mod spread;

pub use rolling::{mean, sample_std_dev, RollingStatistics, RollingStats, MIN_SAMPLES};
pub use spread::spread_series;
