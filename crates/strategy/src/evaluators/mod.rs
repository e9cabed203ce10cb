pub mod momentum;
pub mod stat_arb;
pub mod trend;

pub use momentum::{momentum_signal, DualAssetMomentum, MomentumInputs};
pub use stat_arb::{stat_arb_signal, z_score, StatisticalArbitrage};
pub use trend::{trend_signal, TrendFollowing};

use common::{Candle, Error, Result};

/// Checks that `observe` got one series per configured instrument.
fn expect_series(name: &str, history: &[Vec<Candle>], expected: usize) -> Result<()> {
    if history.len() != expected {
        return Err(Error::MisalignedSeries(format!(
            "strategy '{name}' expects {expected} series, got {}",
            history.len()
        )));
    }
    Ok(())
}

fn closes(series: &[Candle]) -> impl Iterator<Item = (chrono::DateTime<chrono::Utc>, f64)> + '_ {
    series.iter().map(|c| (c.timestamp, c.close))
}
