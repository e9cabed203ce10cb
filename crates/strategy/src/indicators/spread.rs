use chrono::{DateTime, Utc};

use common::{Candle, Error, Result};

/// Close-to-close spread `a − b` for each synchronized bar.
///
/// Both series must have the same length and identical timestamps index by
/// index; anything else is `Error::MisalignedSeries`.
pub fn spread_series(a: &[Candle], b: &[Candle]) -> Result<Vec<(DateTime<Utc>, f64)>> {
    if a.len() != b.len() {
        return Err(Error::MisalignedSeries(format!(
            "series lengths differ: {} vs {}",
            a.len(),
            b.len()
        )));
    }

    a.iter()
        .zip(b)
        .map(|(ca, cb)| {
            if ca.timestamp != cb.timestamp {
                return Err(Error::MisalignedSeries(format!(
                    "timestamps differ: {} vs {}",
                    ca.timestamp, cb.timestamp
                )));
            }
            Ok((ca.timestamp, ca.close - cb.close))
        })
        .collect()
}
