use std::collections::VecDeque;

use chrono::{DateTime, Utc};

use common::{Error, Result};

/// Fewest samples for which a standard deviation is defined.
pub const MIN_SAMPLES: usize = 2;

/// Mean and sample standard deviation of a window at one point in time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RollingStats {
    pub mean: f64,
    pub std_dev: f64,
}

impl RollingStats {
    /// Stats over a slice. `None` with fewer than `MIN_SAMPLES` values.
    pub fn from_slice(values: &[f64]) -> Option<Self> {
        Some(Self {
            mean: mean(values)?,
            std_dev: sample_std_dev(values)?,
        })
    }
}

/// Arithmetic mean. `None` for an empty slice.
///
/// Accumulates offsets from the first value, so a window of identical
/// values averages to exactly that value.
pub fn mean(values: &[f64]) -> Option<f64> {
    let (&pivot, _) = values.split_first()?;
    let offset: f64 = values.iter().map(|x| x - pivot).sum();
    Some(pivot + offset / values.len() as f64)
}

/// Sample standard deviation (N − 1 denominator).
/// `None` with fewer than `MIN_SAMPLES` values.
pub fn sample_std_dev(values: &[f64]) -> Option<f64> {
    if values.len() < MIN_SAMPLES {
        return None;
    }
    let m = mean(values)?;
    let sum_sq: f64 = values.iter().map(|x| (x - m).powi(2)).sum();
    Some((sum_sq / (values.len() - 1) as f64).sqrt())
}

/// Fixed-capacity sliding window of scalar observations.
///
/// Once full, each new value evicts the oldest. Samples folded in through
/// `extend_newer` are deduplicated by timestamp so re-fetching overlapping
/// history each cycle never double-counts a bar.
#[derive(Debug, Clone)]
pub struct RollingStatistics {
    window: VecDeque<f64>,
    capacity: usize,
    last_timestamp: Option<DateTime<Utc>>,
}

impl RollingStatistics {
    pub fn new(capacity: usize) -> Result<Self> {
        if capacity < MIN_SAMPLES {
            return Err(Error::Config(format!(
                "window size must be at least {MIN_SAMPLES}, got {capacity}"
            )));
        }
        Ok(Self {
            window: VecDeque::with_capacity(capacity),
            capacity,
            last_timestamp: None,
        })
    }

    /// Push one observation and return the refreshed stats.
    pub fn update(&mut self, value: f64) -> Option<RollingStats> {
        if self.window.len() == self.capacity {
            self.window.pop_front();
        }
        self.window.push_back(value);
        self.stats()
    }

    /// Fold timestamped samples (oldest first), skipping any not strictly
    /// newer than the last one accepted. Returns how many were accepted.
    pub fn extend_newer<I>(&mut self, samples: I) -> usize
    where
        I: IntoIterator<Item = (DateTime<Utc>, f64)>,
    {
        let mut accepted = 0;
        for (ts, value) in samples {
            if self.last_timestamp.is_some_and(|last| ts <= last) {
                continue;
            }
            self.update(value);
            self.last_timestamp = Some(ts);
            accepted += 1;
        }
        accepted
    }

    pub fn stats(&self) -> Option<RollingStats> {
        let (front, back) = self.window.as_slices();
        if back.is_empty() {
            return RollingStats::from_slice(front);
        }
        let contiguous: Vec<f64> = self.window.iter().copied().collect();
        RollingStats::from_slice(&contiguous)
    }

    /// Simple moving average over the whole window.
    pub fn moving_average(&self) -> Option<f64> {
        let pivot = *self.window.front()?;
        let offset: f64 = self.window.iter().map(|x| x - pivot).sum();
        Some(pivot + offset / self.window.len() as f64)
    }

    pub fn len(&self) -> usize {
        self.window.len()
    }

    pub fn is_empty(&self) -> bool {
        self.window.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_full(&self) -> bool {
        self.window.len() == self.capacity
    }

    pub fn values(&self) -> impl Iterator<Item = f64> + '_ {
        self.window.iter().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn filled(capacity: usize, values: &[f64]) -> RollingStatistics {
        let mut stats = RollingStatistics::new(capacity).unwrap();
        for &v in values {
            stats.update(v);
        }
        stats
    }

    #[test]
    fn rejects_window_below_two() {
        assert!(matches!(RollingStatistics::new(1), Err(Error::Config(_))));
        assert!(matches!(RollingStatistics::new(0), Err(Error::Config(_))));
        assert!(RollingStatistics::new(2).is_ok());
    }

    #[test]
    fn sample_std_dev_uses_n_minus_one() {
        let stats = filled(5, &[100.0, 105.0, 110.0, 115.0, 120.0])
            .stats()
            .unwrap();
        assert!((stats.mean - 110.0).abs() < 1e-12);
        assert!(
            (stats.std_dev - 7.905694150420948).abs() < 1e-9,
            "expected sample std 7.9057, got {}",
            stats.std_dev
        );
        // Population form would be 7.0711.
        assert!((stats.std_dev - 7.0710678).abs() > 0.5);
    }

    #[test]
    fn single_sample_has_no_stats() {
        let mut stats = RollingStatistics::new(20).unwrap();
        assert!(stats.update(42.0).is_none());
        assert_eq!(stats.moving_average(), Some(42.0));
        assert!(stats.update(43.0).is_some());
    }

    #[test]
    fn oldest_value_is_evicted_at_capacity() {
        let stats = filled(3, &[1.0, 2.0, 3.0, 4.0]);
        assert_eq!(stats.len(), 3);
        assert!(stats.is_full());
        assert_eq!(stats.values().collect::<Vec<_>>(), vec![2.0, 3.0, 4.0]);
        assert_eq!(stats.moving_average(), Some(3.0));
    }

    #[test]
    fn constant_window_has_zero_std_dev() {
        let stats = filled(4, &[7.5, 7.5, 7.5, 7.5]).stats().unwrap();
        assert_eq!(stats.mean, 7.5);
        assert_eq!(stats.std_dev, 0.0);
    }

    #[test]
    fn stats_after_wraparound_match_slice() {
        let stats = filled(4, &[1.0, 9.0, 2.0, 8.0, 3.0, 7.0]);
        let expected = RollingStats::from_slice(&[2.0, 8.0, 3.0, 7.0]).unwrap();
        assert_eq!(stats.stats(), Some(expected));
    }

    #[test]
    fn extend_newer_skips_seen_timestamps() {
        let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let bars: Vec<_> = (0..3).map(|i| (t0 + Duration::hours(i), i as f64)).collect();

        let mut stats = RollingStatistics::new(10).unwrap();
        assert_eq!(stats.extend_newer(bars.clone()), 3);
        // Same history again plus one new bar.
        let mut again = bars;
        again.push((t0 + Duration::hours(3), 3.0));
        assert_eq!(stats.extend_newer(again), 1);
        assert_eq!(stats.len(), 4);
    }
}
