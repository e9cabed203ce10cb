use common::Signal;
use proptest::prelude::*;
use strategy::evaluators::{stat_arb_signal, trend_signal};
use strategy::indicators::{sample_std_dev, RollingStatistics, RollingStats};

proptest! {
    /// A window of N equal values averages to exactly that value.
    #[test]
    fn moving_average_of_constant_window_is_exact(
        value in -1_000_000.0f64..1_000_000.0f64,
        n in 2usize..64,
    ) {
        let mut stats = RollingStatistics::new(n).unwrap();
        for _ in 0..n {
            stats.update(value);
        }
        prop_assert_eq!(stats.moving_average(), Some(value));
    }

    /// Identical samples give zero deviation, and the spread rule never fires on them.
    #[test]
    fn constant_spread_never_signals(
        value in -10_000.0f64..10_000.0f64,
        n in 2usize..40,
        spread in -1e12f64..1e12f64,
    ) {
        let mut stats = RollingStatistics::new(n).unwrap();
        for _ in 0..n {
            stats.update(value);
        }
        let s = stats.stats().unwrap();
        prop_assert_eq!(s.std_dev, 0.0);
        prop_assert_eq!(stat_arb_signal(spread, &s, 2.0), Signal::NoAction);
    }

    /// Window length never exceeds capacity and holds the most recent values.
    #[test]
    fn window_keeps_latest_values(
        values in prop::collection::vec(-1e6f64..1e6f64, 0..200),
        capacity in 2usize..50,
    ) {
        let mut stats = RollingStatistics::new(capacity).unwrap();
        for &v in &values {
            stats.update(v);
            prop_assert!(stats.len() <= capacity);
        }
        let start = values.len().saturating_sub(capacity);
        prop_assert_eq!(stats.values().collect::<Vec<_>>(), values[start..].to_vec());
    }

    /// Sample variance is the population variance scaled by N / (N − 1).
    #[test]
    fn sample_std_dev_exceeds_population_form(
        values in prop::collection::vec(-1e3f64..1e3f64, 2..50),
    ) {
        let n = values.len() as f64;
        let m = values.iter().sum::<f64>() / n;
        let pop_var = values.iter().map(|x| (x - m).powi(2)).sum::<f64>() / n;
        let sample = sample_std_dev(&values).unwrap();
        let expected = (pop_var * n / (n - 1.0)).sqrt();
        prop_assert!((sample - expected).abs() <= 1e-6 * expected.max(1.0));
    }

    /// Evaluation never panics and never signals on non-finite statistics.
    #[test]
    fn rules_are_total(price in prop::num::f64::ANY, mean in prop::num::f64::ANY, std_dev in prop::num::f64::ANY) {
        let _ = trend_signal(price, mean);
        let signal = stat_arb_signal(price, &RollingStats { mean, std_dev }, 2.0);
        if !std_dev.is_finite() || std_dev == 0.0 {
            prop_assert_eq!(signal, Signal::NoAction);
        }
    }
}
