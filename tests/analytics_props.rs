//! Property tests for the portfolio analytics used by the dashboard and
//! backtest reports.

mod common;

use common::*;
use proptest::prelude::*;
use std::collections::HashMap;
use stockport::domain::analytics::{cumulative_returns, drawdown_series, max_drawdown, simple_returns};
use stockport::domain::dashboard::build_dashboard;
use stockport::domain::interval::{Interval, resample};
use stockport::domain::portfolio::Portfolio;

fn prices() -> impl Strategy<Value = Vec<f64>> {
    prop::collection::vec(1.0f64..500.0, 2..120)
}

proptest! {
    #[test]
    fn drawdown_is_never_positive(values in prices()) {
        let dd = drawdown_series(&values);
        prop_assert_eq!(dd.len(), values.len());
        prop_assert!(dd.iter().all(|d| *d <= 0.0 && *d > -1.0));
        prop_assert_eq!(dd[0], 0.0);
    }

    #[test]
    fn max_drawdown_matches_the_deepest_point(values in prices()) {
        let (max_dd, duration) = max_drawdown(&values);
        let deepest = drawdown_series(&values).into_iter().fold(0.0f64, f64::min);
        prop_assert!((max_dd + deepest).abs() < 1e-12);
        prop_assert!(duration < values.len());
    }

    #[test]
    fn compounding_recovers_the_price_ratio(values in prices()) {
        let growth = cumulative_returns(&simple_returns(&values));
        let expected = values[values.len() - 1] / values[0];
        let last = growth.last().copied().unwrap_or(1.0);
        prop_assert!((last - expected).abs() <= 1e-9 * expected.max(1.0));
    }

    #[test]
    fn normalized_weights_sum_to_one(
        weights in prop::collection::vec(0.01f64..10.0, 1..6),
        take in 1usize..6,
    ) {
        let holdings: Vec<(String, f64)> = weights
            .iter()
            .enumerate()
            .map(|(i, w)| (format!("S{i}"), *w))
            .collect();
        let portfolio = Portfolio::new("p", holdings.clone()).unwrap();
        let selected: Vec<String> = holdings.iter().take(take).map(|(s, _)| s.clone()).collect();
        let total: f64 = portfolio.weights_for(&selected).values().sum();
        prop_assert!((total - 1.0).abs() < 1e-9);
    }

    #[test]
    fn weekly_resample_preserves_extremes(closes in prop::collection::vec(1.0f64..500.0, 1..90)) {
        let bars = bars_from("AAA", "2024-01-01", closes.len(), |i| closes[i]);
        let weekly = resample(&bars, Interval::Weekly);
        prop_assert!(weekly.len() <= bars.len());
        prop_assert_eq!(weekly.iter().map(|b| b.volume).sum::<i64>(), bars.iter().map(|b| b.volume).sum::<i64>());
        let max_high = bars.iter().map(|b| b.high).fold(f64::MIN, f64::max);
        prop_assert_eq!(weekly.iter().map(|b| b.high).fold(f64::MIN, f64::max), max_high);
        prop_assert_eq!(weekly.last().map(|b| b.close), bars.last().map(|b| b.close));
    }

    #[test]
    fn dashboard_growth_starts_at_one(
        a in prop::collection::vec(1.0f64..500.0, 2..60),
        b in prop::collection::vec(1.0f64..500.0, 2..60),
    ) {
        let series = vec![
            series("AAA", bars_from("AAA", "2024-01-01", a.len(), |i| a[i])),
            series("BBB", bars_from("BBB", "2024-01-01", b.len(), |i| b[i])),
        ];
        let weights: HashMap<String, f64> =
            [("AAA".to_string(), 0.5), ("BBB".to_string(), 0.5)].into_iter().collect();
        let report = build_dashboard(&series, &weights, Interval::Daily, 0.0, 3);

        prop_assert_eq!(report.growth[0], 1.0);
        prop_assert_eq!(report.growth.len(), report.dates.len());
        prop_assert!(report.drawdown.iter().all(|d| *d <= 0.0));
        prop_assert!(report.stats.max_drawdown >= 0.0);
    }
}
