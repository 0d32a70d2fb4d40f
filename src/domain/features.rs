//! Technical-indicator feature rows for the direction classifier.

use chrono::NaiveDate;

use super::indicators;
use super::ml::LatestRow;
use super::ml::dataset::Dataset;
use super::price_series::PriceSeries;

pub const FEATURE_NAMES: [&str; 9] = [
    "ret_1",
    "ret_5",
    "sma_10_gap",
    "sma_5_20_spread",
    "rsi_14",
    "macd_hist",
    "bb_pct_b",
    "volatility_10",
    "volume_ratio_20",
];

pub fn feature_names() -> Vec<String> {
    FEATURE_NAMES.iter().map(|s| s.to_string()).collect()
}

/// Complete feature vector for one bar.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureRow {
    /// Index of the bar in its series.
    pub index: usize,
    pub date: NaiveDate,
    pub values: Vec<f64>,
    /// `None` on the final bar, which has no next close.
    pub label: Option<f64>,
}

fn gap(a: Option<f64>, b: Option<f64>) -> Option<f64> {
    let (a, b) = (a?, b?);
    (b != 0.0).then(|| a / b - 1.0)
}

/// Feature rows for every bar whose indicators have all warmed up.
pub fn symbol_features(series: &PriceSeries) -> Vec<FeatureRow> {
    let closes = series.closes();
    let volumes: Vec<f64> = series.bars.iter().map(|b| b.volume as f64).collect();
    let n = closes.len();

    let ret_1 = indicators::roc(&closes, 1);
    let ret_5 = indicators::roc(&closes, 5);
    let sma_5 = indicators::sma(&closes, 5);
    let sma_10 = indicators::sma(&closes, 10);
    let sma_20 = indicators::sma(&closes, 20);
    let rsi_14 = indicators::rsi(&closes, 14);
    let macd = indicators::macd(&closes, 12, 26, 9);
    let pct_b = indicators::bollinger_pct_b(&closes, 20, 2.0);
    let vol_10 = indicators::rolling_return_std(&closes, 10);
    let volume_ratio = indicators::ratio_to_sma(&volumes, 20);

    let mut rows = Vec::new();
    for i in 0..n {
        let close = closes[i];
        let values = [
            ret_1[i],
            ret_5[i],
            gap(Some(close), sma_10[i]),
            gap(sma_5[i], sma_20[i]),
            rsi_14[i].map(|v| v / 100.0),
            macd.histogram[i].and_then(|h| (close != 0.0).then(|| h / close)),
            pct_b[i],
            vol_10[i],
            volume_ratio[i],
        ];
        let Some(values) = values.into_iter().collect::<Option<Vec<f64>>>() else {
            continue;
        };
        let label = (i + 1 < n).then(|| if closes[i + 1] > close { 1.0 } else { 0.0 });
        rows.push(FeatureRow {
            index: i,
            date: series.bars[i].date,
            values,
            label,
        });
    }
    rows
}

/// Pools labelled rows of every series into one dataset and collects each
/// symbol's final unlabelled row.
pub fn build_dataset(series: &[PriceSeries]) -> (Dataset, Vec<LatestRow>) {
    let mut dataset = Dataset::new(feature_names());
    let mut latest = Vec::new();
    for s in series {
        for row in symbol_features(s) {
            match row.label {
                Some(label) => dataset.push(&s.symbol, row.date, row.values, label),
                None => latest.push(LatestRow {
                    symbol: s.symbol.clone(),
                    date: row.date,
                    features: row.values,
                }),
            }
        }
    }
    dataset.sort_chronologically();
    (dataset, latest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ohlcv::OhlcvBar;

    fn wavy_series(n: usize) -> PriceSeries {
        let start = NaiveDate::from_ymd_opt(2023, 1, 1).unwrap();
        let bars = (0..n)
            .map(|i| {
                let c = 100.0 + (i as f64 * 0.4).sin() * 5.0 + i as f64 * 0.1;
                OhlcvBar {
                    symbol: "AAPL".into(),
                    date: start + chrono::Duration::days(i as i64),
                    open: c - 0.5,
                    high: c + 1.0,
                    low: c - 1.0,
                    close: c,
                    volume: 1_000 + (i as i64 % 7) * 100,
                }
            })
            .collect();
        PriceSeries::new("AAPL", bars)
    }

    #[test]
    fn warmup_rows_are_dropped() {
        let rows = symbol_features(&wavy_series(80));
        // MACD histogram is the slowest: first defined at index 33.
        assert_eq!(rows.first().unwrap().index, 33);
        assert_eq!(rows.len(), 80 - 33);
        assert!(rows.iter().all(|r| r.values.len() == FEATURE_NAMES.len()));
    }

    #[test]
    fn only_last_row_is_unlabelled() {
        let rows = symbol_features(&wavy_series(60));
        let unlabelled: Vec<_> = rows.iter().filter(|r| r.label.is_none()).collect();
        assert_eq!(unlabelled.len(), 1);
        assert_eq!(unlabelled[0].index, 59);
    }

    #[test]
    fn label_is_next_close_up() {
        let series = wavy_series(60);
        let rows = symbol_features(&series);
        for row in rows.iter().filter(|r| r.label.is_some()) {
            let up = series.bars[row.index + 1].close > series.bars[row.index].close;
            assert_eq!(row.label, Some(if up { 1.0 } else { 0.0 }));
        }
    }

    #[test]
    fn build_dataset_splits_latest() {
        let (ds, latest) = build_dataset(&[wavy_series(70)]);
        assert_eq!(ds.n_features(), 9);
        assert_eq!(ds.n_samples(), 70 - 33 - 1);
        assert_eq!(latest.len(), 1);
        assert_eq!(latest[0].symbol, "AAPL");
    }

    #[test]
    fn short_series_has_no_rows() {
        assert!(symbol_features(&wavy_series(20)).is_empty());
    }
}
