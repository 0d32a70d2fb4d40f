//! Portfolio return series and performance statistics.

use chrono::NaiveDate;
use serde::Serialize;
use std::collections::HashMap;

use super::price_series::PriceSeries;

/// Closes of several symbols forward-filled onto a shared date axis.
#[derive(Debug, Clone, PartialEq)]
pub struct AlignedCloses {
    pub dates: Vec<NaiveDate>,
    pub symbols: Vec<String>,
    /// `closes[i][t]` is symbol `i` at `dates[t]`.
    pub closes: Vec<Vec<f64>>,
}

impl AlignedCloses {
    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    /// Each symbol rebased to 100 at the first aligned date.
    pub fn normalized(&self) -> Vec<Vec<f64>> {
        self.closes
            .iter()
            .map(|series| match series.first() {
                Some(&base) if base != 0.0 => series.iter().map(|c| c / base * 100.0).collect(),
                _ => vec![100.0; series.len()],
            })
            .collect()
    }
}

/// Percentage change between consecutive values; one shorter than the input.
pub fn simple_returns(values: &[f64]) -> Vec<f64> {
    values
        .windows(2)
        .map(|w| if w[0] != 0.0 { w[1] / w[0] - 1.0 } else { 0.0 })
        .collect()
}

/// Forward-fills closes onto `timeline`, starting at the first date on which
/// every series has a price.
pub fn align_closes(series: &[PriceSeries], timeline: &[NaiveDate]) -> AlignedCloses {
    let mut dates = Vec::new();
    let mut closes: Vec<Vec<f64>> = vec![Vec::new(); series.len()];
    let mut last: Vec<Option<f64>> = vec![None; series.len()];

    for &date in timeline {
        for (i, s) in series.iter().enumerate() {
            if let Some(bar) = s.get_bar(date) {
                last[i] = Some(bar.close);
            }
        }
        if series.is_empty() || last.iter().any(Option::is_none) {
            continue;
        }
        dates.push(date);
        for (i, value) in last.iter().enumerate() {
            closes[i].push(value.unwrap_or_default());
        }
    }

    AlignedCloses {
        dates,
        symbols: series.iter().map(|s| s.symbol.clone()).collect(),
        closes,
    }
}

/// Weighted sum of per-symbol simple returns. `weights` is indexed like
/// `aligned.symbols`; missing symbols get zero weight.
pub fn portfolio_returns(aligned: &AlignedCloses, weights: &HashMap<String, f64>) -> Vec<f64> {
    let n = aligned.len().saturating_sub(1);
    let mut out = vec![0.0; n];
    for (symbol, closes) in aligned.symbols.iter().zip(&aligned.closes) {
        let w = weights.get(symbol).copied().unwrap_or(0.0);
        if w == 0.0 {
            continue;
        }
        for (acc, r) in out.iter_mut().zip(simple_returns(closes)) {
            *acc += w * r;
        }
    }
    out
}

/// Running product of (1 + r).
pub fn cumulative_returns(returns: &[f64]) -> Vec<f64> {
    returns
        .iter()
        .scan(1.0, |acc, r| {
            *acc *= 1.0 + r;
            Some(*acc)
        })
        .collect()
}

/// (value - running max) / running max at each point; always <= 0.
pub fn drawdown_series(values: &[f64]) -> Vec<f64> {
    let mut peak = f64::MIN;
    values
        .iter()
        .map(|&v| {
            if v > peak {
                peak = v;
            }
            if peak > 0.0 { (v - peak) / peak } else { 0.0 }
        })
        .collect()
}

/// Largest drawdown (positive fraction) and longest run of periods spent
/// below a prior peak.
pub fn max_drawdown(values: &[f64]) -> (f64, usize) {
    let mut max_dd = 0.0_f64;
    let mut duration = 0usize;
    let mut max_duration = 0usize;
    for dd in drawdown_series(values) {
        if dd < 0.0 {
            duration += 1;
            max_duration = max_duration.max(duration);
            max_dd = max_dd.max(-dd);
        } else {
            duration = 0;
        }
    }
    (max_dd, max_duration)
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

/// Sample standard deviation (n - 1). Zero for fewer than two values.
pub fn sample_std(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    let var = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    var.sqrt()
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PerformanceStats {
    pub total_return: f64,
    pub cagr: f64,
    pub volatility: f64,
    pub sharpe_ratio: f64,
    pub sortino_ratio: f64,
    /// Positive fraction, 0.25 for a 25% peak-to-trough fall.
    pub max_drawdown: f64,
    pub max_drawdown_duration: usize,
    pub periods: usize,
}

impl PerformanceStats {
    pub fn from_returns(returns: &[f64], periods_per_year: f64, risk_free_rate: f64) -> Self {
        if returns.len() < 2 {
            return PerformanceStats {
                periods: returns.len(),
                ..Default::default()
            };
        }

        let n = returns.len() as f64;
        let cumulative = cumulative_returns(returns);
        let total_return = cumulative.last().copied().unwrap_or(1.0) - 1.0;
        let cagr = if total_return > -1.0 {
            (1.0 + total_return).powf(periods_per_year / n) - 1.0
        } else {
            -1.0
        };

        let std = sample_std(returns);
        let ann = periods_per_year.sqrt();
        let period_rf = risk_free_rate / periods_per_year;
        let excess = mean(returns) - period_rf;

        let sharpe_ratio = if std > 0.0 { excess / std * ann } else { 0.0 };

        let downside_sq: f64 = returns
            .iter()
            .filter(|&&r| r < period_rf)
            .map(|&r| (r - period_rf).powi(2))
            .sum();
        let downside_dev = (downside_sq / n).sqrt();
        let sortino_ratio = if downside_dev > 0.0 {
            excess / downside_dev * ann
        } else {
            0.0
        };

        // Prepend the starting value so a loss on the first period counts.
        let mut curve = Vec::with_capacity(cumulative.len() + 1);
        curve.push(1.0);
        curve.extend_from_slice(&cumulative);
        let (max_drawdown, max_drawdown_duration) = max_drawdown(&curve);

        PerformanceStats {
            total_return,
            cagr,
            volatility: std * ann,
            sharpe_ratio,
            sortino_ratio,
            max_drawdown,
            max_drawdown_duration,
            periods: returns.len(),
        }
    }

    /// Stats of an equity curve expressed in currency.
    pub fn from_equity(equity: &[f64], periods_per_year: f64, risk_free_rate: f64) -> Self {
        Self::from_returns(&simple_returns(equity), periods_per_year, risk_free_rate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ohlcv::OhlcvBar;
    use approx::assert_relative_eq;

    fn series(symbol: &str, start_day: u32, closes: &[f64]) -> PriceSeries {
        let bars = closes
            .iter()
            .enumerate()
            .map(|(i, &c)| OhlcvBar {
                symbol: symbol.into(),
                date: NaiveDate::from_ymd_opt(2024, 1, start_day + i as u32).unwrap(),
                open: c,
                high: c,
                low: c,
                close: c,
                volume: 1,
            })
            .collect();
        PriceSeries::new(symbol, bars)
    }

    #[test]
    fn simple_returns_drops_first() {
        let r = simple_returns(&[100.0, 110.0, 99.0]);
        assert_eq!(r.len(), 2);
        assert_relative_eq!(r[0], 0.1, epsilon = 1e-12);
        assert_relative_eq!(r[1], -0.1, epsilon = 1e-12);
    }

    #[test]
    fn align_starts_when_all_symbols_present() {
        let a = series("AAPL", 1, &[10.0, 11.0, 12.0, 13.0]);
        let b = series("MSFT", 2, &[20.0, 21.0]);
        let timeline = crate::domain::price_series::build_unified_timeline(&[a.clone(), b.clone()]);
        let aligned = align_closes(&[a, b], &timeline);
        assert_eq!(aligned.len(), 3);
        assert_eq!(aligned.closes[0], vec![11.0, 12.0, 13.0]);
        // MSFT carried forward on 2024-01-04.
        assert_eq!(aligned.closes[1], vec![20.0, 21.0, 21.0]);
        assert_eq!(aligned.normalized()[1][0], 100.0);
    }

    #[test]
    fn weighted_portfolio_returns() {
        let a = series("AAPL", 1, &[100.0, 110.0]);
        let b = series("MSFT", 1, &[100.0, 90.0]);
        let timeline = crate::domain::price_series::build_unified_timeline(&[a.clone(), b.clone()]);
        let aligned = align_closes(&[a, b], &timeline);
        let weights: HashMap<String, f64> =
            [("AAPL".to_string(), 0.75), ("MSFT".to_string(), 0.25)].into();
        let r = portfolio_returns(&aligned, &weights);
        assert_relative_eq!(r[0], 0.75 * 0.1 - 0.25 * 0.1, epsilon = 1e-12);
    }

    #[test]
    fn cumulative_and_drawdown() {
        let cum = cumulative_returns(&[0.1, -0.5, 0.2]);
        assert_relative_eq!(cum[2], 1.1 * 0.5 * 1.2, epsilon = 1e-12);
        let dd = drawdown_series(&cum);
        assert_eq!(dd[0], 0.0);
        assert_relative_eq!(dd[1], -0.5, epsilon = 1e-12);
        let (max_dd, duration) = max_drawdown(&cum);
        assert_relative_eq!(max_dd, 0.5, epsilon = 1e-12);
        assert_eq!(duration, 2);
    }

    #[test]
    fn stats_empty_and_flat() {
        let empty = PerformanceStats::from_returns(&[], 252.0, 0.0);
        assert_eq!(empty, PerformanceStats::default());

        let flat = PerformanceStats::from_returns(&[0.0; 10], 252.0, 0.0);
        assert_eq!(flat.sharpe_ratio, 0.0);
        assert_eq!(flat.sortino_ratio, 0.0);
        assert_eq!(flat.max_drawdown, 0.0);
    }

    #[test]
    fn stats_known_values() {
        let returns = [0.01, -0.02, 0.015, 0.005];
        let stats = PerformanceStats::from_returns(&returns, 252.0, 0.0);
        let total = 1.01 * 0.98 * 1.015 * 1.005 - 1.0;
        assert_relative_eq!(stats.total_return, total, epsilon = 1e-12);
        assert_relative_eq!(
            stats.cagr,
            (1.0 + total).powf(252.0 / 4.0) - 1.0,
            epsilon = 1e-9
        );
        let std = sample_std(&returns);
        assert_relative_eq!(stats.volatility, std * 252f64.sqrt(), epsilon = 1e-12);
        assert_relative_eq!(
            stats.sharpe_ratio,
            0.0025 / std * 252f64.sqrt(),
            epsilon = 1e-9
        );
        assert_relative_eq!(stats.max_drawdown, 0.02, epsilon = 1e-12);
        assert!(stats.sortino_ratio > stats.sharpe_ratio);
    }

    #[test]
    fn stats_from_equity_curve() {
        let stats = PerformanceStats::from_equity(&[100.0, 110.0, 99.0, 120.0], 252.0, 0.0);
        assert_relative_eq!(stats.total_return, 0.2, epsilon = 1e-12);
        assert_relative_eq!(stats.max_drawdown, 0.1, epsilon = 1e-12);
        assert_eq!(stats.max_drawdown_duration, 1);
    }
}
