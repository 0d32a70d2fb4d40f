//! Portfolio overview computed from stored series.

use chrono::NaiveDate;
use serde::Serialize;
use std::collections::HashMap;

use crate::domain::analytics::{
    PerformanceStats, align_closes, cumulative_returns, drawdown_series, portfolio_returns,
};
use crate::domain::interval::Interval;
use crate::domain::ohlcv::OhlcvBar;
use crate::domain::price_series::{PriceSeries, build_unified_timeline};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TickerSnapshot {
    pub symbol: String,
    pub date: NaiveDate,
    pub close: f64,
    pub change: f64,
    pub change_pct: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DashboardReport {
    pub symbols: Vec<String>,
    /// Shared axis for `growth`, `drawdown` and `normalized`.
    pub dates: Vec<NaiveDate>,
    /// Growth of one unit invested at the first aligned date.
    pub growth: Vec<f64>,
    pub drawdown: Vec<f64>,
    /// Per-symbol closes rebased to 100.
    pub normalized: Vec<(String, Vec<f64>)>,
    pub weights: Vec<(String, f64)>,
    pub stats: PerformanceStats,
    pub snapshots: Vec<TickerSnapshot>,
    /// Latest bars across all symbols, newest first.
    pub recent_bars: Vec<OhlcvBar>,
}

/// Weighted portfolio growth, drawdown and statistics over the dates on
/// which every symbol has a price.
pub fn build_dashboard(
    series: &[PriceSeries],
    weights: &HashMap<String, f64>,
    interval: Interval,
    risk_free_rate: f64,
    recent: usize,
) -> DashboardReport {
    let timeline = build_unified_timeline(series);
    let aligned = align_closes(series, &timeline);
    let returns = portfolio_returns(&aligned, weights);

    let mut growth = Vec::with_capacity(aligned.len());
    if !aligned.is_empty() {
        growth.push(1.0);
        growth.extend(cumulative_returns(&returns));
    }
    let drawdown = drawdown_series(&growth);
    let stats = PerformanceStats::from_returns(&returns, interval.periods_per_year(), risk_free_rate);

    let normalized = aligned
        .symbols
        .iter()
        .cloned()
        .zip(aligned.normalized())
        .collect();

    let mut weights: Vec<(String, f64)> = aligned
        .symbols
        .iter()
        .map(|s| (s.clone(), weights.get(s).copied().unwrap_or(0.0)))
        .collect();
    weights.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

    let snapshots = series
        .iter()
        .filter_map(|s| {
            let last = s.bars.last()?;
            let (change, change_pct) = s.last_change().unwrap_or((0.0, 0.0));
            Some(TickerSnapshot {
                symbol: s.symbol.clone(),
                date: last.date,
                close: last.close,
                change,
                change_pct,
            })
        })
        .collect();

    let mut recent_bars: Vec<OhlcvBar> = series
        .iter()
        .flat_map(|s| s.bars.iter().rev().take(recent).cloned())
        .collect();
    recent_bars.sort_by(|a, b| b.date.cmp(&a.date).then_with(|| a.symbol.cmp(&b.symbol)));

    DashboardReport {
        symbols: aligned.symbols.clone(),
        dates: aligned.dates,
        growth,
        drawdown,
        normalized,
        weights,
        stats,
        snapshots,
        recent_bars,
    }
}
