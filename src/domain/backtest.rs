//! Single-pass backtest loop over stored price series.

use chrono::NaiveDate;
use serde::Serialize;
use std::collections::HashMap;

use crate::domain::account::Account;
use crate::domain::analytics::PerformanceStats;
use crate::domain::error::StockportError;
use crate::domain::execution::{
    EntryResult, ExecutionConfig, ExecutionParams, check_triggers, enter_long, exit_position,
};
use crate::domain::interval::Interval;
use crate::domain::metrics::{SymbolResult, TradeStats};
use crate::domain::ml::ModelConfig;
use crate::domain::position::{ClosedTrade, ExitReason};
use crate::domain::price_series::{PriceSeries, build_unified_timeline};
use crate::domain::strategy::{Signal, Strategy};

#[derive(Debug, Clone, PartialEq)]
pub struct BacktestConfig {
    pub initial_capital: f64,
    pub execution: ExecutionConfig,
    pub params: ExecutionParams,
    pub max_positions: usize,
    pub risk_free_rate: f64,
    pub interval: Interval,
}

impl Default for BacktestConfig {
    fn default() -> Self {
        BacktestConfig {
            initial_capital: 100_000.0,
            execution: ExecutionConfig::default(),
            params: ExecutionParams::default(),
            max_positions: 5,
            risk_free_rate: 0.02,
            interval: Interval::Daily,
        }
    }
}

impl BacktestConfig {
    pub fn validate(&self) -> Result<(), StockportError> {
        if self.initial_capital <= 0.0 {
            return Err(StockportError::validation("initial capital must be positive"));
        }
        if self.params.position_size <= 0.0 || self.params.position_size > 1.0 {
            return Err(StockportError::validation(
                "position size must be in (0, 1]",
            ));
        }
        if self.max_positions == 0 {
            return Err(StockportError::validation("max_positions must be at least 1"));
        }
        Ok(())
    }
}

/// Account state at the close of one timeline date.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EquityRow {
    pub date: NaiveDate,
    /// Market value of open positions as a fraction of equity.
    pub exposure: f64,
    pub open_positions: usize,
    pub cash: f64,
    pub equity: f64,
    pub pnl: f64,
    pub cum_pnl: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BenchmarkPoint {
    pub date: NaiveDate,
    pub equity: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BacktestResult {
    pub strategy: String,
    pub symbols: Vec<String>,
    pub rows: Vec<EquityRow>,
    pub trades: Vec<ClosedTrade>,
    pub benchmark: Vec<BenchmarkPoint>,
    pub stats: PerformanceStats,
    pub benchmark_stats: PerformanceStats,
    pub trade_stats: TradeStats,
    pub symbol_results: Vec<SymbolResult>,
}

impl BacktestResult {
    pub fn final_equity(&self) -> f64 {
        self.rows.last().map(|r| r.equity).unwrap_or_default()
    }

    pub fn equity_curve(&self) -> Vec<f64> {
        self.rows.iter().map(|r| r.equity).collect()
    }

    pub fn benchmark_curve(&self) -> Vec<f64> {
        self.benchmark.iter().map(|p| p.equity).collect()
    }
}

/// Runs `strategy` over `series`.
///
/// A signal on bar t is filled at the open of the symbol's next bar. On each
/// date pending exits fill before entries, then stop-loss and take-profit
/// levels are checked against the close.
pub fn run_backtest(
    series: &[PriceSeries],
    strategy: &Strategy,
    config: &BacktestConfig,
    model: &ModelConfig,
) -> Result<BacktestResult, StockportError> {
    config.validate()?;
    if series.is_empty() {
        return Err(StockportError::validation("no series to backtest"));
    }

    let signals = strategy.signals(series, model)?;
    let timeline = build_unified_timeline(series);

    let mut account = Account::new(config.initial_capital);
    let mut pending: HashMap<&str, Signal> = HashMap::new();
    let mut last_close: HashMap<String, f64> = HashMap::new();
    let mut rows: Vec<EquityRow> = Vec::with_capacity(timeline.len());
    let mut prev_equity = config.initial_capital;

    for &date in &timeline {
        let today: Vec<(usize, usize)> = series
            .iter()
            .enumerate()
            .filter_map(|(s, ps)| ps.get_bar_index(date).map(|i| (s, i)))
            .collect();

        for &(s, i) in &today {
            let ps = &series[s];
            if pending.get(ps.symbol.as_str()) == Some(&Signal::Flat)
                && account.has_position(&ps.symbol)
            {
                exit_position(
                    &mut account,
                    &ps.symbol,
                    ps.bars[i].open,
                    date,
                    ExitReason::Signal,
                    &config.execution,
                );
            }
        }

        for &(s, i) in &today {
            let ps = &series[s];
            if pending.get(ps.symbol.as_str()) == Some(&Signal::Long)
                && !account.has_position(&ps.symbol)
                && account.position_count() < config.max_positions
            {
                let result = enter_long(
                    &mut account,
                    &ps.symbol,
                    ps.bars[i].open,
                    date,
                    &config.params,
                    &config.execution,
                );
                if result == EntryResult::InsufficientCapital {
                    log::debug!("{date}: not enough cash to enter {}", ps.symbol);
                }
            }
        }

        let closes: HashMap<String, f64> = today
            .iter()
            .map(|&(s, i)| (series[s].symbol.clone(), series[s].bars[i].close))
            .collect();
        check_triggers(&mut account, &closes, date, &config.execution);
        last_close.extend(closes);

        for &(s, i) in &today {
            pending.insert(series[s].symbol.as_str(), signals[s][i]);
        }

        let equity = account.total_equity(&last_close);
        rows.push(make_row(date, &account, &last_close, equity, prev_equity, config));
        prev_equity = equity;
    }

    if let Some(&last_date) = timeline.last() {
        let mut open: Vec<String> = account.positions.keys().cloned().collect();
        open.sort();
        for symbol in open {
            if let Some(&price) = last_close.get(&symbol) {
                exit_position(
                    &mut account,
                    &symbol,
                    price,
                    last_date,
                    ExitReason::EndOfTest,
                    &config.execution,
                );
            }
        }
        if rows.pop().is_some() {
            let before = rows.last().map(|r| r.equity).unwrap_or(config.initial_capital);
            let equity = account.total_equity(&last_close);
            rows.push(make_row(last_date, &account, &last_close, equity, before, config));
        }
    }

    let symbols: Vec<String> = series.iter().map(|s| s.symbol.clone()).collect();
    let benchmark = buy_and_hold(series, &timeline, config.initial_capital);
    let ppy = config.interval.periods_per_year();

    let equity: Vec<f64> = rows.iter().map(|r| r.equity).collect();
    let bench_equity: Vec<f64> = benchmark.iter().map(|p| p.equity).collect();
    let trades = account.closed_trades;

    let result = BacktestResult {
        strategy: strategy.describe(),
        stats: PerformanceStats::from_equity(&equity, ppy, config.risk_free_rate),
        benchmark_stats: PerformanceStats::from_equity(&bench_equity, ppy, config.risk_free_rate),
        trade_stats: TradeStats::compute(&trades),
        symbol_results: SymbolResult::compute_per_symbol(&symbols, &trades),
        symbols,
        rows,
        trades,
        benchmark,
    };

    log::info!(
        "backtest {}: {} dates, {} trades, total return {:.2}%",
        result.strategy,
        result.rows.len(),
        result.trades.len(),
        result.stats.total_return * 100.0
    );

    Ok(result)
}

fn make_row(
    date: NaiveDate,
    account: &Account,
    prices: &HashMap<String, f64>,
    equity: f64,
    prev_equity: f64,
    config: &BacktestConfig,
) -> EquityRow {
    let invested = account.positions_value(prices);
    EquityRow {
        date,
        exposure: if equity > 0.0 { invested / equity } else { 0.0 },
        open_positions: account.position_count(),
        cash: account.cash,
        equity,
        pnl: equity - prev_equity,
        cum_pnl: equity - config.initial_capital,
    }
}

/// Equal-capital buy-and-hold from each symbol's first open, marked at the
/// last known close. Capital for a symbol that has not started trading is
/// held as cash.
pub fn buy_and_hold(
    series: &[PriceSeries],
    timeline: &[NaiveDate],
    initial_capital: f64,
) -> Vec<BenchmarkPoint> {
    if series.is_empty() {
        return Vec::new();
    }
    let allocation = initial_capital / series.len() as f64;

    // (shares, leftover cash) per symbol, fixed at the first bar.
    let holdings: Vec<Option<(f64, f64)>> = series
        .iter()
        .map(|s| {
            let open = s.bars.first()?.open;
            if open <= 0.0 {
                return None;
            }
            let shares = (allocation / open).floor();
            Some((shares, allocation - shares * open))
        })
        .collect();

    timeline
        .iter()
        .map(|&date| {
            let equity = series
                .iter()
                .zip(&holdings)
                .map(|(s, h)| match (h, s.close_on_or_before(date)) {
                    (Some((shares, leftover)), Some(close)) => shares * close + leftover,
                    _ => allocation,
                })
                .sum();
            BenchmarkPoint { date, equity }
        })
        .collect()
}
