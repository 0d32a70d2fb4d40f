//! Symbol lists and data sufficiency checks for multi-symbol analysis.
//!
//! Parses symbol lists from CLI and form input and drops symbols that lack
//! enough stored bars.

use crate::domain::error::StockportError;
use crate::domain::interval::{Interval, resample};
use crate::domain::price_series::PriceSeries;
use crate::domain::ticker::normalize_symbol;
use crate::ports::data_port::DataPort;
use chrono::NaiveDate;
use std::collections::HashSet;

pub const MIN_BARS: usize = 30;

#[derive(Debug, Clone, thiserror::Error)]
pub enum UniverseError {
    #[error("empty token in symbol list")]
    EmptyToken,

    #[error("duplicate symbol: {0}")]
    DuplicateSymbol(String),

    #[error("invalid symbol: {0}")]
    InvalidSymbol(String),
}

impl From<UniverseError> for StockportError {
    fn from(err: UniverseError) -> Self {
        StockportError::validation(err.to_string())
    }
}

pub fn parse_symbols(input: &str) -> Result<Vec<String>, UniverseError> {
    let mut symbols = Vec::new();
    let mut seen = HashSet::new();

    for token in input.split(',') {
        let trimmed = token.trim();
        if trimmed.is_empty() {
            return Err(UniverseError::EmptyToken);
        }
        let symbol =
            normalize_symbol(trimmed).map_err(|_| UniverseError::InvalidSymbol(trimmed.into()))?;
        if !seen.insert(symbol.clone()) {
            return Err(UniverseError::DuplicateSymbol(symbol));
        }
        symbols.push(symbol);
    }

    Ok(symbols)
}

#[derive(Debug, Clone)]
pub struct SkippedSymbol {
    pub symbol: String,
    pub reason: SkipReason,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SkipReason {
    NoData,
    InsufficientBars { bars: usize },
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::NoData => write!(f, "no data"),
            SkipReason::InsufficientBars { bars } => {
                write!(f, "only {bars} bars, minimum {MIN_BARS} required")
            }
        }
    }
}

#[derive(Debug)]
pub struct UniverseValidationResult {
    pub series: Vec<PriceSeries>,
    pub skipped: Vec<SkippedSymbol>,
}

impl UniverseValidationResult {
    pub fn symbols(&self) -> Vec<String> {
        self.series.iter().map(|s| s.symbol.clone()).collect()
    }
}

/// Loads each symbol's bars and keeps those with at least `min_bars`.
///
/// Errors only when every symbol is dropped.
pub fn validate_universe(
    data_port: &dyn DataPort,
    symbols: &[String],
    start_date: NaiveDate,
    end_date: NaiveDate,
    min_bars: usize,
) -> Result<UniverseValidationResult, StockportError> {
    let mut series = Vec::new();
    let mut skipped = Vec::new();

    for symbol in symbols {
        let bars = match data_port.fetch_ohlcv(symbol, start_date, end_date) {
            Ok(bars) => bars,
            Err(e) => {
                log::warn!("skipping {symbol} ({e})");
                skipped.push(SkippedSymbol {
                    symbol: symbol.clone(),
                    reason: SkipReason::NoData,
                });
                continue;
            }
        };

        if bars.is_empty() {
            log::warn!("skipping {symbol} (no data found)");
            skipped.push(SkippedSymbol {
                symbol: symbol.clone(),
                reason: SkipReason::NoData,
            });
            continue;
        }

        if bars.len() < min_bars {
            log::warn!(
                "skipping {symbol} (only {} bars, minimum {min_bars} required)",
                bars.len()
            );
            skipped.push(SkippedSymbol {
                symbol: symbol.clone(),
                reason: SkipReason::InsufficientBars { bars: bars.len() },
            });
            continue;
        }

        log::debug!("{symbol}: {} bars [OK]", bars.len());
        series.push(PriceSeries::new(symbol.clone(), bars));
    }

    if series.is_empty() {
        let bars = skipped
            .iter()
            .filter_map(|s| match s.reason {
                SkipReason::InsufficientBars { bars } => Some(bars),
                SkipReason::NoData => None,
            })
            .max();
        return Err(match bars {
            Some(bars) => StockportError::InsufficientData {
                symbol: symbols.join(","),
                bars,
                minimum: min_bars,
            },
            None => StockportError::NoData {
                symbol: symbols.join(","),
            },
        });
    }

    if !skipped.is_empty() {
        log::info!(
            "using {} of {} symbols",
            series.len(),
            series.len() + skipped.len()
        );
    }

    Ok(UniverseValidationResult { series, skipped })
}

/// Validated series, resampled to `interval` after the bar-count check.
pub fn load_universe(
    data_port: &dyn DataPort,
    symbols: &[String],
    start_date: NaiveDate,
    end_date: NaiveDate,
    interval: Interval,
) -> Result<UniverseValidationResult, StockportError> {
    let mut result = validate_universe(data_port, symbols, start_date, end_date, MIN_BARS)?;
    if interval != Interval::Daily {
        for series in &mut result.series {
            let bars = resample(&series.bars, interval);
            *series = PriceSeries::new(series.symbol.clone(), bars);
        }
    }
    Ok(result)
}
