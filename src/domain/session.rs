//! Sidebar selection shared by every page of one browser session.

use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};

use super::error::StockportError;
use super::interval::Interval;
use super::portfolio::{Portfolio, find_portfolio};
use super::ticker::TickerRecord;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionState {
    pub portfolio: String,
    pub tickers: Vec<String>,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub interval: Interval,
}

/// Initial selection for new sessions.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionDefaults {
    pub portfolio: String,
    pub lookback_days: i64,
    pub interval: Interval,
}

impl SessionState {
    /// An empty ticker selection is filled from the portfolio on first normalize.
    pub fn new(defaults: &SessionDefaults, today: NaiveDate) -> Self {
        SessionState {
            portfolio: defaults.portfolio.clone(),
            tickers: Vec::new(),
            start: today - Duration::days(defaults.lookback_days),
            end: today,
            interval: defaults.interval,
        }
    }

    /// Drops unknown or excluded symbols. When nothing is left, selects the
    /// portfolio's included tickers. Returns true if the selection changed.
    pub fn normalize(&mut self, tickers: &[TickerRecord], portfolios: &[Portfolio]) -> bool {
        let before = self.clone();

        let is_included =
            |sym: &str| tickers.iter().any(|t| t.symbol == sym && t.included);

        let mut seen = Vec::with_capacity(self.tickers.len());
        for sym in &self.tickers {
            if is_included(sym) && !seen.contains(sym) {
                seen.push(sym.clone());
            }
        }
        self.tickers = seen;

        match find_portfolio(portfolios, &self.portfolio) {
            Some(portfolio) => {
                self.portfolio = portfolio.name.clone();
                if self.tickers.is_empty() {
                    self.tickers = portfolio
                        .symbols()
                        .into_iter()
                        .filter(|s| is_included(s))
                        .collect();
                }
            }
            None => self.portfolio.clear(),
        }

        *self != before
    }

    /// Applies a sidebar submission. Nothing changes when it is invalid.
    pub fn apply(&mut self, update: SessionUpdate) -> Result<(), StockportError> {
        let start = update.start.unwrap_or(self.start);
        let end = update.end.unwrap_or(self.end);
        if start > end {
            return Err(StockportError::validation(format!(
                "start date {start} is after end date {end}"
            )));
        }

        let switched = update
            .portfolio
            .as_ref()
            .is_some_and(|p| *p != self.portfolio);
        if switched {
            // The next normalize refills from the new portfolio.
            self.tickers.clear();
        } else if let Some(tickers) = update.tickers {
            self.tickers = tickers;
        }
        if let Some(portfolio) = update.portfolio {
            self.portfolio = portfolio;
        }
        if let Some(interval) = update.interval {
            self.interval = interval;
        }
        self.start = start;
        self.end = end;
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct SessionUpdate {
    pub portfolio: Option<String>,
    pub tickers: Option<Vec<String>>,
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
    pub interval: Option<Interval>,
}
