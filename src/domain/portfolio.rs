//! Named portfolios of weighted tickers.

use std::collections::HashMap;

use super::error::StockportError;
use super::ticker::normalize_symbol;

pub const DEFAULT_PORTFOLIO: &str = "core";

#[derive(Debug, Clone, PartialEq)]
pub struct Portfolio {
    pub name: String,
    /// Normalized to sum to 1, in declaration order.
    pub holdings: Vec<(String, f64)>,
}

impl Portfolio {
    pub fn new(name: &str, holdings: Vec<(String, f64)>) -> Result<Self, StockportError> {
        if holdings.is_empty() {
            return Err(StockportError::validation(format!(
                "portfolio {name} has no holdings"
            )));
        }
        if let Some((symbol, w)) = holdings.iter().find(|(_, w)| !w.is_finite() || *w < 0.0) {
            return Err(StockportError::validation(format!(
                "portfolio {name}: weight {w} for {symbol} must be a non-negative number"
            )));
        }
        let total: f64 = holdings.iter().map(|(_, w)| w).sum();
        if total <= 0.0 {
            return Err(StockportError::validation(format!(
                "portfolio {name}: weights must not all be zero"
            )));
        }
        Ok(Portfolio {
            name: name.to_string(),
            holdings: holdings
                .into_iter()
                .map(|(s, w)| (s, w / total))
                .collect(),
        })
    }

    /// Equal-weight portfolio over `symbols`.
    pub fn equal_weight(name: &str, symbols: &[String]) -> Result<Self, StockportError> {
        Self::new(name, symbols.iter().map(|s| (s.clone(), 1.0)).collect())
    }

    /// Parses `AAPL:0.6,MSFT:0.4`. A symbol without `:weight` gets weight 1.
    pub fn parse(name: &str, spec: &str) -> Result<Self, StockportError> {
        let mut holdings: Vec<(String, f64)> = Vec::new();
        for token in spec.split(',').map(str::trim).filter(|t| !t.is_empty()) {
            let (raw_symbol, raw_weight) = match token.split_once(':') {
                Some((s, w)) => (s, Some(w.trim())),
                None => (token, None),
            };
            let symbol = normalize_symbol(raw_symbol)?;
            let weight = match raw_weight {
                Some(w) => w.parse::<f64>().map_err(|_| {
                    StockportError::validation(format!(
                        "portfolio {name}: invalid weight '{w}' for {symbol}"
                    ))
                })?,
                None => 1.0,
            };
            if holdings.iter().any(|(s, _)| *s == symbol) {
                return Err(StockportError::validation(format!(
                    "portfolio {name}: duplicate symbol {symbol}"
                )));
            }
            holdings.push((symbol, weight));
        }
        Self::new(name, holdings)
    }

    pub fn symbols(&self) -> Vec<String> {
        self.holdings.iter().map(|(s, _)| s.clone()).collect()
    }

    pub fn contains(&self, symbol: &str) -> bool {
        self.holdings.iter().any(|(s, _)| s == symbol)
    }

    /// Weights restricted to `selected` and renormalized. Falls back to equal
    /// weights when none of `selected` is held with a positive weight.
    pub fn weights_for(&self, selected: &[String]) -> HashMap<String, f64> {
        let held: Vec<(&String, f64)> = selected
            .iter()
            .filter_map(|s| {
                self.holdings
                    .iter()
                    .find(|(h, _)| h == s)
                    .map(|(_, w)| (s, *w))
            })
            .filter(|(_, w)| *w > 0.0)
            .collect();
        let total: f64 = held.iter().map(|(_, w)| w).sum();

        if held.is_empty() || total <= 0.0 {
            let n = selected.len().max(1) as f64;
            return selected.iter().map(|s| (s.clone(), 1.0 / n)).collect();
        }
        held.into_iter()
            .map(|(s, w)| (s.clone(), w / total))
            .collect()
    }
}

/// Looks a portfolio up by name, falling back to the first one.
pub fn find_portfolio<'a>(portfolios: &'a [Portfolio], name: &str) -> Option<&'a Portfolio> {
    portfolios
        .iter()
        .find(|p| p.name == name)
        .or_else(|| portfolios.first())
}
