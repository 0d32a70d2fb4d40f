//! Per-symbol price series and the unified trading timeline.

use crate::domain::ohlcv::OhlcvBar;
use chrono::NaiveDate;
use std::collections::{BTreeSet, HashMap};

#[derive(Debug, Clone)]
pub struct PriceSeries {
    pub symbol: String,
    pub bars: Vec<OhlcvBar>,
    pub date_index: HashMap<NaiveDate, usize>,
}

impl PriceSeries {
    /// Bars must already be sorted by date.
    pub fn new(symbol: impl Into<String>, bars: Vec<OhlcvBar>) -> Self {
        let date_index = bars
            .iter()
            .enumerate()
            .map(|(i, bar)| (bar.date, i))
            .collect();
        Self {
            symbol: symbol.into(),
            bars,
            date_index,
        }
    }

    pub fn bar_count(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn get_bar(&self, date: NaiveDate) -> Option<&OhlcvBar> {
        self.date_index.get(&date).map(|&i| &self.bars[i])
    }

    pub fn get_bar_index(&self, date: NaiveDate) -> Option<usize> {
        self.date_index.get(&date).copied()
    }

    pub fn closes(&self) -> Vec<f64> {
        self.bars.iter().map(|b| b.close).collect()
    }

    pub fn first_date(&self) -> Option<NaiveDate> {
        self.bars.first().map(|b| b.date)
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.bars.last().map(|b| b.date)
    }

    pub fn last_close(&self) -> Option<f64> {
        self.bars.last().map(|b| b.close)
    }

    /// Most recent close on or before `date`.
    pub fn close_on_or_before(&self, date: NaiveDate) -> Option<f64> {
        let idx = self.bars.partition_point(|b| b.date <= date);
        if idx == 0 {
            None
        } else {
            Some(self.bars[idx - 1].close)
        }
    }

    /// Change of the last close against the previous one, as (absolute, fraction).
    pub fn last_change(&self) -> Option<(f64, f64)> {
        let n = self.bars.len();
        if n < 2 {
            return None;
        }
        let prev = self.bars[n - 2].close;
        let last = self.bars[n - 1].close;
        let abs = last - prev;
        let pct = if prev != 0.0 { abs / prev } else { 0.0 };
        Some((abs, pct))
    }
}

pub fn build_unified_timeline(series: &[PriceSeries]) -> Vec<NaiveDate> {
    let unique_dates: BTreeSet<NaiveDate> = series
        .iter()
        .flat_map(|s| s.bars.iter().map(|bar| bar.date))
        .collect();
    unique_dates.into_iter().collect()
}
