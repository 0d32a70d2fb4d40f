//! Bar interval selection and resampling of daily bars.

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::error::StockportError;
use super::ohlcv::OhlcvBar;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Interval {
    #[default]
    Daily,
    Weekly,
    Monthly,
}

impl Interval {
    pub const ALL: [Interval; 3] = [Interval::Daily, Interval::Weekly, Interval::Monthly];

    pub fn as_str(&self) -> &'static str {
        match self {
            Interval::Daily => "1d",
            Interval::Weekly => "1wk",
            Interval::Monthly => "1mo",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Interval::Daily => "Daily",
            Interval::Weekly => "Weekly",
            Interval::Monthly => "Monthly",
        }
    }

    pub fn periods_per_year(&self) -> f64 {
        match self {
            Interval::Daily => 252.0,
            Interval::Weekly => 52.0,
            Interval::Monthly => 12.0,
        }
    }

    fn bucket(&self, date: NaiveDate) -> (i32, u32) {
        match self {
            Interval::Daily => (date.year(), date.ordinal()),
            Interval::Weekly => {
                let week = date.iso_week();
                (week.year(), week.week())
            }
            Interval::Monthly => (date.year(), date.month()),
        }
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Interval {
    type Err = StockportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "1d" | "d" | "daily" => Ok(Interval::Daily),
            "1wk" | "1w" | "w" | "weekly" => Ok(Interval::Weekly),
            "1mo" | "1m" | "m" | "monthly" => Ok(Interval::Monthly),
            other => Err(StockportError::validation(format!(
                "unknown interval '{other}' (expected 1d, 1wk or 1mo)"
            ))),
        }
    }
}

/// Aggregates date-ordered daily bars into `interval` buckets.
///
/// Each output bar keeps the first open, highest high, lowest low, last close
/// and summed volume of its bucket, dated at the last trading day in it.
pub fn resample(bars: &[OhlcvBar], interval: Interval) -> Vec<OhlcvBar> {
    if interval == Interval::Daily {
        return bars.to_vec();
    }

    let mut out: Vec<OhlcvBar> = Vec::new();
    let mut current_key: Option<(i32, u32)> = None;

    for bar in bars {
        let key = interval.bucket(bar.date);
        match out.last_mut() {
            Some(agg) if current_key == Some(key) => {
                agg.high = agg.high.max(bar.high);
                agg.low = agg.low.min(bar.low);
                agg.close = bar.close;
                agg.volume += bar.volume;
                agg.date = bar.date;
            }
            _ => {
                out.push(bar.clone());
                current_key = Some(key);
            }
        }
    }

    out
}
