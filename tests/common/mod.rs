#![allow(dead_code)]

use chrono::{NaiveDate, NaiveDateTime, Utc};
use std::collections::HashMap;
use std::io::Write;
use std::sync::Mutex;

use stockport::domain::backfill::BackfillJob;
use stockport::domain::error::StockportError;
pub use stockport::domain::ohlcv::OhlcvBar;
use stockport::domain::price_series::PriceSeries;
use stockport::domain::ticker::{TickerRecord, TickerUpdate};
use stockport::ports::data_port::DataPort;

/// In-memory `DataPort` with per-symbol injected failures.
#[derive(Default)]
pub struct MockDataPort {
    pub data: Mutex<HashMap<String, Vec<OhlcvBar>>>,
    pub tickers: Mutex<Vec<TickerRecord>>,
    pub errors: HashMap<String, String>,
    pub jobs: Mutex<Vec<BackfillJob>>,
}

impl MockDataPort {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_bars(self, symbol: &str, bars: Vec<OhlcvBar>) -> Self {
        if let Ok(mut data) = self.data.lock() {
            data.insert(symbol.to_string(), bars);
        }
        self
    }

    pub fn with_error(mut self, symbol: &str, reason: &str) -> Self {
        self.errors.insert(symbol.to_string(), reason.to_string());
        self
    }

    fn check(&self, symbol: &str) -> Result<(), StockportError> {
        match self.errors.get(symbol) {
            Some(reason) => Err(StockportError::Database {
                reason: reason.clone(),
            }),
            None => Ok(()),
        }
    }
}

impl DataPort for MockDataPort {
    fn fetch_ohlcv(
        &self,
        symbol: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<Vec<OhlcvBar>, StockportError> {
        self.check(symbol)?;
        let data = self.data.lock().unwrap();
        Ok(data
            .get(symbol)
            .map(|bars| {
                bars.iter()
                    .filter(|b| b.date >= start_date && b.date <= end_date)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    fn store_ohlcv(&self, bars: &[OhlcvBar]) -> Result<usize, StockportError> {
        let mut data = self.data.lock().unwrap();
        for bar in bars {
            let series = data.entry(bar.symbol.clone()).or_default();
            series.retain(|b| b.date != bar.date);
            series.push(bar.clone());
            series.sort_by_key(|b| b.date);
        }
        Ok(bars.len())
    }

    fn get_data_range(
        &self,
        symbol: &str,
    ) -> Result<Option<(NaiveDate, NaiveDate, usize)>, StockportError> {
        self.check(symbol)?;
        let data = self.data.lock().unwrap();
        match data.get(symbol) {
            Some(bars) if !bars.is_empty() => {
                let min = bars.iter().map(|b| b.date).min().unwrap();
                let max = bars.iter().map(|b| b.date).max().unwrap();
                Ok(Some((min, max, bars.len())))
            }
            _ => Ok(None),
        }
    }

    fn list_tickers(&self) -> Result<Vec<TickerRecord>, StockportError> {
        Ok(self.tickers.lock().unwrap().clone())
    }

    fn get_ticker(&self, symbol: &str) -> Result<Option<TickerRecord>, StockportError> {
        Ok(self
            .tickers
            .lock()
            .unwrap()
            .iter()
            .find(|t| t.symbol == symbol)
            .cloned())
    }

    fn insert_ticker(&self, ticker: &TickerRecord) -> Result<(), StockportError> {
        let mut tickers = self.tickers.lock().unwrap();
        if tickers.iter().any(|t| t.symbol == ticker.symbol) {
            return Err(StockportError::validation(format!(
                "{} is already tracked",
                ticker.symbol
            )));
        }
        tickers.push(ticker.clone());
        Ok(())
    }

    fn update_ticker(
        &self,
        symbol: &str,
        update: &TickerUpdate,
        now: NaiveDateTime,
    ) -> Result<TickerRecord, StockportError> {
        let mut tickers = self.tickers.lock().unwrap();
        let t = tickers
            .iter_mut()
            .find(|t| t.symbol == symbol)
            .ok_or_else(|| StockportError::UnknownTicker {
                symbol: symbol.to_string(),
            })?;
        if let Some(name) = &update.company_name {
            t.company_name = name.clone();
        }
        if let Some(sector) = &update.sector {
            t.sector = sector.clone();
        }
        if let Some(aliases) = &update.aliases {
            t.aliases = aliases.clone();
        }
        if let Some(included) = update.included {
            t.included = included;
        }
        t.updated_at = now;
        Ok(t.clone())
    }

    fn delete_ticker(&self, symbol: &str) -> Result<(), StockportError> {
        self.tickers.lock().unwrap().retain(|t| t.symbol != symbol);
        self.data.lock().unwrap().remove(symbol);
        Ok(())
    }

    fn insert_backfill_job(&self, job: &BackfillJob) -> Result<i64, StockportError> {
        let mut jobs = self.jobs.lock().unwrap();
        let id = jobs.len() as i64 + 1;
        let mut job = job.clone();
        job.id = id;
        jobs.push(job);
        Ok(id)
    }

    fn update_backfill_job(&self, job: &BackfillJob) -> Result<(), StockportError> {
        let mut jobs = self.jobs.lock().unwrap();
        if let Some(existing) = jobs.iter_mut().find(|j| j.id == job.id) {
            *existing = job.clone();
        }
        Ok(())
    }

    fn recent_backfill_jobs(&self, limit: usize) -> Result<Vec<BackfillJob>, StockportError> {
        let jobs = self.jobs.lock().unwrap();
        Ok(jobs.iter().rev().take(limit).cloned().collect())
    }
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub fn make_bar(symbol: &str, date: &str, close: f64) -> OhlcvBar {
    OhlcvBar {
        symbol: symbol.to_string(),
        date: NaiveDate::parse_from_str(date, "%Y-%m-%d").unwrap(),
        open: close - 1.0,
        high: close + 1.0,
        low: close - 2.0,
        close,
        volume: 1000,
    }
}

/// Consecutive daily bars whose close follows `close_at(i)`.
pub fn bars_from(
    symbol: &str,
    start_date: &str,
    count: usize,
    close_at: impl Fn(usize) -> f64,
) -> Vec<OhlcvBar> {
    let start = NaiveDate::parse_from_str(start_date, "%Y-%m-%d").unwrap();
    (0..count)
        .map(|i| {
            let close = close_at(i);
            OhlcvBar {
                symbol: symbol.to_string(),
                date: start + chrono::Duration::days(i as i64),
                open: close,
                high: close + 1.0,
                low: close - 1.0,
                close,
                volume: 1000,
            }
        })
        .collect()
}

pub fn generate_bars(
    symbol: &str,
    start_date: &str,
    count: usize,
    start_price: f64,
) -> Vec<OhlcvBar> {
    bars_from(symbol, start_date, count, |i| start_price + i as f64)
}

/// Rises for 40 bars, falls for 40, then rises again.
pub fn swing_bars(symbol: &str, start_date: &str) -> Vec<OhlcvBar> {
    bars_from(symbol, start_date, 120, |i| match i {
        0..40 => 100.0 + i as f64,
        40..80 => 140.0 - (i - 40) as f64,
        _ => 100.0 + (i - 80) as f64,
    })
}

pub fn series(symbol: &str, bars: Vec<OhlcvBar>) -> PriceSeries {
    PriceSeries::new(symbol, bars)
}

pub fn ticker(symbol: &str, name: &str) -> TickerRecord {
    TickerRecord::new(symbol, name, "Technology", Utc::now().naive_utc())
}

pub fn write_temp_ini(content: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}
